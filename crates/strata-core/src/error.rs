//! Error types for Strata

use thiserror::Error;

/// The main error type for Strata operations
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid load radii: required {required} must not exceed preload {preload}")]
    InvalidLoadRadii { required: f32, preload: f32 },

    #[error(
        "Patch [{x}, {y}] + [{width}, {height}] is out of bounds for cell ({cell_x}, {cell_y}) \
         with resolution {resolution}"
    )]
    PatchOutOfBounds {
        cell_x: i32,
        cell_y: i32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        resolution: u32,
    },

    #[error("Unknown backing cell: ({x}, {y})")]
    UnknownCell { x: i32, y: i32 },

    #[error("Patch at ({x}, {y}) with size [{width}, {height}] covers non-resident tiles")]
    InactiveTile {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    #[error("Heightmap load error: {0}")]
    HeightmapLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

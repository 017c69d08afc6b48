//! Backing cells - one unit of persistent terrain storage

use strata_core::{Result, StrataError};

use crate::grid::HeightGrid;

/// One logical backing-storage grid: a square page of the persistent
/// height-field. A `BackingStore` owns a collection of these, addressed
/// by a 2D cell coordinate.
#[derive(Clone, Debug)]
pub struct BackingCell {
    grid: HeightGrid,
}

impl BackingCell {
    /// Wrap a height grid as a backing cell. The grid must be square;
    /// non-square backing extents are a configuration error.
    pub fn new(grid: HeightGrid) -> Result<Self> {
        if grid.width != grid.depth {
            return Err(StrataError::Config(format!(
                "backing cell must be square, got {}x{}",
                grid.width, grid.depth
            )));
        }
        if grid.width < 2 {
            return Err(StrataError::Config(format!(
                "backing cell resolution must be at least 2, got {}",
                grid.width
            )));
        }
        Ok(Self { grid })
    }

    /// Samples per cell edge.
    pub fn resolution(&self) -> u32 {
        self.grid.width
    }

    pub fn grid(&self) -> &HeightGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut HeightGrid {
        &mut self.grid
    }
}

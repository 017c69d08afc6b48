//! Strata Core - Foundational types for the Strata terrain pager
//!
//! This crate provides the types that all other Strata crates depend on:
//! - `Index2`, `TileId` - Integer grid coordinates
//! - `Vec3` - Minimal world-space vector
//! - `BodyHandle` - Opaque reference to a solver-owned body
//! - Error types and Result alias

mod error;
mod handle;
mod index;
mod types;

pub use error::{Result, StrataError};
pub use handle::BodyHandle;
pub use index::{Index2, TileId};
pub use types::Vec3;

//! Strata Storage - Persistent height-field backing storage
//!
//! Provides the height grid primitive, backing cells (one persistent
//! storage grid each), and the `BackingStore` facade that the tile data
//! sources read patches from and write deformation results back to.
//! Does not know anything about tiles or paging; it is addressed purely
//! in backing-cell coordinates.

pub mod cell;
pub mod grid;
pub mod store;

pub use cell::BackingCell;
pub use grid::HeightGrid;
pub use store::{BackingStore, InMemoryBackingStore, PatchRect};

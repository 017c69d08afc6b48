//! The tile data source boundary
//!
//! A `TileDataSource` answers the pager's pull-based fetch contract: it
//! locates and stitches the backing data a tile overlaps, and translates
//! solver-side height modifications back into backing-storage writes.
//! The engine is handed one as a trait object, so the single-grid and
//! multi-grid strategies are interchangeable.

use strata_core::{Index2, Result, TileId, Vec3};
use strata_storage::HeightGrid;

use crate::tilemath::TileSpecification;

/// Outcome of a tile fetch. `NotReady` is not an error: the backing data
/// is still being streamed in and the caller re-polls on a later step.
#[derive(Debug)]
pub enum FetchResult {
    Ready(HeightGrid),
    NotReady,
}

impl FetchResult {
    pub fn is_ready(&self) -> bool {
        matches!(self, FetchResult::Ready(_))
    }
}

/// One height sample the solver changed, in tile-local indices. Heights
/// are in solver space (the uniform depth bias still applied).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModifiedSample {
    pub local: Index2,
    pub height: f32,
}

impl ModifiedSample {
    pub fn new(local: Index2, height: f32) -> Self {
        Self { local, height }
    }
}

/// Streaming adapter between tiles and backing storage.
///
/// `fetch_tile` may be invoked from a solver worker thread, concurrently
/// with the owner's step; it must never block and never touch the backing
/// store directly. `update` runs in the owner context and is the only
/// path that mutates backing storage.
pub trait TileDataSource: Send + Sync {
    /// Assemble the full height buffer for a tile, or report that some
    /// backing data is not yet available. Idempotent: repeated calls for
    /// a not-yet-ready tile never duplicate pending load entries.
    fn fetch_tile(&self, spec: &TileSpecification, id: TileId) -> FetchResult;

    /// Write modified samples back to backing storage. Samples on a
    /// shared overlap margin are written to every backing cell sharing
    /// the global index.
    fn publish_modified_samples(
        &self,
        spec: &TileSpecification,
        id: TileId,
        samples: &[ModifiedSample],
    ) -> Result<()>;

    /// Segment test against the geometry backing materialized cells.
    /// Unmaterialized cells are treated as non-colliding.
    fn raycast(&self, start: Vec3, end: Vec3) -> bool;

    /// Drain and resolve deferred load requests. Owner context only.
    fn update(&self);

    /// Deduplicated count of backing cells with an unresolved load.
    fn pending_load_count(&self) -> usize;
}

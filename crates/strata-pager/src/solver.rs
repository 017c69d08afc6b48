//! The opaque terrain solver boundary
//!
//! The deformation solver itself is external; the pager only needs the
//! calls below. Tiles are handed over fully assembled, deformation
//! results are pulled per tile after each solver step, and paging-body
//! positions are queried through the opaque handles the caller registered.

use strata_core::{BodyHandle, Index2, TileId, Vec3};
use strata_storage::HeightGrid;

use crate::source::ModifiedSample;
use crate::tilemath::TileSpecification;

/// Boundary to the physics/terrain deformation solver.
pub trait TerrainSolver {
    /// Hand a fully assembled tile to the solver. Heights are in solver
    /// space (depth bias applied, never negative).
    fn register_tile(
        &mut self,
        id: TileId,
        spec: &TileSpecification,
        world_origin: Vec3,
        heights: HeightGrid,
    );

    /// Remove a tile from the solver.
    fn deregister_tile(&mut self, id: TileId);

    /// Drain the tile's modified-vertex list accumulated since the last
    /// call. Empty for tiles the solver did not deform.
    fn take_modified(&mut self, id: TileId) -> Vec<ModifiedSample>;

    /// Current position of a registered body, or `None` if the body has
    /// been destroyed externally.
    fn body_position(&self, body: BodyHandle) -> Option<Vec3>;

    /// Read one sample of a resident tile, in solver space.
    fn height_at(&self, id: TileId, local: Index2) -> f32;

    /// Overwrite one sample of a resident tile, in solver space.
    fn set_height(&mut self, id: TileId, local: Index2, height: f32);
}

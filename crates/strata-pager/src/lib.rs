//! Strata Pager - Tile streaming for deformable terrain
//!
//! Pages fixed-size, overlapping terrain tiles in and out of an external
//! deformation solver as tracked bodies move. Tile data comes from a
//! [`TileDataSource`]: either one height grid held entirely in memory, or
//! a multi-cell backing store whose cells are streamed in on demand.
//! Deformation flows the other way, harvested from the solver each step
//! and written back so it survives eviction.

pub mod body;
pub mod config;
pub mod engine;
pub mod multi_grid;
pub mod single_grid;
pub mod solver;
pub mod source;
pub mod tilemath;
pub mod tiling;

pub use body::{PagingBodies, PagingBody};
pub use config::PagerConfig;
pub use engine::{TerrainPagingEngine, TileState};
pub use multi_grid::MultiGridSource;
pub use single_grid::SingleGridSource;
pub use solver::TerrainSolver;
pub use source::{FetchResult, ModifiedSample, TileDataSource};
pub use tilemath::TileSpecification;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use strata_core::{BodyHandle, Index2, TileId, Vec3};
    use strata_storage::HeightGrid;

    struct GridSolver {
        body: Vec3,
        tiles: HashMap<TileId, HeightGrid>,
        modified: HashMap<TileId, Vec<ModifiedSample>>,
    }

    impl TerrainSolver for GridSolver {
        fn register_tile(
            &mut self,
            id: TileId,
            _spec: &TileSpecification,
            _world_origin: Vec3,
            heights: HeightGrid,
        ) {
            self.tiles.insert(id, heights);
        }

        fn deregister_tile(&mut self, id: TileId) {
            self.tiles.remove(&id);
        }

        fn take_modified(&mut self, id: TileId) -> Vec<ModifiedSample> {
            self.modified.remove(&id).unwrap_or_default()
        }

        fn body_position(&self, _body: BodyHandle) -> Option<Vec3> {
            Some(self.body)
        }

        fn height_at(&self, id: TileId, local: Index2) -> f32 {
            self.tiles[&id].get(local.x as u32, local.y as u32)
        }

        fn set_height(&mut self, id: TileId, local: Index2, height: f32) {
            if let Some(grid) = self.tiles.get_mut(&id) {
                grid.set(local.x as u32, local.y as u32, height);
            }
        }
    }

    #[test]
    fn deformation_survives_eviction_and_reload() {
        // Flat 9x9 world at height 1.0, tiles of 5 samples with a
        // 1-sample margin, depth bias 2.0
        let source = Arc::new(
            SingleGridSource::new(HeightGrid::filled(1.0, 9, 9), Vec3::ZERO, 1.0, 2.0).unwrap(),
        );
        let spec = TileSpecification::new(5, 1, 1.0).unwrap();
        let mut engine =
            TerrainPagingEngine::new(spec, Vec3::ZERO, 2.0, source.clone());
        let mut solver = GridSolver {
            body: Vec3::new(2.0, 0.0, 2.0),
            tiles: HashMap::new(),
            modified: HashMap::new(),
        };
        engine.add_body(BodyHandle::from_raw(1), 1.0, 2.0).unwrap();

        // A fully in-memory source never defers
        engine.step(&mut solver);
        let id = TileId::new(0, 0);
        assert_eq!(engine.tile_state(id), TileState::Resident);
        assert_eq!(solver.tiles[&id].get(2, 2), 3.0); // 1.0 + bias

        // Dig a hole at global (2, 2), down to permanent height -1.0
        solver
            .modified
            .insert(id, vec![ModifiedSample::new(Index2::new(2, 2), 1.0)]);
        engine.step(&mut solver);
        assert_eq!(source.height(2, 2), -1.0);

        // Walk away far enough to evict the tile, then come back
        solver.body = Vec3::new(50.0, 0.0, 50.0);
        engine.step(&mut solver);
        assert_eq!(engine.tile_state(id), TileState::Unloaded);

        solver.body = Vec3::new(2.0, 0.0, 2.0);
        engine.step(&mut solver);
        assert_eq!(engine.tile_state(id), TileState::Resident);
        // The hole is still there, biased back into solver space
        assert_eq!(solver.tiles[&id].get(2, 2), 1.0);
    }
}

//! Single-grid tile data source

use std::sync::RwLock;

use strata_core::{Result, StrataError, TileId, Vec3};
use strata_storage::HeightGrid;

use crate::source::{FetchResult, ModifiedSample, TileDataSource};
use crate::tilemath::{self, TileSpecification};

/// Data source backed by one height grid held entirely in memory.
///
/// Every sample is always materialized, so `fetch_tile` never defers and
/// `update` has nothing to do. Tiles reaching outside the grid are
/// reported `NotReady` indefinitely; the pager simply never pages them in.
pub struct SingleGridSource {
    grid: RwLock<HeightGrid>,
    root_origin: Vec3,
    element_size: f32,
    maximum_depth: f32,
}

impl SingleGridSource {
    /// `maximum_depth` is the uniform bias added to every height handed
    /// to the solver, so digging to the full depth never produces a
    /// negative solver-side height.
    pub fn new(
        grid: HeightGrid,
        root_origin: Vec3,
        element_size: f32,
        maximum_depth: f32,
    ) -> Result<Self> {
        if grid.width != grid.depth {
            return Err(StrataError::Config(format!(
                "single-grid source requires a square grid, got {}x{}",
                grid.width, grid.depth
            )));
        }
        Ok(Self {
            grid: RwLock::new(grid),
            root_origin,
            element_size,
            maximum_depth,
        })
    }

    /// Read one permanent height sample. Test and inspection helper.
    pub fn height(&self, x: u32, z: u32) -> f32 {
        read_lock(&self.grid).get(x, z)
    }
}

impl TileDataSource for SingleGridSource {
    fn fetch_tile(&self, spec: &TileSpecification, id: TileId) -> FetchResult {
        let origin = tilemath::tile_origin_to_global(id, spec);
        let resolution = spec.resolution as i32;
        let grid = read_lock(&self.grid);

        if origin.x < 0
            || origin.y < 0
            || origin.x + resolution > grid.width as i32
            || origin.y + resolution > grid.depth as i32
        {
            return FetchResult::NotReady;
        }

        let mut heights = Vec::with_capacity((spec.resolution * spec.resolution) as usize);
        for y in 0..resolution {
            for x in 0..resolution {
                let h = grid.get((origin.x + x) as u32, (origin.y + y) as u32);
                heights.push(h + self.maximum_depth);
            }
        }
        FetchResult::Ready(HeightGrid::from_raw(
            heights,
            spec.resolution,
            spec.resolution,
        ))
    }

    fn publish_modified_samples(
        &self,
        spec: &TileSpecification,
        id: TileId,
        samples: &[ModifiedSample],
    ) -> Result<()> {
        let origin = tilemath::tile_origin_to_global(id, spec);
        let mut grid = self.grid.write().unwrap_or_else(|e| e.into_inner());

        for sample in samples {
            let global = origin + sample.local;
            if global.x < 0
                || global.y < 0
                || global.x >= grid.width as i32
                || global.y >= grid.depth as i32
            {
                log::warn!("modified sample at {global} falls outside the grid, dropped");
                continue;
            }
            grid.set(
                global.x as u32,
                global.y as u32,
                sample.height - self.maximum_depth,
            );
        }
        Ok(())
    }

    fn raycast(&self, start: Vec3, end: Vec3) -> bool {
        read_lock(&self.grid).raycast_segment(start, end, self.root_origin, self.element_size)
    }

    fn update(&self) {}

    fn pending_load_count(&self) -> usize {
        0
    }
}

fn read_lock(grid: &RwLock<HeightGrid>) -> std::sync::RwLockReadGuard<'_, HeightGrid> {
    grid.read().unwrap_or_else(|e| e.into_inner())
}

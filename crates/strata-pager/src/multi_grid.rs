//! Multi-grid tile data source
//!
//! Streams tile data out of a `BackingStore` of adjacent cells. Fetches
//! can arrive from a solver worker thread while the cell data is only
//! accessible to the owner, so a fetch that misses the cache queues a
//! deferred load and reports `NotReady`; the owner's per-step `update`
//! drains the queue, reads materialized cells into the cache, and the
//! fetch succeeds on a later poll. Tile loads are therefore delayed by at
//! least one step.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock};

use crossbeam::channel::{Receiver, Sender};

use strata_core::{Index2, Result, TileId, Vec3};
use strata_storage::{BackingStore, HeightGrid, PatchRect};

use crate::source::{FetchResult, ModifiedSample, TileDataSource};
use crate::tilemath::{self, TileSpecification};

/// A deferred request to materialize one backing cell, recorded on behalf
/// of a tile that needs it.
struct LoadRequest {
    cell: Index2,
    tile: TileId,
}

/// Data source backed by a multi-cell `BackingStore`.
pub struct MultiGridSource<S: BackingStore> {
    /// Mutated only from `update` and `publish_modified_samples`, both
    /// owner-context calls.
    store: Mutex<S>,
    /// Cell data already pulled out of the store; the only state fetches
    /// read.
    cache: RwLock<HashMap<Index2, HeightGrid>>,
    /// Multi-producer side of the load queue; fetches only ever append.
    load_tx: Sender<LoadRequest>,
    load_rx: Receiver<LoadRequest>,
    /// Requests drained from the queue, deduplicated by cell, waiting for
    /// the store to materialize the cell.
    pending: Mutex<HashMap<Index2, HashSet<TileId>>>,
    cell_resolution: u32,
    root_origin: Vec3,
    element_size: f32,
    maximum_depth: f32,
}

impl<S: BackingStore> MultiGridSource<S> {
    pub fn new(store: S, root_origin: Vec3, element_size: f32, maximum_depth: f32) -> Self {
        let (load_tx, load_rx) = crossbeam::channel::unbounded();
        let cell_resolution = store.cell_resolution();
        Self {
            store: Mutex::new(store),
            cache: RwLock::new(HashMap::new()),
            load_tx,
            load_rx,
            pending: Mutex::new(HashMap::new()),
            cell_resolution,
            root_origin,
            element_size,
            maximum_depth,
        }
    }

    /// Run a closure against the backing store. Owner context only.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.store))
    }

    /// Look a global index up in the cache, falling back to the neighbor
    /// cells that share the sample when the canonical cell is not loaded.
    fn cached_height(&self, cache: &HashMap<Index2, HeightGrid>, global: Index2) -> Option<f32> {
        let span = (self.cell_resolution - 1) as u32;
        let (cell, local) = tilemath::global_to_backing_cell(global, self.cell_resolution);
        let (lx, ly) = (local.x as u32, local.y as u32);

        if let Some(grid) = cache.get(&cell) {
            return Some(grid.get(lx, ly));
        }
        if lx == 0 {
            if let Some(grid) = cache.get(&(cell + Index2::new(-1, 0))) {
                return Some(grid.get(span, ly));
            }
        }
        if ly == 0 {
            if let Some(grid) = cache.get(&(cell + Index2::new(0, -1))) {
                return Some(grid.get(lx, span));
            }
        }
        if lx == 0 && ly == 0 {
            if let Some(grid) = cache.get(&(cell + Index2::new(-1, -1))) {
                return Some(grid.get(span, span));
            }
        }
        None
    }
}

impl<S: BackingStore> TileDataSource for MultiGridSource<S> {
    fn fetch_tile(&self, spec: &TileSpecification, id: TileId) -> FetchResult {
        let origin = tilemath::tile_origin_to_global(id, spec);
        let resolution = spec.resolution as i32;
        let cache = read_lock(&self.cache);

        // Every cell the tile overlaps must be loaded before assembly,
        // interior cells included. The highest tile index could be a
        // sample shared with the next cell over; bounding the probe at
        // resolution - 2 guarantees that when its cell is loaded the
        // shared sample is reachable too (via the neighbor fallback in
        // cached_height).
        let max = resolution - 2;
        let (min_cell, _) = tilemath::global_to_backing_cell(origin, self.cell_resolution);
        let (max_cell, _) =
            tilemath::global_to_backing_cell(origin + Index2::new(max, max), self.cell_resolution);

        let mut ready = true;
        for cell_y in min_cell.y..=max_cell.y {
            for cell_x in min_cell.x..=max_cell.x {
                let cell = Index2::new(cell_x, cell_y);
                if !cache.contains_key(&cell) {
                    // Cheap to send duplicates; the consumer deduplicates
                    // by cell when it drains the queue.
                    let _ = self.load_tx.send(LoadRequest { cell, tile: id });
                    ready = false;
                }
            }
        }
        if !ready {
            return FetchResult::NotReady;
        }

        let mut heights = Vec::with_capacity((spec.resolution * spec.resolution) as usize);
        for y in 0..resolution {
            for x in 0..resolution {
                let global = origin + Index2::new(x, y);
                let h = match self.cached_height(&cache, global) {
                    Some(h) => h,
                    None => {
                        log::error!("cannot map global index {global} to a loaded backing cell");
                        0.0
                    }
                };
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
        let span = self.cell_resolution - 1;
        let mut store = lock(&self.store);
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());

        for sample in samples {
            let global = origin + sample.local;
            let height = sample.height - self.maximum_depth;
            let (cell, local) = tilemath::global_to_backing_cell(global, self.cell_resolution);
            let (lx, ly) = (local.x as u32, local.y as u32);

            // A sample on a shared cell edge exists in up to four cells;
            // all of them must agree.
            let mut targets = vec![(cell, lx, ly)];
            if lx == 0 {
                targets.push((cell + Index2::new(-1, 0), span, ly));
            }
            if ly == 0 {
                targets.push((cell + Index2::new(0, -1), lx, span));
            }
            if lx == 0 && ly == 0 {
                targets.push((cell + Index2::new(-1, -1), span, span));
            }

            for (target, x, y) in targets {
                if store.has_cell(target) {
                    store.write_patch_deferred(target, PatchRect::single(x, y), &[height])?;
                }
                if let Some(grid) = cache.get_mut(&target) {
                    grid.set(x, y, height);
                }
            }
        }
        Ok(())
    }

    fn raycast(&self, start: Vec3, end: Vec3) -> bool {
        let span = (self.cell_resolution - 1) as f32 * self.element_size;
        let cache = read_lock(&self.cache);
        cache.iter().any(|(cell, grid)| {
            let origin = Vec3::new(
                self.root_origin.x + cell.x as f32 * span,
                self.root_origin.y,
                self.root_origin.z + cell.y as f32 * span,
            );
            grid.raycast_segment(start, end, origin, self.element_size)
        })
    }

    fn update(&self) {
        let mut pending = lock(&self.pending);
        while let Ok(request) = self.load_rx.try_recv() {
            pending
                .entry(request.cell)
                .or_default()
                .insert(request.tile);
        }

        let mut store = lock(&self.store);
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let resolution = self.cell_resolution;

        pending.retain(|cell, tiles| {
            if !store.has_cell(*cell) {
                // Off the edge of the stored world; the waiting tiles
                // stay NotReady, which simply clips them.
                return true;
            }
            if !store.is_materialized(*cell) {
                return true;
            }
            match store.read_patch(*cell, PatchRect::new(0, 0, resolution, resolution)) {
                Ok(heights) => {
                    cache.insert(*cell, HeightGrid::from_raw(heights, resolution, resolution));
                    log::debug!(
                        "loaded backing cell {cell}, {} tile(s) were waiting",
                        tiles.len()
                    );
                    false
                }
                Err(e) => {
                    log::warn!("failed to load backing cell {cell}: {e}");
                    true
                }
            }
        });
    }

    fn pending_load_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_lock<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
) -> std::sync::RwLockReadGuard<'a, HashMap<K, V>> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::InMemoryBackingStore;

    const CELL_RES: u32 = 5; // span of 4 samples between cell origins

    fn spec() -> TileSpecification {
        TileSpecification::new(5, 1, 1.0).unwrap()
    }

    /// 2x2 cells, each filled with a height equal to 10 * (x + 2 * y).
    fn store_2x2(materialized: bool) -> InMemoryBackingStore {
        let mut store = InMemoryBackingStore::new(CELL_RES).unwrap();
        for y in 0..2 {
            for x in 0..2 {
                let coord = Index2::new(x, y);
                let height = 10.0 * (x + 2 * y) as f32;
                let grid = HeightGrid::filled(height, CELL_RES, CELL_RES);
                if materialized {
                    store.insert_cell(coord, grid).unwrap();
                } else {
                    store.insert_virtual_cell(coord, grid).unwrap();
                }
            }
        }
        store
    }

    fn source(materialized: bool) -> MultiGridSource<InMemoryBackingStore> {
        MultiGridSource::new(store_2x2(materialized), Vec3::ZERO, 1.0, 0.0)
    }

    #[test]
    fn fetch_defers_until_update_materializes_cells() {
        let source = source(true);

        // First fetch: nothing cached yet, loads are queued
        assert!(!source.fetch_tile(&spec(), TileId::new(0, 0)).is_ready());
        source.update();
        assert_eq!(source.pending_load_count(), 0);

        // Second poll succeeds from the cache
        match source.fetch_tile(&spec(), TileId::new(0, 0)) {
            FetchResult::Ready(grid) => assert_eq!(grid.get(0, 0), 0.0),
            FetchResult::NotReady => panic!("cell is materialized after update"),
        }
    }

    #[test]
    fn repeated_fetch_enqueues_one_pending_load_per_cell() {
        let source = source(false);

        // Tile (1,1) spans all four cells
        assert!(!source.fetch_tile(&spec(), TileId::new(1, 1)).is_ready());
        assert!(!source.fetch_tile(&spec(), TileId::new(1, 1)).is_ready());
        source.update();

        // Cells are virtual, so the deduplicated entries stay pending
        assert_eq!(source.pending_load_count(), 4);
    }

    #[test]
    fn tile_waiting_on_late_cell_loads_once_it_materializes() {
        let source = source(false);
        let id = TileId::new(0, 0);

        assert!(!source.fetch_tile(&spec(), id).is_ready());
        source.update();
        assert!(!source.fetch_tile(&spec(), id).is_ready());

        source.with_store(|store| store.materialize(Index2::new(0, 0)).unwrap());
        source.update();
        assert_eq!(source.pending_load_count(), 0);
        assert!(source.fetch_tile(&spec(), id).is_ready());
    }

    #[test]
    fn tile_spanning_interior_cells_waits_for_all_of_them() {
        // 3x3 cells (span 4) with distinct heights; a 10-sample tile
        // covers all nine, including the center cells no corner touches
        let mut store = InMemoryBackingStore::new(CELL_RES).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                let height = 10.0 * (x + 3 * y) as f32;
                store
                    .insert_cell(Index2::new(x, y), HeightGrid::filled(height, CELL_RES, CELL_RES))
                    .unwrap();
            }
        }
        let source = MultiGridSource::new(store, Vec3::ZERO, 1.0, 0.0);
        let wide = TileSpecification::new(10, 0, 1.0).unwrap();
        let id = TileId::new(0, 0);

        assert!(!source.fetch_tile(&wide, id).is_ready());
        source.update();
        assert_eq!(source.pending_load_count(), 0);

        let grid = match source.fetch_tile(&wide, id) {
            FetchResult::Ready(grid) => grid,
            FetchResult::NotReady => panic!("all nine cells are materialized"),
        };
        // Global (5, 0) lives in the center-column cell (1, 0)
        assert_eq!(grid.get(5, 0), 10.0);
        // Global (5, 5) lives in the center cell (1, 1)
        assert_eq!(grid.get(5, 5), 40.0);
        // Global (9, 9) lives in the far corner cell (2, 2)
        assert_eq!(grid.get(9, 9), 80.0);
    }

    #[test]
    fn assembled_tile_stitches_across_cells() {
        let source = source(true);
        let id = TileId::new(1, 1); // global origin (3, 3), samples 3..=7

        assert!(!source.fetch_tile(&spec(), id).is_ready());
        source.update();

        let grid = match source.fetch_tile(&spec(), id) {
            FetchResult::Ready(grid) => grid,
            FetchResult::NotReady => panic!("all cells materialized"),
        };

        // Local (0,0) = global (3,3) lives in cell (0,0): height 0
        assert_eq!(grid.get(0, 0), 0.0);
        // Local (4,0) = global (7,3) lives in cell (1,0): height 10
        assert_eq!(grid.get(4, 0), 10.0);
        // Local (0,4) = global (3,7) lives in cell (0,1): height 20
        assert_eq!(grid.get(0, 4), 20.0);
        // Local (4,4) = global (7,7) lives in cell (1,1): height 30
        assert_eq!(grid.get(4, 4), 30.0);
    }

    #[test]
    fn boundary_sample_is_written_to_every_sharing_cell() {
        let source = source(true);
        let id = TileId::new(1, 1);

        // Global (4, 4) is the sample shared by all four cells: canonical
        // cell (1,1) local (0,0), plus three lower-index neighbors
        source
            .publish_modified_samples(&spec(), id, &[ModifiedSample::new(Index2::new(1, 1), 42.0)])
            .unwrap();

        source.with_store(|store| {
            store.flush();
            assert_eq!(store.raw_height(Index2::new(1, 1), 0, 0), Some(42.0));
            assert_eq!(store.raw_height(Index2::new(0, 1), 4, 0), Some(42.0));
            assert_eq!(store.raw_height(Index2::new(1, 0), 0, 4), Some(42.0));
            assert_eq!(store.raw_height(Index2::new(0, 0), 4, 4), Some(42.0));
        });
    }

    #[test]
    fn depth_bias_applied_on_fetch_and_removed_on_publish() {
        let source = MultiGridSource::new(store_2x2(true), Vec3::ZERO, 1.0, 2.5);
        let id = TileId::new(0, 0);

        assert!(!source.fetch_tile(&spec(), id).is_ready());
        source.update();
        match source.fetch_tile(&spec(), id) {
            FetchResult::Ready(grid) => assert_eq!(grid.get(1, 1), 2.5), // 0.0 + bias
            FetchResult::NotReady => panic!(),
        }

        source
            .publish_modified_samples(&spec(), id, &[ModifiedSample::new(Index2::new(1, 1), 6.5)])
            .unwrap();
        source.with_store(|store| {
            store.flush();
            assert_eq!(store.raw_height(Index2::new(0, 0), 1, 1), Some(4.0));
        });
    }

    #[test]
    fn raycast_misses_unloaded_cells() {
        let source = source(true);

        // Nothing cached yet: soft miss
        assert!(!source.raycast(Vec3::new(1.0, 5.0, 1.0), Vec3::new(1.0, -5.0, 1.0)));

        // Load cell (0,0) (height 0) and try again
        assert!(!source.fetch_tile(&spec(), TileId::new(0, 0)).is_ready());
        source.update();
        assert!(source.raycast(Vec3::new(1.0, 5.0, 1.0), Vec3::new(1.0, -5.0, 1.0)));
    }
}

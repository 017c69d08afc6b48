//! The terrain paging engine
//!
//! Owns the resident-tile table and the registered paging bodies, and
//! runs the per-step reconciliation that pages tiles in and out of the
//! solver as bodies move. The engine is the single consumer of the data
//! source's deferred load queue and the only caller that pushes modified
//! heights back toward backing storage.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_core::{BodyHandle, Index2, Result, StrataError, TileId, Vec3};

use crate::body::PagingBodies;
use crate::config::PagerConfig;
use crate::solver::TerrainSolver;
use crate::source::{FetchResult, ModifiedSample, TileDataSource};
use crate::tilemath::{self, TileSpecification};
use crate::tiling;

/// Residency state of one tile.
///
/// `Unloaded` tiles are absent from the table. `Requested` tiles loop on
/// themselves while their backing data streams in. `Evicting` is the
/// transient harvest-and-deregister state on the way back to `Unloaded`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    Unloaded,
    Requested,
    Resident,
    Evicting,
}

/// One contiguous piece of a height patch that falls inside a single
/// resident tile.
struct PatchSegment {
    id: TileId,
    tile_start: Index2,
    out_offset: Index2,
    width: u32,
    height: u32,
}

/// The paging engine. Drives tile residency from paging-body positions
/// and reconciles solver-side deformation with backing storage.
pub struct TerrainPagingEngine {
    spec: TileSpecification,
    root_origin: Vec3,
    /// Uniform height bias the data source applies toward the solver;
    /// removed again on the host-facing patch operations.
    height_bias: f32,
    source: Arc<dyn TileDataSource>,
    bodies: PagingBodies,
    tiles: HashMap<TileId, TileState>,
    missing_required: Vec<TileId>,
}

impl TerrainPagingEngine {
    pub fn new(
        spec: TileSpecification,
        root_origin: Vec3,
        height_bias: f32,
        source: Arc<dyn TileDataSource>,
    ) -> Self {
        Self {
            spec,
            root_origin,
            height_bias,
            source,
            bodies: PagingBodies::new(),
            tiles: HashMap::new(),
            missing_required: Vec::new(),
        }
    }

    /// Build an engine from a host configuration, auto-correcting the
    /// tile parameters against the backing field when requested. An
    /// uncorrectable configuration degrades (edge tiles are clipped)
    /// rather than failing.
    pub fn from_config(
        config: &PagerConfig,
        heightfield_resolution: u32,
        element_size: f32,
        root_origin: Vec3,
        source: Arc<dyn TileDataSource>,
    ) -> Result<Self> {
        let mut size = config.tile_size_samples(element_size);
        let mut overlap = config.tile_overlap_samples(element_size);

        if !tiling::parameters_are_valid(heightfield_resolution, size, overlap) {
            if config.auto_correct {
                match tiling::resolve(heightfield_resolution, size, overlap) {
                    Some((s, o)) => {
                        log::info!(
                            "tile parameters corrected from ({size}, {overlap}) to ({s}, {o})"
                        );
                        size = s;
                        overlap = o;
                    }
                    None => log::warn!(
                        "no valid tiling near ({size}, {overlap}) for a field of \
                         {heightfield_resolution} samples; edge tiles will be clipped"
                    ),
                }
            } else {
                log::warn!(
                    "tile parameters ({size}, {overlap}) do not evenly tile the field of \
                     {heightfield_resolution} samples"
                );
            }
        }

        let spec = TileSpecification::new(size, overlap, element_size)?;
        Ok(Self::new(spec, root_origin, config.maximum_depth, source))
    }

    pub fn spec(&self) -> &TileSpecification {
        &self.spec
    }

    /// Register a body, or update its radii if already registered.
    pub fn add_body(&mut self, handle: BodyHandle, required: f32, preload: f32) -> Result<()> {
        self.bodies.add(handle, required, preload)
    }

    /// Unregister a body. Unknown handles are a logged no-op.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies.remove(handle)
    }

    /// Update the radii of a registered body. Unknown handles are a
    /// logged no-op; the returned flag reports whether a body was updated.
    pub fn set_load_radii(
        &mut self,
        handle: BodyHandle,
        required: f32,
        preload: f32,
    ) -> Result<bool> {
        self.bodies.set_radii(handle, required, preload)
    }

    pub fn load_radii(&self, handle: BodyHandle) -> Option<(f32, f32)> {
        self.bodies.radii(handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn tile_state(&self, id: TileId) -> TileState {
        self.tiles.get(&id).copied().unwrap_or(TileState::Unloaded)
    }

    pub fn resident_tiles(&self) -> Vec<TileId> {
        let mut tiles: Vec<TileId> = self
            .tiles
            .iter()
            .filter(|(_, s)| **s == TileState::Resident)
            .map(|(id, _)| *id)
            .collect();
        tiles.sort_by_key(|id| (id.y, id.x));
        tiles
    }

    /// Tiles inside some body's required radius that are not yet
    /// resident, as of the last step. A host that must not simulate over
    /// missing ground can stall on this being non-empty.
    pub fn missing_required(&self) -> &[TileId] {
        &self.missing_required
    }

    /// One reconciliation pass, run after each solver step.
    pub fn step<S: TerrainSolver>(&mut self, solver: &mut S) {
        // Resolve deferred loads first so tiles requested during earlier
        // steps can come up this step.
        self.source.update();

        self.bodies
            .purge_dangling(|handle| solver.body_position(handle).is_some());

        // Demand is the union over all bodies; a tile required by one
        // body is never evicted on behalf of another.
        let mut demanded: HashSet<TileId> = HashSet::new();
        let mut required: HashSet<TileId> = HashSet::new();
        for body in self.bodies.iter() {
            let Some(position) = solver.body_position(body.handle) else {
                continue;
            };
            demanded.extend(tilemath::tiles_in_radius(
                position,
                body.preload_radius,
                &self.spec,
                self.root_origin,
            ));
            required.extend(tilemath::tiles_in_radius(
                position,
                body.required_radius,
                &self.spec,
                self.root_origin,
            ));
        }

        // Page in
        for &id in &demanded {
            if self.tile_state(id) == TileState::Resident {
                continue;
            }
            match self.source.fetch_tile(&self.spec, id) {
                FetchResult::Ready(heights) => {
                    let origin = tilemath::tile_world_origin(id, &self.spec, self.root_origin);
                    solver.register_tile(id, &self.spec, origin, heights);
                    self.tiles.insert(id, TileState::Resident);
                    log::debug!("{id} is resident");
                }
                FetchResult::NotReady => {
                    self.tiles.insert(id, TileState::Requested);
                }
            }
        }

        // Page out everything no body demands anymore
        let stale: Vec<TileId> = self
            .tiles
            .keys()
            .filter(|id| !demanded.contains(id))
            .copied()
            .collect();
        for id in stale {
            let was = self.tiles.insert(id, TileState::Evicting);
            if was == Some(TileState::Resident) {
                let samples = solver.take_modified(id);
                if !samples.is_empty() {
                    if let Err(e) = self.source.publish_modified_samples(&self.spec, id, &samples)
                    {
                        log::warn!("failed to publish final samples of {id}: {e}");
                    }
                }
                solver.deregister_tile(id);
                log::debug!("{id} evicted");
            }
            self.tiles.remove(&id);
        }

        // Harvest deformation from the tiles that stay resident
        for id in self.resident_tiles() {
            let samples = solver.take_modified(id);
            if !samples.is_empty() {
                if let Err(e) = self.source.publish_modified_samples(&self.spec, id, &samples) {
                    log::warn!("failed to publish modified samples of {id}: {e}");
                }
            }
        }

        self.missing_required = required
            .into_iter()
            .filter(|id| self.tile_state(*id) != TileState::Resident)
            .collect();
        self.missing_required.sort_by_key(|id| (id.y, id.x));
    }

    /// Read a rectangle of heights in global indices, stitched across
    /// resident tiles. Fails with `InactiveTile` if any part of the
    /// rectangle is not resident.
    pub fn get_heights<S: TerrainSolver>(
        &self,
        solver: &S,
        start: Index2,
        width: u32,
        height: u32,
    ) -> Result<Vec<f32>> {
        let plan = self.plan_patch(start, width, height)?;

        let mut out = vec![0.0; (width * height) as usize];
        for segment in &plan {
            for y in 0..segment.height {
                for x in 0..segment.width {
                    let local = segment.tile_start + Index2::new(x as i32, y as i32);
                    let h = solver.height_at(segment.id, local) - self.height_bias;
                    let ox = segment.out_offset.x as u32 + x;
                    let oy = segment.out_offset.y as u32 + y;
                    out[(oy * width + ox) as usize] = h;
                }
            }
        }
        Ok(out)
    }

    pub fn get_height<S: TerrainSolver>(&self, solver: &S, index: Index2) -> Result<f32> {
        Ok(self.get_heights(solver, index, 1, 1)?[0])
    }

    /// Write a rectangle of heights in global indices into the resident
    /// tiles and publish the changes to backing storage. Validates that
    /// the whole rectangle is resident before writing anything.
    pub fn set_heights<S: TerrainSolver>(
        &self,
        solver: &mut S,
        start: Index2,
        width: u32,
        height: u32,
        heights: &[f32],
    ) -> Result<()> {
        if heights.len() != (width * height) as usize {
            return Err(StrataError::Config(format!(
                "height data length {} does not match patch [{width}, {height}]",
                heights.len()
            )));
        }
        let plan = self.plan_patch(start, width, height)?;
        let resident = self.resident_tiles();
        let resolution = self.spec.resolution as i32;

        for segment in &plan {
            let segment_origin = tilemath::tile_origin_to_global(segment.id, &self.spec);
            let mut samples = Vec::with_capacity((segment.width * segment.height) as usize);
            for y in 0..segment.height {
                for x in 0..segment.width {
                    let ox = segment.out_offset.x as u32 + x;
                    let oy = segment.out_offset.y as u32 + y;
                    let h = heights[(oy * width + ox) as usize] + self.height_bias;
                    let local = segment.tile_start + Index2::new(x as i32, y as i32);
                    let global = segment_origin + local;

                    // A sample on the overlap margin exists in every tile
                    // sharing the global index; all resident copies must
                    // agree.
                    for &tile in &resident {
                        let rel = global - tilemath::tile_origin_to_global(tile, &self.spec);
                        if rel.x >= 0 && rel.y >= 0 && rel.x < resolution && rel.y < resolution {
                            solver.set_height(tile, rel, h);
                        }
                    }
                    samples.push(ModifiedSample::new(local, h));
                }
            }
            self.source
                .publish_modified_samples(&self.spec, segment.id, &samples)?;
        }
        Ok(())
    }

    pub fn set_height<S: TerrainSolver>(
        &self,
        solver: &mut S,
        index: Index2,
        height: f32,
    ) -> Result<()> {
        self.set_heights(solver, index, 1, 1, &[height])
    }

    /// Split a patch into per-tile segments. A patch overlapping a
    /// resident tile at its low corner is divided into the intersection
    /// with that tile, the columns to its right, and the rows above the
    /// intersection; the remainders recurse.
    ///
    ///  ____________
    ///  |   |   3  |
    ///  |   |______|
    ///  | 2 |   1  |
    ///  |___|______|
    fn plan_patch(&self, start: Index2, width: u32, height: u32) -> Result<Vec<PatchSegment>> {
        if width == 0 || height == 0 {
            return Err(StrataError::Config(format!(
                "patch width and height must be positive, got [{width}, {height}]"
            )));
        }
        // Sorted, so an overlap-margin sample is always served by the
        // same tile no matter how the patch is split.
        let resident = self.resident_tiles();
        let mut plan = Vec::new();
        self.plan_patch_inner(&resident, start, width, height, Index2::ZERO, &mut plan)?;
        Ok(plan)
    }

    fn plan_patch_inner(
        &self,
        resident: &[TileId],
        start: Index2,
        width: u32,
        height: u32,
        out_offset: Index2,
        plan: &mut Vec<PatchSegment>,
    ) -> Result<()> {
        let resolution = self.spec.resolution as i32;

        for &id in resident {
            let origin = tilemath::tile_origin_to_global(id, &self.spec);
            if origin.x > start.x
                || origin.y > start.y
                || origin.x + resolution <= start.x
                || origin.y + resolution <= start.y
            {
                continue;
            }

            let tile_start = start - origin;
            let take_w = width.min((resolution - tile_start.x) as u32);
            let take_h = height.min((resolution - tile_start.y) as u32);

            plan.push(PatchSegment {
                id,
                tile_start,
                out_offset,
                width: take_w,
                height: take_h,
            });

            // Columns to the right of the intersection, full height
            if take_w != width {
                self.plan_patch_inner(
                    resident,
                    Index2::new(start.x + take_w as i32, start.y),
                    width - take_w,
                    height,
                    Index2::new(out_offset.x + take_w as i32, out_offset.y),
                    plan,
                )?;
            }
            // Rows above the intersection
            if take_h != height {
                self.plan_patch_inner(
                    resident,
                    Index2::new(start.x, start.y + take_h as i32),
                    take_w,
                    height - take_h,
                    Index2::new(out_offset.x, out_offset.y + take_h as i32),
                    plan,
                )?;
            }
            return Ok(());
        }

        Err(StrataError::InactiveTile {
            x: start.x,
            y: start.y,
            width,
            height,
        })
    }
}

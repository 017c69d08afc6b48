//! Tile coordinate math
//!
//! Pure conversions between the three index spaces of the pager: the
//! global height-field index, per-tile local indices, and backing-cell
//! local indices. Adjacent tiles share `margin + 1` sample columns and
//! adjacent backing cells share one sample column, so both mappings use
//! the "elements per tile/cell" span rather than the raw resolution.

use serde::{Deserialize, Serialize};
use strata_core::{Index2, Result, StrataError, TileId, Vec3};

/// Immutable description of the tiles a pager produces.
///
/// `resolution` is samples per tile edge including the overlap margin,
/// `margin` the number of samples shared with each neighbor, and
/// `element_size` the world distance between samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileSpecification {
    pub resolution: u32,
    pub margin: u32,
    pub element_size: f32,
}

impl TileSpecification {
    /// Create a specification. `resolution` must exceed `margin + 1` so
    /// every tile contributes at least one element of new ground.
    pub fn new(resolution: u32, margin: u32, element_size: f32) -> Result<Self> {
        if resolution <= margin + 1 {
            return Err(StrataError::Config(format!(
                "tile resolution {resolution} must exceed margin {margin} + 1"
            )));
        }
        if element_size <= 0.0 {
            return Err(StrataError::Config(format!(
                "element size must be positive, got {element_size}"
            )));
        }
        Ok(Self {
            resolution,
            margin,
            element_size,
        })
    }

    /// Elements of new ground each tile adds along an axis; the spacing
    /// of tile origins in the global index space.
    pub fn elements_per_tile(&self) -> i32 {
        (self.resolution - self.margin - 1) as i32
    }

    /// World-space length of a tile edge, margin included.
    pub fn tile_world_size(&self) -> f32 {
        (self.resolution - 1) as f32 * self.element_size
    }

    /// World-space spacing between adjacent tile origins.
    pub fn tile_world_stride(&self) -> f32 {
        self.elements_per_tile() as f32 * self.element_size
    }
}

/// Global index of a tile's (0, 0) sample.
pub fn tile_origin_to_global(id: TileId, spec: &TileSpecification) -> Index2 {
    let ept = spec.elements_per_tile();
    Index2::new(id.x * ept, id.y * ept)
}

/// Map a global index to its canonical backing cell and the index within
/// that cell. Shared-edge samples belong to the cell where the local
/// index is not maximal, so the local result is always in
/// `[0, cell_resolution - 2]`.
pub fn global_to_backing_cell(global: Index2, cell_resolution: u32) -> (Index2, Index2) {
    let span = (cell_resolution - 1) as i32;
    let cell = Index2::new(global.x.div_euclid(span), global.y.div_euclid(span));
    let local = global - cell * span;
    (cell, local)
}

/// Inverse of [`global_to_backing_cell`].
pub fn backing_cell_to_global(cell: Index2, local: Index2, cell_resolution: u32) -> Index2 {
    let span = (cell_resolution - 1) as i32;
    cell * span + local
}

/// World position of a tile's (0, 0) sample.
pub fn tile_world_origin(id: TileId, spec: &TileSpecification, root_origin: Vec3) -> Vec3 {
    let stride = spec.tile_world_stride();
    Vec3::new(
        root_origin.x + id.x as f32 * stride,
        root_origin.y,
        root_origin.z + id.y as f32 * stride,
    )
}

/// Global index of a sample reported by the solver, given the world
/// position of the tile that owns it and the sample's tile-local index.
pub fn global_index_of_sample(
    tile_world_pos: Vec3,
    root_origin: Vec3,
    spec: &TileSpecification,
    local: Index2,
) -> Index2 {
    let stride = spec.tile_world_stride();
    let rel = tile_world_pos - root_origin;
    let tile = Index2::new(
        (rel.x / stride).floor() as i32,
        (rel.z / stride).floor() as i32,
    );
    tile * spec.elements_per_tile() + local
}

/// XZ distance from a point to a tile's world-space footprint (zero when
/// the point is over the tile).
pub fn tile_distance_xz(
    point: Vec3,
    id: TileId,
    spec: &TileSpecification,
    root_origin: Vec3,
) -> f32 {
    let origin = tile_world_origin(id, spec, root_origin);
    let size = spec.tile_world_size();

    let dx = (origin.x - point.x).max(point.x - (origin.x + size)).max(0.0);
    let dz = (origin.z - point.z).max(point.z - (origin.z + size)).max(0.0);
    (dx * dx + dz * dz).sqrt()
}

/// All tiles whose footprint lies within `radius` of the point, in XZ.
pub fn tiles_in_radius(
    center: Vec3,
    radius: f32,
    spec: &TileSpecification,
    root_origin: Vec3,
) -> Vec<TileId> {
    if radius < 0.0 {
        return Vec::new();
    }

    let stride = spec.tile_world_stride();
    let size = spec.tile_world_size();
    let rel_x = center.x - root_origin.x;
    let rel_z = center.z - root_origin.z;

    // Candidate id range from the circle's bounding box, then exact
    // rectangle distance per tile.
    let min_x = ((rel_x - radius - size) / stride).ceil() as i32;
    let max_x = ((rel_x + radius) / stride).floor() as i32;
    let min_z = ((rel_z - radius - size) / stride).ceil() as i32;
    let max_z = ((rel_z + radius) / stride).floor() as i32;

    let mut tiles = Vec::new();
    for y in min_z..=max_z {
        for x in min_x..=max_x {
            let id = TileId::new(x, y);
            if tile_distance_xz(center, id, spec, root_origin) <= radius {
                tiles.push(id);
            }
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TileSpecification {
        TileSpecification::new(5, 1, 1.0).unwrap()
    }

    #[test]
    fn spec_rejects_degenerate_parameters() {
        assert!(TileSpecification::new(3, 2, 1.0).is_err());
        assert!(TileSpecification::new(5, 1, 0.0).is_err());
        assert!(TileSpecification::new(5, 1, 1.0).is_ok());
    }

    #[test]
    fn tile_origin_uses_elements_per_tile() {
        // resolution 5, margin 1 => 3 elements of new ground per tile
        assert_eq!(spec().elements_per_tile(), 3);
        assert_eq!(
            tile_origin_to_global(TileId::new(2, -1), &spec()),
            Index2::new(6, -3)
        );
    }

    #[test]
    fn global_to_backing_cell_round_trips() {
        let cell_resolution = 9; // span of 8
        for y in -20..20 {
            for x in -20..20 {
                let global = Index2::new(x, y);
                let (cell, local) = global_to_backing_cell(global, cell_resolution);
                assert!(local.x >= 0 && local.x < 8);
                assert!(local.y >= 0 && local.y < 8);
                assert_eq!(
                    backing_cell_to_global(cell, local, cell_resolution),
                    global
                );
            }
        }
    }

    #[test]
    fn shared_edge_belongs_to_higher_cell() {
        // Global index 8 with span 8 is the shared sample between cells
        // 0 and 1; the canonical owner is cell 1 at local 0.
        let (cell, local) = global_to_backing_cell(Index2::new(8, 0), 9);
        assert_eq!(cell, Index2::new(1, 0));
        assert_eq!(local, Index2::new(0, 0));
    }

    #[test]
    fn sample_global_index_from_tile_world_position() {
        let spec = spec();
        let root = Vec3::new(10.0, 0.0, -5.0);
        let tile_pos = tile_world_origin(TileId::new(3, 2), &spec, root);

        let global = global_index_of_sample(tile_pos, root, &spec, Index2::new(1, 2));
        assert_eq!(global, Index2::new(3 * 3 + 1, 2 * 3 + 2));
    }

    #[test]
    fn tile_distance_is_zero_over_the_tile() {
        let spec = spec();
        let root = Vec3::ZERO;
        // Tile (0,0) spans [0,4]x[0,4] in world space
        assert_eq!(
            tile_distance_xz(Vec3::new(2.0, 50.0, 2.0), TileId::new(0, 0), &spec, root),
            0.0
        );
        let d = tile_distance_xz(Vec3::new(7.0, 0.0, 2.0), TileId::new(0, 0), &spec, root);
        assert!((d - 3.0).abs() < 1e-6);
    }

    #[test]
    fn tiles_in_radius_matches_rectangle_distance() {
        let spec = spec();
        let root = Vec3::ZERO;
        let center = Vec3::new(2.0, 0.0, 2.0);

        let tiles = tiles_in_radius(center, 0.5, &spec, root);
        assert_eq!(tiles, vec![TileId::new(0, 0)]);

        let tiles = tiles_in_radius(center, 3.0, &spec, root);
        // Reaches into the neighboring tiles on every side
        assert!(tiles.contains(&TileId::new(0, 0)));
        assert!(tiles.contains(&TileId::new(-1, 0)));
        assert!(tiles.contains(&TileId::new(0, -1)));
        assert!(tiles.contains(&TileId::new(1, 0)));
        for id in &tiles {
            assert!(tile_distance_xz(center, *id, &spec, root) <= 3.0);
        }
    }
}

//! Height grid storage and sampling

use std::path::Path;

use strata_core::{Result, StrataError, Vec3};

/// A row-major grid of height samples.
///
/// The unit of height data everywhere in Strata: backing cells store one,
/// and assembled tile buffers handed to the solver are one.
#[derive(Clone, Debug)]
pub struct HeightGrid {
    heights: Vec<f32>,
    /// Samples along X
    pub width: u32,
    /// Samples along Z
    pub depth: u32,
}

impl HeightGrid {
    /// Create a grid from raw row-major height data.
    pub fn from_raw(heights: Vec<f32>, width: u32, depth: u32) -> Self {
        assert_eq!(heights.len(), (width * depth) as usize);
        Self {
            heights,
            width,
            depth,
        }
    }

    /// Create a grid filled with a constant height.
    pub fn filled(height: f32, width: u32, depth: u32) -> Self {
        Self {
            heights: vec![height; (width * depth) as usize],
            width,
            depth,
        }
    }

    /// Load a grid from a grayscale PNG file.
    /// Pixel values are normalized to [0..1] and scaled by `height_scale`.
    pub fn from_png(path: &Path, height_scale: f32) -> Result<Self> {
        let img = image::open(path).map_err(|e| {
            StrataError::HeightmapLoad(format!("'{}': {}", path.display(), e))
        })?;

        let gray = img.into_luma16();
        let width = gray.width();
        let depth = gray.height();

        let heights: Vec<f32> = gray
            .pixels()
            .map(|p| p.0[0] as f32 / 65535.0 * height_scale)
            .collect();

        Ok(Self {
            heights,
            width,
            depth,
        })
    }

    pub fn get(&self, x: u32, z: u32) -> f32 {
        self.heights[(z * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, z: u32, height: f32) {
        self.heights[(z * self.width + x) as usize] = height;
    }

    /// Borrow the raw row-major height data.
    pub fn raw(&self) -> &[f32] {
        &self.heights
    }

    /// Bilinear sample at continuous sample-space coordinates.
    /// Coordinates are clamped to the grid.
    pub fn sample(&self, fx: f32, fz: f32) -> f32 {
        let fx = fx.clamp(0.0, (self.width - 1) as f32);
        let fz = fz.clamp(0.0, (self.depth - 1) as f32);

        let x0 = (fx as u32).min(self.width.saturating_sub(2));
        let z0 = (fz as u32).min(self.depth.saturating_sub(2));
        let x1 = (x0 + 1).min(self.width - 1);
        let z1 = (z0 + 1).min(self.depth - 1);

        let tx = fx - x0 as f32;
        let tz = fz - z0 as f32;

        let h00 = self.get(x0, z0);
        let h10 = self.get(x1, z0);
        let h01 = self.get(x0, z1);
        let h11 = self.get(x1, z1);

        let h0 = h00 * (1.0 - tx) + h10 * tx;
        let h1 = h01 * (1.0 - tx) + h11 * tx;

        h0 * (1.0 - tz) + h1 * tz
    }

    /// Test a world-space segment against the surface of this grid.
    ///
    /// `origin` is the world position of sample (0, 0) and `element_size`
    /// the world distance between samples. The segment is marched at half
    /// an element per step; a point at or below the interpolated surface
    /// is a hit. Points outside the grid footprint never hit.
    pub fn raycast_segment(
        &self,
        start: Vec3,
        end: Vec3,
        origin: Vec3,
        element_size: f32,
    ) -> bool {
        let delta = end - start;
        let length = delta.length();
        if length <= 0.0 || element_size <= 0.0 {
            return false;
        }

        let steps = ((length / (element_size * 0.5)).ceil() as u32).max(1);
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let p = start + delta * t;

            let fx = (p.x - origin.x) / element_size;
            let fz = (p.z - origin.z) / element_size;
            if fx < 0.0
                || fz < 0.0
                || fx > (self.width - 1) as f32
                || fz > (self.depth - 1) as f32
            {
                continue;
            }

            if p.y <= origin.y + self.sample(fx, fz) {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_interpolates_between_samples() {
        // 2x2 grid, heights rise along X from 0 to 1
        let grid = HeightGrid::from_raw(vec![0.0, 1.0, 0.0, 1.0], 2, 2);

        assert!((grid.sample(0.0, 0.0) - 0.0).abs() < 1e-6);
        assert!((grid.sample(1.0, 1.0) - 1.0).abs() < 1e-6);
        assert!((grid.sample(0.5, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn get_set_round_trip() {
        let mut grid = HeightGrid::filled(0.0, 3, 3);
        grid.set(2, 1, 4.5);
        assert_eq!(grid.get(2, 1), 4.5);
        assert_eq!(grid.get(1, 2), 0.0);
    }

    #[test]
    fn raycast_hits_flat_surface() {
        let grid = HeightGrid::filled(1.0, 5, 5);

        // Descending ray through the surface
        let hit = grid.raycast_segment(
            Vec3::new(2.0, 5.0, 2.0),
            Vec3::new(2.0, -1.0, 2.0),
            Vec3::ZERO,
            1.0,
        );
        assert!(hit);

        // Ray entirely above the surface
        let miss = grid.raycast_segment(
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(4.0, 3.0, 4.0),
            Vec3::ZERO,
            1.0,
        );
        assert!(!miss);
    }

    #[test]
    fn raycast_outside_footprint_misses() {
        let grid = HeightGrid::filled(1.0, 5, 5);

        let hit = grid.raycast_segment(
            Vec3::new(10.0, 5.0, 10.0),
            Vec3::new(10.0, -1.0, 10.0),
            Vec3::ZERO,
            1.0,
        );
        assert!(!hit);
    }
}

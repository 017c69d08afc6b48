//! Pager configuration

use serde::{Deserialize, Serialize};
use strata_core::{Result, StrataError};

/// Configuration for a terrain pager, parsed from the host's TOML.
///
/// Tile size and overlap are given in meters and converted to sample
/// counts against the backing field's element size. The solver requires
/// odd tile sizes, so the sample conversion rounds up to the next odd
/// count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    /// Desired tile edge length in meters
    pub tile_size: f32,
    /// Desired overlap between adjacent tiles in meters
    pub tile_overlap: f32,
    /// Auto-correct tile parameters to a valid pair on startup
    pub auto_correct: bool,
    /// Maximum diggable depth; applied as a uniform height bias so the
    /// solver never sees negative heights
    pub maximum_depth: f32,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            tile_size: 28.0,
            tile_overlap: 5.0,
            auto_correct: true,
            maximum_depth: 2.0,
        }
    }
}

impl PagerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StrataError::Config(e.to_string()))
    }

    /// Tile size in samples, forced odd upward.
    pub fn tile_size_samples(&self, element_size: f32) -> u32 {
        let count = (self.tile_size / element_size).ceil() as u32;
        count + (count + 1) % 2
    }

    /// Tile overlap in samples.
    pub fn tile_overlap_samples(&self, element_size: f32) -> u32 {
        (self.tile_overlap / element_size).ceil() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = PagerConfig::from_toml_str("tile_size = 40.0").unwrap();
        assert_eq!(config.tile_size, 40.0);
        assert_eq!(config.tile_overlap, 5.0);
        assert!(config.auto_correct);
        assert_eq!(config.maximum_depth, 2.0);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            PagerConfig::from_toml_str("tile_size = \"wide\""),
            Err(StrataError::Config(_))
        ));
    }

    #[test]
    fn tile_size_samples_are_forced_odd() {
        let config = PagerConfig {
            tile_size: 28.0,
            ..Default::default()
        };
        // 28 m at 1 m/sample is 28 samples, forced up to 29
        assert_eq!(config.tile_size_samples(1.0), 29);
        // 28 m at 0.5 m/sample is 56 samples, forced up to 57
        assert_eq!(config.tile_size_samples(0.5), 57);
        // Already odd stays put
        let config = PagerConfig {
            tile_size: 27.0,
            ..Default::default()
        };
        assert_eq!(config.tile_size_samples(1.0), 27);
    }

    #[test]
    fn overlap_samples_round_up() {
        let config = PagerConfig::default();
        assert_eq!(config.tile_overlap_samples(1.0), 5);
        assert_eq!(config.tile_overlap_samples(2.0), 3);
    }
}

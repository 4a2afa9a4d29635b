//! Streaming configuration shared by the loader and the brick cache.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use crate::streaming::budget::MemoryBudget;
use crate::volume::metadata::ColorDepth;

/// Smallest brick edge the cache sizing formulas support.
pub const MIN_BRICK_SIZE: u32 = 32;
/// Largest brick edge the cache sizing formulas support.
pub const MAX_BRICK_SIZE: u32 = 128;

/// Configuration for one dataset's streaming pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Brick edge in voxels (power of two in [32, 128])
    pub brick_size: u32,
    /// CPU memory reserved for decoded bricks, in megabytes
    pub memory_budget_mb: usize,
    /// Worker pool width when loading real data
    pub io_concurrency: usize,
    /// Worker pool width when generating placeholder bricks
    pub synthetic_concurrency: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        // Leave headroom for the render and UI threads
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            brick_size: MAX_BRICK_SIZE,
            memory_budget_mb: 2048,
            io_concurrency: cores.saturating_sub(2).max(1),
            synthetic_concurrency: 1,
        }
    }
}

impl StreamingConfig {
    /// Check the invariants the cache and loader rely on.
    pub fn validate(&self) -> Result<()> {
        if !self.brick_size.is_power_of_two()
            || !(MIN_BRICK_SIZE..=MAX_BRICK_SIZE).contains(&self.brick_size)
        {
            return Err(Error::InvalidConfig(format!(
                "brick_size {} must be a power of two in [{}, {}]",
                self.brick_size, MIN_BRICK_SIZE, MAX_BRICK_SIZE
            )));
        }
        if self.io_concurrency == 0 || self.synthetic_concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency caps must be at least 1".into()));
        }
        if self.memory_budget_mb == 0 {
            return Err(Error::InvalidConfig("memory_budget_mb must be non-zero".into()));
        }
        Ok(())
    }

    /// Memory budget derived from this configuration.
    pub fn memory_budget(&self) -> MemoryBudget {
        MemoryBudget::new(self.memory_budget_mb)
    }

    /// Number of bricks of the given depth that fit in the budget.
    pub fn cache_capacity(&self, depth: ColorDepth) -> usize {
        self.memory_budget().brick_capacity(self.brick_size, depth)
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = StreamingConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.io_concurrency >= 1);
        assert_eq!(config.synthetic_concurrency, 1);
    }

    #[test]
    fn test_rejects_bad_brick_size() {
        for size in [16, 48, 256, 0] {
            let config = StreamingConfig { brick_size: size, ..Default::default() };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))), "size {size}");
        }
        for size in [32, 64, 128] {
            let config = StreamingConfig { brick_size: size, ..Default::default() };
            assert!(config.validate().is_ok(), "size {size}");
        }
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = StreamingConfig { io_concurrency: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_capacity() {
        let config = StreamingConfig {
            brick_size: 64,
            memory_budget_mb: 1,
            ..Default::default()
        };
        // 64^3 = 262144 bytes per 8-bit brick
        assert_eq!(config.cache_capacity(ColorDepth::U8), 4);
        assert_eq!(config.cache_capacity(ColorDepth::U16), 2);
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config: StreamingConfig = serde_json::from_str(r#"{"brick_size": 64}"#).unwrap();
        assert_eq!(config.brick_size, 64);
        assert_eq!(config.memory_budget_mb, 2048);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg/streaming.json");
        let config = StreamingConfig {
            brick_size: 32,
            memory_budget_mb: 64,
            io_concurrency: 3,
            synthetic_concurrency: 1,
        };
        config.save(&path).unwrap();
        assert_eq!(StreamingConfig::load(&path).unwrap(), config);
    }
}

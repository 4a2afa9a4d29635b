//! Memory budget arithmetic for brick caches
//!
//! Converts a megabyte budget into a brick count, and a brick count into the
//! extent of the 3-D cache texture a renderer would allocate for it.

use glam::UVec3;

use crate::import::payload::voxel_count;
use crate::volume::ColorDepth;

/// Memory budget for decoded bricks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBudget {
    /// Maximum memory allowed (bytes)
    budget_bytes: usize,
}

impl MemoryBudget {
    /// Create a new memory budget
    ///
    /// # Arguments
    /// * `budget_mb` - Maximum memory in megabytes
    pub fn new(budget_mb: usize) -> Self {
        Self {
            budget_bytes: budget_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Bytes taken by one decoded brick
    pub fn brick_bytes(brick_size: u32, depth: ColorDepth) -> usize {
        voxel_count(brick_size) * depth.bytes_per_voxel()
    }

    /// Number of whole bricks that fit in the budget
    pub fn brick_capacity(&self, brick_size: u32, depth: ColorDepth) -> usize {
        self.budget_bytes / Self::brick_bytes(brick_size, depth).max(1)
    }

    /// Fraction of the budget used by `bricks` resident bricks (0.0 to 1.0+)
    pub fn pressure(&self, bricks: usize, brick_size: u32, depth: ColorDepth) -> f32 {
        if self.budget_bytes == 0 {
            return 0.0;
        }
        (bricks * Self::brick_bytes(brick_size, depth)) as f32 / self.budget_bytes as f32
    }

    /// Bricks per axis of a cubic cache texture holding `capacity` bricks
    pub fn cache_slots_per_axis(capacity: usize) -> u32 {
        let mut side = (capacity as f64).cbrt().floor() as u32;
        while (side as usize).pow(3) < capacity {
            side += 1;
        }
        side
    }

    /// Voxel extent of the cache texture for `capacity` bricks
    pub fn cache_texture_extent(capacity: usize, brick_size: u32) -> UVec3 {
        UVec3::splat(Self::cache_slots_per_axis(capacity) * brick_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brick_bytes() {
        assert_eq!(MemoryBudget::brick_bytes(32, ColorDepth::U8), 32 * 32 * 32);
        assert_eq!(MemoryBudget::brick_bytes(128, ColorDepth::U16), 2 * 128 * 128 * 128);
        assert_eq!(MemoryBudget::brick_bytes(64, ColorDepth::Unknown), 2 * 64 * 64 * 64);
    }

    #[test]
    fn test_capacity() {
        let budget = MemoryBudget::new(64);
        // 128^3 * 2 = 4 MB per brick
        assert_eq!(budget.brick_capacity(128, ColorDepth::U16), 16);
        assert_eq!(budget.brick_capacity(128, ColorDepth::U8), 32);
        assert_eq!(budget.brick_capacity(32, ColorDepth::U8), 2048);
    }

    #[test]
    fn test_pressure() {
        let budget = MemoryBudget::new(64);
        assert_eq!(budget.pressure(0, 128, ColorDepth::U16), 0.0);
        assert!((budget.pressure(8, 128, ColorDepth::U16) - 0.5).abs() < 1e-6);
        assert_eq!(MemoryBudget::new(0).pressure(10, 32, ColorDepth::U8), 0.0);
    }

    #[test]
    fn test_cache_slots_per_axis() {
        assert_eq!(MemoryBudget::cache_slots_per_axis(0), 0);
        assert_eq!(MemoryBudget::cache_slots_per_axis(1), 1);
        assert_eq!(MemoryBudget::cache_slots_per_axis(8), 2);
        assert_eq!(MemoryBudget::cache_slots_per_axis(9), 3);
        assert_eq!(MemoryBudget::cache_slots_per_axis(64), 4);
        assert_eq!(
            MemoryBudget::cache_texture_extent(16, 128),
            UVec3::splat(3 * 128)
        );
    }

    #[test]
    fn test_saturating_budget() {
        let budget = MemoryBudget::new(usize::MAX);
        assert_eq!(budget.budget_bytes(), usize::MAX);
    }
}

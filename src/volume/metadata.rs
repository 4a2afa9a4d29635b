//! Dataset metadata: dimensions, brick grid per resolution level, physical transform.

use std::path::{Path, PathBuf};

use glam::{UVec3, Vec3};

use super::brick_id::MAX_BRICKS_PER_LEVEL;
use crate::core::config::{MAX_BRICK_SIZE, MIN_BRICK_SIZE};
use crate::core::{Error, Result};

/// Voxel pitch value meaning "not recorded in the dataset".
pub const UNSET_VOXEL_PITCH: f32 = -1.0;

/// Sample type of the dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorDepth {
    U8,
    U16,
    #[default]
    Unknown,
}

impl ColorDepth {
    /// Parse the descriptor value (`8` or `16`).
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "8" => Ok(Self::U8),
            "16" => Ok(Self::U16),
            other => Err(Error::UnsupportedValue {
                key: "colordepth".into(),
                value: other.into(),
            }),
        }
    }

    pub fn bits(self) -> Option<u32> {
        match self {
            Self::U8 => Some(8),
            Self::U16 => Some(16),
            Self::Unknown => None,
        }
    }

    /// Bytes per voxel. Unknown depth is sized as 16-bit so budgets never undercount.
    pub fn bytes_per_voxel(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::Unknown => 2,
        }
    }
}

/// Immutable description of one dataset.
///
/// Built once per dataset selection; selecting another dataset builds a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    root: PathBuf,
    dims: UVec3,
    color_depth: ColorDepth,
    chunk_size: u32,
    grids: Vec<UVec3>,
    voxel_pitch_mm: Vec3,
    scale: Vec3,
    rotation: Vec3,
}

impl Metadata {
    /// Create metadata with unit scale and no rotation.
    ///
    /// # Arguments
    /// * `dims` - original width, height and slice count
    /// * `chunk_size` - edge of one on-disk chunk in voxels (power of two in [32, 128])
    /// * `levels` - number of resolution levels (at least 1)
    pub fn new(
        root: impl Into<PathBuf>,
        dims: UVec3,
        color_depth: ColorDepth,
        chunk_size: u32,
        levels: u8,
    ) -> Result<Self> {
        if dims.min_element() == 0 {
            return Err(Error::MalformedDescriptor(format!("volume dimensions {dims} contain zero")));
        }
        if !chunk_size.is_power_of_two() || !(MIN_BRICK_SIZE..=MAX_BRICK_SIZE).contains(&chunk_size) {
            return Err(Error::UnsupportedValue {
                key: "chunksize".into(),
                value: chunk_size.to_string(),
            });
        }
        if levels == 0 {
            return Err(Error::UnsupportedValue {
                key: "nbrresolutionlevels".into(),
                value: "0".into(),
            });
        }

        let grids = (0..levels)
            .map(|level| div_ceil(level_dims(dims, level), chunk_size))
            .collect();

        Ok(Self {
            root: root.into(),
            dims,
            color_depth,
            chunk_size,
            grids,
            voxel_pitch_mm: Vec3::splat(UNSET_VOXEL_PITCH),
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        })
    }

    /// Set per-axis voxel pitch in millimeters and derive the physical scale.
    ///
    /// Each axis is independent: an unset (non-positive) pitch leaves that
    /// axis at scale 1 and logs a warning.
    pub fn with_voxel_pitch(mut self, pitch_mm: Vec3) -> Self {
        self.voxel_pitch_mm = pitch_mm;
        let extent = self.dims.as_vec3();
        let mut scale = Vec3::ONE;
        for (axis, name) in ["X", "Y", "Z"].iter().enumerate() {
            if pitch_mm[axis] > 0.0 {
                scale[axis] = pitch_mm[axis] * extent[axis] / 1000.0;
            } else {
                log::warn!(
                    "voxel pitch {} is unset for {}, falling back to scale 1",
                    name,
                    self.root.display()
                );
            }
        }
        self.scale = scale;
        self
    }

    /// Set Euler rotation in degrees.
    pub fn with_rotation(mut self, rotation_deg: Vec3) -> Self {
        self.rotation = rotation_deg;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Original width, height and slice count.
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.color_depth
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn levels(&self) -> usize {
        self.grids.len()
    }

    /// Voxel pitch in millimeters (negative = unset).
    pub fn voxel_pitch_mm(&self) -> Vec3 {
        self.voxel_pitch_mm
    }

    /// Physical extent in meters.
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Euler rotation in degrees.
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Chunk grid dimensions for a level.
    pub fn grid(&self, level: u8) -> Result<UVec3> {
        self.grids.get(level as usize).copied().ok_or(Error::LevelOutOfRange {
            level,
            levels: self.grids.len(),
        })
    }

    /// Volume dimensions at a level (halved per level, rounded up).
    pub fn level_dims(&self, level: u8) -> Result<UVec3> {
        self.grid(level)?;
        Ok(level_dims(self.dims, level))
    }

    /// Number of bricks along each axis for a level.
    ///
    /// `brick_size` must divide the chunk size.
    pub fn bricks_per_axis(&self, level: u8, brick_size: u32) -> Result<UVec3> {
        let grid = self.grid(level)?;
        if brick_size == 0 || brick_size > self.chunk_size || self.chunk_size % brick_size != 0 {
            return Err(Error::InvalidConfig(format!(
                "brick size {} does not divide chunk size {}",
                brick_size, self.chunk_size
            )));
        }
        let per_chunk = self.chunk_size / brick_size;
        let bricks = grid.to_array().map(|n| n.checked_mul(per_chunk));
        match bricks {
            [Some(x), Some(y), Some(z)] => Ok(UVec3::new(x, y, z)),
            _ => Err(Error::InvalidConfig(format!(
                "level {} grid {} overflows at brick size {}",
                level, grid, brick_size
            ))),
        }
    }

    /// Total number of bricks at a level.
    ///
    /// Fails when the level holds more bricks than a [`BrickId`](super::BrickId)
    /// can address.
    pub fn brick_count(&self, level: u8, brick_size: u32) -> Result<u32> {
        let bricks = self.bricks_per_axis(level, brick_size)?;
        let total = bricks.x as u64 * bricks.y as u64 * bricks.z as u64;
        if total > MAX_BRICKS_PER_LEVEL as u64 {
            return Err(Error::InvalidConfig(format!(
                "level {} has {} bricks, more than the {} an id can address",
                level, total, MAX_BRICKS_PER_LEVEL
            )));
        }
        Ok(total as u32)
    }
}

fn div_ceil(v: UVec3, d: u32) -> UVec3 {
    UVec3::new(v.x.div_ceil(d), v.y.div_ceil(d), v.z.div_ceil(d))
}

fn level_dims(dims: UVec3, level: u8) -> UVec3 {
    div_ceil(dims, 1u32 << level.min(31)).max(UVec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(dims: UVec3, chunk: u32, levels: u8) -> Metadata {
        Metadata::new("/data/ct", dims, ColorDepth::U16, chunk, levels).unwrap()
    }

    #[test]
    fn test_color_depth_parse() {
        assert_eq!(ColorDepth::parse("8").unwrap(), ColorDepth::U8);
        assert_eq!(ColorDepth::parse(" 16 ").unwrap(), ColorDepth::U16);
        assert!(matches!(
            ColorDepth::parse("32"),
            Err(Error::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_grid_per_level() {
        let m = meta(UVec3::new(300, 200, 100), 128, 3);
        assert_eq!(m.grid(0).unwrap(), UVec3::new(3, 2, 1));
        assert_eq!(m.level_dims(1).unwrap(), UVec3::new(150, 100, 50));
        assert_eq!(m.grid(1).unwrap(), UVec3::new(2, 1, 1));
        assert_eq!(m.grid(2).unwrap(), UVec3::new(1, 1, 1));
        assert!(matches!(m.grid(3), Err(Error::LevelOutOfRange { level: 3, levels: 3 })));
    }

    #[test]
    fn test_brick_count_with_sub_bricks() {
        let m = meta(UVec3::new(256, 256, 128), 128, 1);
        assert_eq!(m.brick_count(0, 128).unwrap(), 2 * 2 * 1);
        // 64-voxel bricks: 8 per chunk
        assert_eq!(m.brick_count(0, 64).unwrap(), 4 * 8);
        assert_eq!(m.bricks_per_axis(0, 64).unwrap(), UVec3::new(4, 4, 2));
    }

    #[test]
    fn test_scale_from_pitch() {
        let m = meta(UVec3::new(512, 512, 100), 128, 1)
            .with_voxel_pitch(Vec3::new(0.5, 0.25, 2.0));
        let s = m.scale();
        assert!((s.x - 0.256).abs() < 1e-6);
        assert!((s.y - 0.128).abs() < 1e-6);
        assert!((s.z - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_unset_pitch_per_axis() {
        let m = meta(UVec3::new(1000, 1000, 1000), 128, 1)
            .with_voxel_pitch(Vec3::new(1.0, UNSET_VOXEL_PITCH, 2.0));
        assert_eq!(m.scale(), Vec3::new(1.0, 1.0, 2.0));

        let m = meta(UVec3::new(1000, 500, 1000), 128, 1)
            .with_voxel_pitch(Vec3::new(UNSET_VOXEL_PITCH, 1.0, UNSET_VOXEL_PITCH));
        assert_eq!(m.scale(), Vec3::new(1.0, 0.5, 1.0));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Metadata::new("/x", UVec3::new(0, 1, 1), ColorDepth::U8, 64, 1).is_err());
        assert!(Metadata::new("/x", UVec3::ONE, ColorDepth::U8, 48, 1).is_err());
        assert!(Metadata::new("/x", UVec3::ONE, ColorDepth::U8, 64, 0).is_err());
        assert!(Metadata::new("/x", UVec3::ONE, ColorDepth::U8, 16, 1).is_err());
        assert!(Metadata::new("/x", UVec3::ONE, ColorDepth::U8, 256, 1).is_err());
        assert!(Metadata::new("/x", UVec3::ONE, ColorDepth::U8, 32, 1).is_ok());
    }

    #[test]
    fn test_huge_volume_count_is_an_error() {
        let m = meta(UVec3::splat(65536), 32, 1);
        assert_eq!(m.grid(0).unwrap(), UVec3::splat(2048));
        assert!(matches!(m.brick_count(0, 32), Err(Error::InvalidConfig(_))));

        let m = meta(UVec3::splat(u32::MAX), 128, 1);
        assert_eq!(m.grid(0).unwrap(), UVec3::splat(u32::MAX.div_ceil(128)));
        assert!(m.brick_count(0, 32).is_err());
    }

    #[test]
    fn test_brick_larger_than_chunk_rejected() {
        let m = meta(UVec3::splat(128), 32, 1);
        assert!(matches!(m.bricks_per_axis(0, 64), Err(Error::InvalidConfig(_))));
        assert!(matches!(m.brick_count(0, 64), Err(Error::InvalidConfig(_))));
        assert!(m.brick_count(0, 0).is_err());
        assert_eq!(m.brick_count(0, 32).unwrap(), 64);
    }
}

//! Brick addressing: linear brick index <-> voxel offset.
//!
//! Bricks are enumerated X-fastest, then Y (rows), then Z (slabs). No
//! coordinates are stored with a brick; this ordering is the only location
//! information a [`BrickId`] carries, so every backend must produce data in it.

use glam::UVec3;

use super::brick_id::BrickId;
use super::metadata::Metadata;
use crate::core::{Error, Result};

/// Grid position of a brick (in bricks, not voxels) for a given bricks-per-axis count.
pub fn grid_position(index: u32, bricks: UVec3) -> UVec3 {
    let nx = bricks.x.max(1);
    let ny = bricks.y.max(1);
    UVec3::new(index % nx, (index / nx) % ny, index / (nx * ny))
}

/// Inverse of [`grid_position`].
pub fn linear_index(pos: UVec3, bricks: UVec3) -> u32 {
    pos.x + bricks.x * (pos.y + bricks.y * pos.z)
}

/// Stateless codec between brick ids and voxel offsets for one brick size.
#[derive(Clone, Copy, Debug)]
pub struct BrickAddress<'a> {
    metadata: &'a Metadata,
    brick_size: u32,
}

impl<'a> BrickAddress<'a> {
    pub fn new(metadata: &'a Metadata, brick_size: u32) -> Self {
        Self { metadata, brick_size }
    }

    /// Split an id into `(index, level)`.
    pub fn decode(id: BrickId) -> (u32, u8) {
        id.decode()
    }

    /// Voxel offset of the brick's origin at its level.
    pub fn offset(&self, id: BrickId) -> Result<UVec3> {
        let (index, level) = id.decode();
        let bricks = self.metadata.bricks_per_axis(level, self.brick_size)?;
        if index >= self.metadata.brick_count(level, self.brick_size)? {
            return Err(Error::BrickIndexOutOfRange { index, level });
        }
        Ok(grid_position(index, bricks) * self.brick_size)
    }

    /// Brick id containing a voxel offset at a level.
    ///
    /// Fails for a brick size that does not divide the chunk size.
    pub fn id_at(&self, offset: UVec3, level: u8) -> Result<BrickId> {
        let bricks = self.metadata.bricks_per_axis(level, self.brick_size)?;
        let pos = offset / self.brick_size;
        if pos.cmpge(bricks).any() {
            return Err(Error::BrickIndexOutOfRange {
                index: linear_index(pos, bricks),
                level,
            });
        }
        BrickId::new(linear_index(pos, bricks), level)
    }
}

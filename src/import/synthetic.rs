//! Synthetic bricks for placeholders and tests.

use glam::UVec3;

use super::backend::ImporterBackend;
use super::payload::{voxel_count, BrickPayload};
use crate::core::{Error, Result};
use crate::volume::address::grid_position;
use crate::volume::{BrickId, ColorDepth, Metadata};

/// How synthetic bricks are filled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SyntheticFill {
    /// Every voxel has the same value (clamped to the sample range)
    Flat(u16),
    /// Value rises linearly with x + y + z across the whole volume
    Gradient,
}

/// Backend that generates bricks instead of reading them.
pub struct SyntheticBackend {
    metadata: Metadata,
    fill: SyntheticFill,
}

impl SyntheticBackend {
    pub fn new(metadata: Metadata, fill: SyntheticFill) -> Self {
        Self { metadata, fill }
    }

    pub fn fill(&self) -> SyntheticFill {
        self.fill
    }

    fn max_value(&self) -> u32 {
        match self.metadata.color_depth() {
            ColorDepth::U8 => u8::MAX as u32,
            _ => u16::MAX as u32,
        }
    }

    fn generate(&self, origin: UVec3, dims: UVec3, brick_size: u32) -> Vec<u16> {
        let max = self.max_value();
        match self.fill {
            SyntheticFill::Flat(value) => vec![(value as u32).min(max) as u16; voxel_count(brick_size)],
            SyntheticFill::Gradient => {
                let span = (dims.x + dims.y + dims.z).saturating_sub(3).max(1) as u64;
                let mut out = Vec::with_capacity(voxel_count(brick_size));
                for z in 0..brick_size {
                    for y in 0..brick_size {
                        for x in 0..brick_size {
                            let p = origin + UVec3::new(x, y, z);
                            let value = if p.cmplt(dims).all() {
                                ((p.x + p.y + p.z) as u64 * max as u64 / span) as u16
                            } else {
                                0
                            };
                            out.push(value);
                        }
                    }
                }
                out
            }
        }
    }
}

impl ImporterBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn is_metadata_importable(&self) -> bool {
        true
    }

    fn import_metadata(&self) -> Result<Metadata> {
        Ok(self.metadata.clone())
    }

    fn import_brick(
        &self,
        id: BrickId,
        brick_size: u32,
        _volume_dims: UVec3,
    ) -> Result<Option<BrickPayload>> {
        let (index, level) = id.decode();
        let dims = self.metadata.level_dims(level)?;
        let bricks = self.metadata.bricks_per_axis(level, brick_size)?;
        if index >= self.metadata.brick_count(level, brick_size)? {
            return Err(Error::BrickIndexOutOfRange { index, level });
        }
        let origin = grid_position(index, bricks) * brick_size;
        let samples = self.generate(origin, dims, brick_size);

        let payload = match self.metadata.color_depth() {
            ColorDepth::U8 => BrickPayload::U8(samples.into_iter().map(|s| s as u8).collect()),
            _ => BrickPayload::U16(samples),
        };
        Ok(Some(payload))
    }
}

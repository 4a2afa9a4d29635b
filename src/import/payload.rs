//! Decoded brick samples.

use crate::core::{Error, Result};
use crate::volume::ColorDepth;

/// Raw samples of one brick, `brick_size³` long, slice-major then row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrickPayload {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl BrickPayload {
    /// Zero-filled payload for a brick edge.
    pub fn zeroed(depth: ColorDepth, brick_size: u32) -> Self {
        let len = voxel_count(brick_size);
        match depth {
            ColorDepth::U8 => Self::U8(vec![0; len]),
            ColorDepth::U16 | ColorDepth::Unknown => Self::U16(vec![0; len]),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn color_depth(&self) -> ColorDepth {
        match self {
            Self::U8(_) => ColorDepth::U8,
            Self::U16(_) => ColorDepth::U16,
        }
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * self.color_depth().bytes_per_voxel()
    }

    /// Native-endian bytes, ready for texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U8(v) => v,
            Self::U16(v) => bytemuck::cast_slice(v),
        }
    }

    /// Sample at a flat index, widened to u16.
    pub fn sample(&self, index: usize) -> Option<u16> {
        match self {
            Self::U8(v) => v.get(index).map(|&s| s as u16),
            Self::U16(v) => v.get(index).copied(),
        }
    }

    /// Fail unless the payload holds exactly `brick_size³` samples.
    pub fn check_len(&self, brick_size: u32) -> Result<()> {
        let expected = voxel_count(brick_size);
        if self.len() != expected {
            return Err(Error::PayloadSize { expected, actual: self.len() });
        }
        Ok(())
    }
}

/// Samples in a cubic brick.
pub fn voxel_count(brick_size: u32) -> usize {
    (brick_size as usize).pow(3)
}

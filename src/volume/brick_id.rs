//! BrickId - packed (resolution level, linear index) identifier.
//!
//! Layout of the 32-bit value:
//! - bits 0..26: linear brick index within its resolution level
//! - bits 26..32: resolution level (0 = full resolution)

use std::fmt;

use crate::core::{Error, Result};

/// Number of bits holding the linear brick index.
pub const INDEX_BITS: u32 = 26;
/// Mask selecting the linear brick index.
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
/// Highest encodable resolution level.
pub const MAX_LEVEL: u8 = 63;
/// Number of bricks addressable per level.
pub const MAX_BRICKS_PER_LEVEL: u32 = 1 << INDEX_BITS;

/// Unique identifier for a brick across all resolution levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrickId(u32);

impl BrickId {
    /// Encode an index and level, rejecting values outside their bit ranges.
    pub fn new(index: u32, level: u8) -> Result<Self> {
        if index > INDEX_MASK || level > MAX_LEVEL {
            return Err(Error::BrickIndexOutOfRange { index, level });
        }
        Ok(Self(index | ((level as u32) << INDEX_BITS)))
    }

    /// Reinterpret a raw packed value. Every u32 is a valid id.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Linear brick index within the level.
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Resolution level.
    pub const fn level(self) -> u8 {
        (self.0 >> INDEX_BITS) as u8
    }

    /// Split into `(index, level)`.
    pub const fn decode(self) -> (u32, u8) {
        (self.index(), self.level())
    }
}

impl From<BrickId> for u32 {
    fn from(id: BrickId) -> Self {
        id.0
    }
}

impl From<u32> for BrickId {
    fn from(raw: u32) -> Self {
        Self::from_raw(raw)
    }
}

impl fmt::Display for BrickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}#{}", self.level(), self.index())
    }
}

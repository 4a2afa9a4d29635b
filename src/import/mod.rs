//! Dataset importers
//!
//! Each backend turns a [`BrickId`](crate::volume::BrickId) into a decoded
//! brick payload:
//! - Image sequence: a directory of slice images, bricks cut and padded on demand
//! - Chunked binary: one pre-cut file per brick
//! - Structured volume: placeholder for DICOM series
//! - Synthetic: flat or gradient placeholder bricks

pub mod backend;
pub mod payload;
pub mod image_sequence;
pub mod chunked_binary;
pub mod structured;
pub mod synthetic;

pub use backend::{open_backend, ImporterBackend};
pub use payload::BrickPayload;
pub use image_sequence::ImageSequenceBackend;
pub use chunked_binary::ChunkedBinaryBackend;
pub use structured::StructuredVolumeBackend;
pub use synthetic::{SyntheticBackend, SyntheticFill};

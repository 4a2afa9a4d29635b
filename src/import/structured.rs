//! Structured medical-imaging volume backend (DICOM series).
//!
//! Placeholder: the format advertises embedded metadata, but neither
//! import is implemented and both fail instead of returning fabricated data.

use std::path::{Path, PathBuf};

use glam::UVec3;

use super::backend::ImporterBackend;
use super::payload::BrickPayload;
use crate::core::{Error, Result};
use crate::volume::{BrickId, Metadata};

pub struct StructuredVolumeBackend {
    root: PathBuf,
}

impl StructuredVolumeBackend {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImporterBackend for StructuredVolumeBackend {
    fn name(&self) -> &'static str {
        "structured-volume"
    }

    fn is_metadata_importable(&self) -> bool {
        true
    }

    fn import_metadata(&self) -> Result<Metadata> {
        Err(Error::NotImplemented("structured volume metadata import"))
    }

    fn import_brick(
        &self,
        _id: BrickId,
        _brick_size: u32,
        _volume_dims: UVec3,
    ) -> Result<Option<BrickPayload>> {
        Err(Error::NotImplemented("structured volume brick import"))
    }
}

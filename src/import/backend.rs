//! Importer backend interface and backend selection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glam::UVec3;

use super::chunked_binary::{ChunkedBinaryBackend, CHUNK_EXTENSION};
use super::image_sequence::ImageSequenceBackend;
use super::payload::BrickPayload;
use super::structured::StructuredVolumeBackend;
use crate::core::{Error, Result, StreamingConfig};
use crate::volume::{BrickId, Metadata};

/// Image extensions read by [`ImageSequenceBackend`].
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "tif", "tiff", "bmp", "pgm", "jpg", "jpeg"];
/// Extensions handled by [`StructuredVolumeBackend`].
pub const STRUCTURED_EXTENSIONS: &[&str] = &["dcm"];

/// A source of bricks for one dataset.
///
/// Implementations are shared by all loader workers, so they must be `Sync`.
pub trait ImporterBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether [`import_metadata`](Self::import_metadata) can succeed.
    fn is_metadata_importable(&self) -> bool;

    /// Read the dataset's metadata. Callers must check
    /// [`is_metadata_importable`](Self::is_metadata_importable) first.
    fn import_metadata(&self) -> Result<Metadata>;

    /// Produce one brick.
    ///
    /// Returns `Ok(None)` when the brick is absent from the source (missing
    /// chunk file, unsupported level). The caller leaves that brick empty.
    fn import_brick(
        &self,
        id: BrickId,
        brick_size: u32,
        volume_dims: UVec3,
    ) -> Result<Option<BrickPayload>>;
}

/// Regular, non-hidden files directly inside `dir`, sorted by name.
pub fn dataset_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The one extension (lowercased) shared by all dataset files.
pub fn common_extension(dir: &Path) -> Result<String> {
    let files = dataset_files(dir)?;
    if files.is_empty() {
        return Err(Error::EmptyDirectory(dir.to_path_buf()));
    }
    let extensions: BTreeSet<String> = files
        .iter()
        .map(|p| {
            p.extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default()
        })
        .collect();
    if extensions.len() > 1 {
        return Err(Error::MixedExtensions(extensions.into_iter().collect()));
    }
    Ok(extensions.into_iter().next().unwrap_or_default())
}

/// Pick and construct the backend for a dataset directory from its file extension.
pub fn open_backend(dir: &Path, config: &StreamingConfig) -> Result<Box<dyn ImporterBackend>> {
    let extension = common_extension(dir)?;
    log::info!("Opening dataset {} (extension `{}`)", dir.display(), extension);

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(Box::new(ImageSequenceBackend::open(dir, config.brick_size)?))
    } else if extension == CHUNK_EXTENSION {
        Ok(Box::new(ChunkedBinaryBackend::new(dir, config.brick_size)))
    } else if STRUCTURED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(Box::new(StructuredVolumeBackend::new(dir)))
    } else {
        Err(Error::UnsupportedFormat(format!(
            "`.{}` files in {}",
            extension,
            dir.display()
        )))
    }
}

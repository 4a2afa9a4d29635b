//! Pre-chunked binary datasets: one raw file per brick.
//!
//! Layout:
//!   <root>/
//!     metadata.cvds              # key=value descriptor
//!     chunk_0000000000.cvds      # brick with raw id 0
//!     chunk_0000000001.cvds
//!     ...
//!
//! Chunk files hold the brick verbatim: 8-bit samples byte for byte, 16-bit
//! samples as big-endian pairs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use glam::UVec3;

use super::backend::ImporterBackend;
use super::payload::{voxel_count, BrickPayload};
use crate::core::{Error, Result};
use crate::volume::descriptor::{self, DESCRIPTOR_FILE_NAME};
use crate::volume::{BrickId, ColorDepth, Metadata};

/// Extension shared by every file of a chunked dataset.
pub const CHUNK_EXTENSION: &str = "cvds";

/// File name of a brick's chunk.
pub fn chunk_file_name(id: BrickId) -> String {
    format!("chunk_{:010}.{}", id.raw(), CHUNK_EXTENSION)
}

/// Get the file path for a brick's chunk
pub fn chunk_path(root: &Path, id: BrickId) -> PathBuf {
    root.join(chunk_file_name(id))
}

/// Encode a payload as chunk file bytes.
pub fn encode_chunk(payload: &BrickPayload) -> Vec<u8> {
    match payload {
        BrickPayload::U8(samples) => samples.clone(),
        BrickPayload::U16(samples) => samples.iter().flat_map(|s| s.to_be_bytes()).collect(),
    }
}

/// Decode chunk file bytes.
pub fn decode_chunk(bytes: Vec<u8>, depth: ColorDepth) -> Result<BrickPayload> {
    match depth {
        ColorDepth::U8 => Ok(BrickPayload::U8(bytes)),
        ColorDepth::U16 => {
            if bytes.len() % 2 != 0 {
                return Err(Error::InconsistentFormat(format!(
                    "16-bit chunk has odd length {}",
                    bytes.len()
                )));
            }
            Ok(BrickPayload::U16(
                bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect(),
            ))
        }
        ColorDepth::Unknown => Err(Error::UnsupportedBitDepth("unknown color depth".into())),
    }
}

/// Write one brick's chunk file.
pub fn write_brick(root: &Path, id: BrickId, payload: &BrickPayload) -> Result<()> {
    std::fs::create_dir_all(root)?;
    std::fs::write(chunk_path(root, id), encode_chunk(payload))?;
    Ok(())
}

/// Write the dataset descriptor.
pub fn write_descriptor(root: &Path, metadata: &Metadata) -> Result<()> {
    std::fs::create_dir_all(root)?;
    std::fs::write(root.join(DESCRIPTOR_FILE_NAME), descriptor::to_descriptor(metadata))?;
    Ok(())
}

/// Backend reading a chunked dataset directory.
pub struct ChunkedBinaryBackend {
    root: PathBuf,
    default_chunk_size: u32,
    /// Set once metadata has been imported
    color_depth: OnceLock<ColorDepth>,
}

impl ChunkedBinaryBackend {
    /// # Arguments
    /// * `root` - dataset directory
    /// * `default_chunk_size` - chunk edge assumed when the descriptor has none
    pub fn new(root: &Path, default_chunk_size: u32) -> Self {
        Self {
            root: root.to_path_buf(),
            default_chunk_size,
            color_depth: OnceLock::new(),
        }
    }

    /// Use a known color depth instead of inferring it per chunk.
    pub fn with_color_depth(self, depth: ColorDepth) -> Self {
        if depth != ColorDepth::Unknown {
            let _ = self.color_depth.set(depth);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted chunk file paths in the dataset.
    pub fn chunk_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = glob_in(&self.root, &format!("chunk_*.{}", CHUNK_EXTENSION))?;
        files.sort();
        Ok(files)
    }

    fn depth_for(&self, len: usize, brick_size: u32) -> Result<ColorDepth> {
        if let Some(&depth) = self.color_depth.get() {
            return Ok(depth);
        }
        let voxels = voxel_count(brick_size);
        if len == voxels {
            Ok(ColorDepth::U8)
        } else if len == 2 * voxels {
            Ok(ColorDepth::U16)
        } else {
            Err(Error::PayloadSize { expected: voxels, actual: len })
        }
    }
}

impl ImporterBackend for ChunkedBinaryBackend {
    fn name(&self) -> &'static str {
        "chunked-binary"
    }

    fn is_metadata_importable(&self) -> bool {
        true
    }

    fn import_metadata(&self) -> Result<Metadata> {
        let descriptors = glob_in(&self.root, &format!("metadata*.{}", CHUNK_EXTENSION))?;
        let descriptor_path = match descriptors.as_slice() {
            [one] => one,
            [] => {
                return Err(Error::MissingFiles(format!(
                    "no descriptor in {}",
                    self.root.display()
                )));
            }
            many => {
                return Err(Error::InconsistentFormat(format!(
                    "{} descriptors in {}",
                    many.len(),
                    self.root.display()
                )));
            }
        };

        let chunks = self.chunk_files()?;
        if chunks.is_empty() {
            return Err(Error::MissingFiles(format!(
                "no chunk files in {}",
                self.root.display()
            )));
        }
        log::debug!("{}: {} chunk files", self.root.display(), chunks.len());

        let metadata = descriptor::parse_file(descriptor_path, self.default_chunk_size)?;
        if metadata.color_depth() != ColorDepth::Unknown {
            let _ = self.color_depth.set(metadata.color_depth());
        }
        Ok(metadata)
    }

    fn import_brick(
        &self,
        id: BrickId,
        brick_size: u32,
        _volume_dims: UVec3,
    ) -> Result<Option<BrickPayload>> {
        let path = chunk_path(&self.root, id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::trace!("chunk {} absent", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let depth = self.depth_for(bytes.len(), brick_size)?;
        let payload = decode_chunk(bytes, depth)?;
        payload.check_len(brick_size)?;
        Ok(Some(payload))
    }
}

fn glob_in(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let full = format!("{}/{}", escaped, pattern);
    // Unreadable entries are skipped
    Ok(glob::glob(&full)?.filter_map(|entry| entry.ok()).collect())
}

//! Image sequence backend: one 2-D grayscale image per Z slice.
//!
//! Slices are sorted by file name. Image rows run top to bottom while brick
//! rows and slabs are counted from the far edge, so the Y and Z brick
//! coordinates are flipped when locating a brick's source window. The volume
//! is zero-padded on the right and top so the brick grid tiles it exactly.

use std::path::{Path, PathBuf};

use glam::UVec3;
use image::{ColorType, ImageDecoder, ImageReader};

use super::backend::{common_extension, dataset_files, ImporterBackend, IMAGE_EXTENSIONS};
use super::payload::{voxel_count, BrickPayload};
use crate::core::{Error, Result};
use crate::volume::address::grid_position;
use crate::volume::{BrickId, ColorDepth, Metadata};

/// Where a level-0 brick sits inside the padded slice stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrickWindow {
    /// First column in the padded slice
    pub start_col: u32,
    /// First row in the padded slice (top-left origin)
    pub start_row: u32,
    /// First source slice
    pub start_slice: u32,
    /// Zero columns appended on the right
    pub pad_right: u32,
    /// Zero rows prepended on top
    pub pad_top: u32,
}

impl BrickWindow {
    /// Locate brick `index` for a volume of `dims` voxels.
    pub fn locate(index: u32, brick_size: u32, dims: UVec3) -> Result<Self> {
        if brick_size == 0 {
            return Err(Error::InvalidConfig("brick size must be non-zero".into()));
        }
        let grid = UVec3::new(
            dims.x.div_ceil(brick_size),
            dims.y.div_ceil(brick_size),
            dims.z.div_ceil(brick_size),
        );
        if index as u64 >= grid.x as u64 * grid.y as u64 * grid.z as u64 {
            return Err(Error::BrickIndexOutOfRange { index, level: 0 });
        }
        let padded = grid * brick_size;
        let pos = grid_position(index, grid);

        Ok(Self {
            start_col: pos.x * brick_size,
            start_row: (grid.y - 1 - pos.y) * brick_size,
            start_slice: (grid.z - 1 - pos.z) * brick_size,
            pad_right: padded.x - dims.x,
            pad_top: padded.y - dims.y,
        })
    }

    /// Copy this window's `brick_size²` crop of one slice into `out`.
    ///
    /// `out` must be zeroed; padding positions are left untouched.
    pub fn crop_into<T: Copy>(&self, slice: &[T], width: u32, height: u32, brick_size: u32, out: &mut [T]) {
        let b = brick_size as usize;
        if self.start_col >= width {
            return;
        }
        let cols = (width - self.start_col).min(brick_size) as usize;

        for r in 0..brick_size {
            let padded_row = self.start_row + r;
            if padded_row < self.pad_top {
                continue;
            }
            let row = padded_row - self.pad_top;
            if row >= height {
                break;
            }
            let src = (row * width + self.start_col) as usize;
            let dst = r as usize * b;
            out[dst..dst + cols].copy_from_slice(&slice[src..src + cols]);
        }
    }
}

/// Backend over a directory of same-format slice images.
pub struct ImageSequenceBackend {
    dir: PathBuf,
    slices: Vec<PathBuf>,
    width: u32,
    height: u32,
    color_depth: ColorDepth,
    brick_size: u32,
}

impl ImageSequenceBackend {
    /// Scan a slice directory and check that every slice has the same
    /// bit depth and size. Only image headers are read.
    pub fn open(dir: &Path, brick_size: u32) -> Result<Self> {
        let extension = common_extension(dir)?;
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::UnsupportedFormat(format!("`.{}` is not an image format", extension)));
        }
        let slices = dataset_files(dir)?;

        let mut format: Option<(ColorDepth, u32, u32)> = None;
        for path in &slices {
            let decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
            let (width, height) = decoder.dimensions();
            let depth = depth_of(decoder.color_type(), path)?;

            match format {
                None => format = Some((depth, width, height)),
                Some((d, _, _)) if d != depth => {
                    return Err(Error::InconsistentFormat(format!(
                        "{} is {:?} but earlier slices are {:?}",
                        path.display(),
                        depth,
                        d
                    )));
                }
                Some((_, w, h)) if (w, h) != (width, height) => {
                    return Err(Error::InconsistentFormat(format!(
                        "{} is {}x{} but earlier slices are {}x{}",
                        path.display(),
                        width,
                        height,
                        w,
                        h
                    )));
                }
                Some(_) => {}
            }
        }

        let (color_depth, width, height) =
            format.ok_or_else(|| Error::EmptyDirectory(dir.to_path_buf()))?;
        log::info!(
            "Image sequence {}: {} slices of {}x{} ({:?})",
            dir.display(),
            slices.len(),
            width,
            height,
            color_depth
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            slices,
            width,
            height,
            color_depth,
            brick_size,
        })
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.color_depth
    }

    /// Volume dimensions (width, height, slice count).
    pub fn dims(&self) -> UVec3 {
        UVec3::new(self.width, self.height, self.slices.len() as u32)
    }

    fn extract<T: Copy + Default>(
        &self,
        window: &BrickWindow,
        brick_size: u32,
        volume_dims: UVec3,
        load: impl Fn(&Path) -> Result<Vec<T>>,
    ) -> Result<Vec<T>> {
        let area = (brick_size * brick_size) as usize;
        let mut out = vec![T::default(); voxel_count(brick_size)];
        let slice_count = volume_dims.z.min(self.slices.len() as u32);

        for (s, dst) in out.chunks_exact_mut(area).enumerate() {
            let source = window.start_slice + s as u32;
            if source >= slice_count {
                continue;
            }
            let pixels = load(&self.slices[source as usize])?;
            if pixels.len() != (volume_dims.x * volume_dims.y) as usize {
                return Err(Error::InconsistentFormat(format!(
                    "slice {} does not match volume size {}x{}",
                    self.slices[source as usize].display(),
                    volume_dims.x,
                    volume_dims.y
                )));
            }
            window.crop_into(&pixels, volume_dims.x, volume_dims.y, brick_size, dst);
        }
        Ok(out)
    }
}

impl ImporterBackend for ImageSequenceBackend {
    fn name(&self) -> &'static str {
        "image-sequence"
    }

    fn is_metadata_importable(&self) -> bool {
        true
    }

    fn import_metadata(&self) -> Result<Metadata> {
        Metadata::new(&self.dir, self.dims(), self.color_depth, self.brick_size, 1)
    }

    fn import_brick(
        &self,
        id: BrickId,
        brick_size: u32,
        volume_dims: UVec3,
    ) -> Result<Option<BrickPayload>> {
        let (index, level) = id.decode();
        if level > 0 {
            return Ok(None);
        }
        let window = BrickWindow::locate(index, brick_size, volume_dims)?;

        let payload = match self.color_depth {
            ColorDepth::U8 => BrickPayload::U8(self.extract(&window, brick_size, volume_dims, |p| {
                Ok(image::open(p)?.into_luma8().into_raw())
            })?),
            _ => BrickPayload::U16(self.extract(&window, brick_size, volume_dims, |p| {
                Ok(image::open(p)?.into_luma16().into_raw())
            })?),
        };
        Ok(Some(payload))
    }
}

fn depth_of(color: ColorType, path: &Path) -> Result<ColorDepth> {
    let bits = color.bits_per_pixel() / color.channel_count() as u16;
    match bits {
        8 => Ok(ColorDepth::U8),
        16 => Ok(ColorDepth::U16),
        _ => Err(Error::UnsupportedBitDepth(format!(
            "{} has {} bits per channel",
            path.display(),
            bits
        ))),
    }
}

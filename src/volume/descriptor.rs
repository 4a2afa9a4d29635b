//! Dataset descriptor: line-oriented `key=value` text.
//!
//! Recognized keys:
//! - `originalimagewidth`, `originalimageheight`, `originalnbrslices` (required)
//! - `colordepth` (`8` | `16`)
//! - `voxeldimX`, `voxeldimY`, `voxeldimZ` (millimeters, `-1` = unset)
//! - `eulerrotX`, `eulerrotY`, `eulerrotZ` (degrees)
//! - `chunksize`, `nbrresolutionlevels`
//!
//! Unknown keys are ignored, key order does not matter.

use std::fmt::Write as _;
use std::path::Path;

use glam::{UVec3, Vec3};

use super::metadata::{ColorDepth, Metadata, UNSET_VOXEL_PITCH};
use crate::core::{Error, Result};

/// File name of the descriptor inside a chunked dataset directory.
pub const DESCRIPTOR_FILE_NAME: &str = "metadata.cvds";

#[derive(Default)]
struct Fields {
    width: Option<u32>,
    height: Option<u32>,
    slices: Option<u32>,
    color_depth: Option<ColorDepth>,
    pitch: [Option<f32>; 3],
    rotation: [Option<f32>; 3],
    chunk_size: Option<u32>,
    levels: Option<u8>,
}

/// Parse descriptor text.
///
/// # Arguments
/// * `text` - descriptor contents
/// * `root` - dataset root recorded in the resulting metadata
/// * `default_chunk_size` - chunk edge used when the descriptor has no `chunksize`
pub fn parse_str(text: &str, root: &Path, default_chunk_size: u32) -> Result<Metadata> {
    let mut fields = Fields::default();

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::debug!("descriptor line {} has no '=', ignoring", line_no + 1);
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "originalimagewidth" => fields.width = Some(parse_num(&key, value)?),
            "originalimageheight" => fields.height = Some(parse_num(&key, value)?),
            "originalnbrslices" => fields.slices = Some(parse_num(&key, value)?),
            "colordepth" => fields.color_depth = Some(ColorDepth::parse(value)?),
            "voxeldimx" => fields.pitch[0] = Some(parse_num(&key, value)?),
            "voxeldimy" => fields.pitch[1] = Some(parse_num(&key, value)?),
            "voxeldimz" => fields.pitch[2] = Some(parse_num(&key, value)?),
            "eulerrotx" => fields.rotation[0] = Some(parse_num(&key, value)?),
            "eulerroty" => fields.rotation[1] = Some(parse_num(&key, value)?),
            "eulerrotz" => fields.rotation[2] = Some(parse_num(&key, value)?),
            "chunksize" => fields.chunk_size = Some(parse_num(&key, value)?),
            "nbrresolutionlevels" => fields.levels = Some(parse_num(&key, value)?),
            _ => log::trace!("ignoring unknown descriptor key `{}`", key),
        }
    }

    let dims = UVec3::new(
        required(fields.width, "originalimagewidth")?,
        required(fields.height, "originalimageheight")?,
        required(fields.slices, "originalnbrslices")?,
    );
    let pitch = Vec3::from_array(fields.pitch.map(|p| p.unwrap_or(UNSET_VOXEL_PITCH)));
    let rotation = Vec3::from_array(fields.rotation.map(|r| r.unwrap_or(0.0)));

    let metadata = Metadata::new(
        root,
        dims,
        fields.color_depth.unwrap_or_default(),
        fields.chunk_size.unwrap_or(default_chunk_size),
        fields.levels.unwrap_or(1),
    )?
    .with_voxel_pitch(pitch)
    .with_rotation(rotation);

    Ok(metadata)
}

/// Parse a descriptor file. The dataset root is the file's parent directory.
pub fn parse_file(path: &Path, default_chunk_size: u32) -> Result<Metadata> {
    if !path.is_file() {
        return Err(Error::MissingFiles(format!(
            "descriptor {} not found",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let root = path.parent().unwrap_or(Path::new("."));
    parse_str(&text, root, default_chunk_size)
}

/// Render metadata as descriptor text that [`parse_str`] reads back.
pub fn to_descriptor(metadata: &Metadata) -> String {
    let dims = metadata.dims();
    let pitch = metadata.voxel_pitch_mm();
    let rot = metadata.rotation();

    let mut out = String::new();
    let _ = writeln!(out, "originalimagewidth={}", dims.x);
    let _ = writeln!(out, "originalimageheight={}", dims.y);
    let _ = writeln!(out, "originalnbrslices={}", dims.z);
    if let Some(bits) = metadata.color_depth().bits() {
        let _ = writeln!(out, "colordepth={}", bits);
    }
    let _ = writeln!(out, "voxeldimX={}", pitch.x);
    let _ = writeln!(out, "voxeldimY={}", pitch.y);
    let _ = writeln!(out, "voxeldimZ={}", pitch.z);
    let _ = writeln!(out, "eulerrotX={}", rot.x);
    let _ = writeln!(out, "eulerrotY={}", rot.y);
    let _ = writeln!(out, "eulerrotZ={}", rot.z);
    let _ = writeln!(out, "chunksize={}", metadata.chunk_size());
    let _ = write!(out, "nbrresolutionlevels={}", metadata.levels());
    out
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::UnsupportedValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| Error::MalformedDescriptor(format!("missing required key `{}`", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "originalimagewidth=512
originalimageheight=256
originalnbrslices=100
colordepth=16
voxeldimX=0.5
voxeldimY=0.25
voxeldimZ=-1.0
eulerrotX=90
eulerrotY=0
eulerrotZ=-45
scanner=somevendor";

    fn root() -> &'static Path {
        Path::new("/data/ct")
    }

    #[test]
    fn test_parse_sample() {
        let m = parse_str(SAMPLE, root(), 128).unwrap();
        assert_eq!(m.dims(), UVec3::new(512, 256, 100));
        assert_eq!(m.color_depth(), ColorDepth::U16);
        assert_eq!(m.chunk_size(), 128);
        assert_eq!(m.levels(), 1);
        assert_eq!(m.rotation(), Vec3::new(90.0, 0.0, -45.0));
        assert!((m.scale().x - 0.256).abs() < 1e-6);
        assert!((m.scale().y - 0.064).abs() < 1e-6);
        assert_eq!(m.scale().z, 1.0);
    }

    #[test]
    fn test_order_independent() {
        let reference = parse_str(SAMPLE, root(), 128).unwrap();
        let mut lines: Vec<&str> = SAMPLE.lines().collect();
        lines.reverse();
        assert_eq!(parse_str(&lines.join("\n"), root(), 128).unwrap(), reference);
        lines.rotate_left(4);
        assert_eq!(parse_str(&lines.join("\r\n"), root(), 128).unwrap(), reference);
    }

    #[test]
    fn test_trailing_newline_optional() {
        let with = format!("{}\n", SAMPLE);
        assert_eq!(
            parse_str(&with, root(), 128).unwrap(),
            parse_str(SAMPLE, root(), 128).unwrap()
        );
    }

    #[test]
    fn test_unsupported_color_depth() {
        let text = SAMPLE.replace("colordepth=16", "colordepth=12");
        assert!(matches!(
            parse_str(&text, root(), 128),
            Err(Error::UnsupportedValue { key, .. }) if key == "colordepth"
        ));
    }

    #[test]
    fn test_missing_required_key() {
        let text = SAMPLE.replace("originalnbrslices=100", "");
        assert!(matches!(parse_str(&text, root(), 128), Err(Error::MalformedDescriptor(_))));
    }

    #[test]
    fn test_missing_color_depth_is_unknown() {
        let text = SAMPLE.replace("colordepth=16", "");
        assert_eq!(parse_str(&text, root(), 128).unwrap().color_depth(), ColorDepth::Unknown);
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let m = parse_str(&format!("{}\nchunksize=64\nnbrresolutionlevels=2", SAMPLE), root(), 128)
            .unwrap();
        assert_eq!(parse_str(&to_descriptor(&m), root(), 128).unwrap(), m);
    }

    #[test]
    fn test_parse_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_file(&dir.path().join(DESCRIPTOR_FILE_NAME), 128).unwrap_err();
        assert!(matches!(err, Error::MissingFiles(_)));
    }
}

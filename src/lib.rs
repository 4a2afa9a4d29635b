//! Volstream - out-of-core brick streaming for volumetric CT datasets
//!
//! A dataset directory is opened with an importer chosen by file extension,
//! its metadata describes the brick grid of each resolution level, and a
//! bounded loader fills a fixed-capacity brick cache, announcing each
//! resident brick on a reply queue for the renderer.

pub mod core;
pub mod volume;
pub mod import;
pub mod streaming;

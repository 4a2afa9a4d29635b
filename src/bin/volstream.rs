//! Volstream command-line driver.
//!
//! Usage: cargo run --release --bin volstream -- <COMMAND> [OPTIONS]
//!
//! Commands:
//!   info <DIR>                 Print the dataset's metadata
//!   load <DIR>                 Load one resolution level into a brick cache
//!   convert <SRC> <DST>        Cut an image sequence into a chunked dataset
//!   synth <DIR> --dims WxHxD   Write a gradient-filled chunked dataset
//!
//! Options:
//!   --config <FILE>     Streaming config JSON (defaults otherwise)
//!   --brick-size <N>    Brick edge in voxels (32, 64 or 128)
//!   --jobs <N>          Max bricks loading in parallel
//!   --budget-mb <N>     Brick cache memory budget
//!   --level <N>         Resolution level to load (default: 0)
//!   --depth <8|16>      Sample depth for `synth` (default: 16)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::UVec3;

use volstream::core::{logging, Error, Result, StreamingConfig};
use volstream::import::chunked_binary::{write_brick, write_descriptor};
use volstream::import::{
    open_backend, BrickPayload, ImageSequenceBackend, ImporterBackend, SyntheticBackend, SyntheticFill,
};
use volstream::streaming::{reply_queue, BrickCache, BrickLoader, LoadProgress, MemoryBudget, WorkerPool};
use volstream::volume::{BrickId, ColorDepth, Metadata};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        Some("info") => positional(&args, 2).and_then(|dir| info(&dir, &args)),
        Some("load") => positional(&args, 2).and_then(|dir| load(&dir, &args)),
        Some("convert") => positional(&args, 2)
            .and_then(|src| positional(&args, 3).map(|dst| (src, dst)))
            .and_then(|(src, dst)| convert(&src, &dst, &args)),
        Some("synth") => positional(&args, 2).and_then(|dir| synth(&dir, &args)),
        _ => {
            eprintln!("usage: volstream <info|load|convert|synth> <DIR> [OPTIONS]");
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn config_from_args(args: &[String]) -> Result<StreamingConfig> {
    let mut config = match parse_arg::<String>(args, "--config")? {
        Some(path) => StreamingConfig::load(Path::new(&path))?,
        None => StreamingConfig::default(),
    };
    if let Some(size) = parse_arg(args, "--brick-size")? {
        config.brick_size = size;
    }
    if let Some(jobs) = parse_arg(args, "--jobs")? {
        config.io_concurrency = jobs;
    }
    if let Some(mb) = parse_arg(args, "--budget-mb")? {
        config.memory_budget_mb = mb;
    }
    config.validate()?;
    Ok(config)
}

fn open_with_metadata(dir: &Path, config: &StreamingConfig) -> Result<(Box<dyn ImporterBackend>, Metadata)> {
    let backend = open_backend(dir, config)?;
    if !backend.is_metadata_importable() {
        return Err(Error::UnsupportedFormat(format!(
            "{} backend cannot read metadata",
            backend.name()
        )));
    }
    let metadata = backend.import_metadata()?;
    Ok((backend, metadata))
}

fn info(dir: &Path, args: &[String]) -> Result<()> {
    let config = config_from_args(args)?;
    let (backend, metadata) = open_with_metadata(dir, &config)?;

    println!("=== {} ===", dir.display());
    println!("Backend:     {}", backend.name());
    println!("Dimensions:  {}", metadata.dims());
    println!("Color depth: {:?}", metadata.color_depth());
    println!("Chunk size:  {}", metadata.chunk_size());
    println!("Scale (m):   {}", metadata.scale());
    println!("Rotation:    {}", metadata.rotation());
    for level in 0..metadata.levels() as u8 {
        println!(
            "Level {}:     grid {}, {} bricks of {}³",
            level,
            metadata.grid(level)?,
            metadata.brick_count(level, config.brick_size.min(metadata.chunk_size()))?,
            config.brick_size.min(metadata.chunk_size())
        );
    }
    let capacity = config.cache_capacity(metadata.color_depth());
    println!(
        "Cache:       {} bricks in {} MB (texture {})",
        capacity,
        config.memory_budget_mb,
        MemoryBudget::cache_texture_extent(capacity, config.brick_size)
    );
    Ok(())
}

fn load(dir: &Path, args: &[String]) -> Result<()> {
    let mut config = config_from_args(args)?;
    let level = parse_arg(args, "--level")?.unwrap_or(0u8);
    let (backend, metadata) = open_with_metadata(dir, &config)?;
    // Bricks are read one chunk at a time
    if metadata.chunk_size() != config.brick_size {
        log::info!(
            "Dataset chunks are {}³, using them as bricks instead of {}³",
            metadata.chunk_size(),
            config.brick_size
        );
        config.brick_size = metadata.chunk_size();
    }

    let cache = BrickCache::from_config(&config, metadata.color_depth()).into_shared();
    let (tx, mut rx) = reply_queue();
    let progress = Arc::new(LoadProgress::new());
    let loader = Arc::new(BrickLoader::for_io(&config)?);

    let start = Instant::now();
    let handle = loader.spawn_load_all(
        Arc::from(backend),
        Arc::new(metadata),
        Arc::clone(&cache),
        tx,
        level,
        Some(Arc::clone(&progress)),
    );

    // Stand-in for the renderer: consume replies while loading runs
    let mut resident = 0usize;
    let mut last_report = Instant::now();
    while let Some(_id) = rx.blocking_recv() {
        resident += 1;
        if last_report.elapsed() > Duration::from_secs(1) {
            eprintln!("  {:>5.1}% ({} bricks resident)", progress.value() * 100.0, resident);
            last_report = Instant::now();
        }
    }

    let report = handle
        .join()
        .map_err(|_| Error::InvalidConfig("loader thread panicked".into()))??;
    let cache = cache.lock().unwrap_or_else(|e| e.into_inner());

    println!();
    println!(
        "Loaded {}/{} bricks in {:.1}s ({} absent, {} failed, {} skipped)",
        report.loaded,
        report.total,
        start.elapsed().as_secs_f64(),
        report.not_found.len(),
        report.failed.len(),
        report.skipped
    );
    println!(
        "Cache: {}/{} bricks, {:.1} MB",
        cache.usage(),
        cache.capacity(),
        cache.usage_bytes() as f64 / (1024.0 * 1024.0)
    );
    if let Some(message) = progress.message() {
        println!("Last status: {}", message);
    }
    Ok(())
}

fn convert(src: &Path, dst: &Path, args: &[String]) -> Result<()> {
    let config = config_from_args(args)?;
    let backend = ImageSequenceBackend::open(src, config.brick_size)?;
    let metadata = backend.import_metadata()?;
    write_bricks(&backend, &metadata, dst, &config, true)
}

fn synth(dir: &Path, args: &[String]) -> Result<()> {
    let config = config_from_args(args)?;
    let dims = parse_arg::<String>(args, "--dims")?
        .as_deref()
        .and_then(parse_dims)
        .ok_or_else(|| Error::InvalidConfig("--dims WxHxD is required".into()))?;
    let depth = match parse_arg::<String>(args, "--depth")?.as_deref() {
        Some(value) => ColorDepth::parse(value)?,
        None => ColorDepth::U16,
    };
    let metadata = Metadata::new(dir, dims, depth, config.brick_size, 1)?;
    let backend = SyntheticBackend::new(metadata.clone(), SyntheticFill::Gradient);
    write_bricks(&backend, &metadata, dir, &config, false)
}

/// Write every level-0 brick of `backend` as a chunked dataset.
fn write_bricks(
    backend: &dyn ImporterBackend,
    metadata: &Metadata,
    dst: &Path,
    config: &StreamingConfig,
    skip_empty: bool,
) -> Result<()> {
    let brick_size = config.brick_size;
    let total = metadata.brick_count(0, brick_size)?;
    let dims = metadata.dims();
    let pool = WorkerPool::new(config.io_concurrency)?;

    println!("=== Writing {} ===", dst.display());
    println!("Source: {} ({})", metadata.root().display(), backend.name());
    println!("Bricks: {} of {}³", total, brick_size);

    let start = Instant::now();
    let results = pool.map_indices(total, |index| -> Result<bool> {
        let id = BrickId::new(index, 0)?;
        let Some(payload) = backend.import_brick(id, brick_size, dims)? else {
            return Ok(false);
        };
        if skip_empty && is_empty(&payload) {
            return Ok(false);
        }
        write_brick(dst, id, &payload)?;
        Ok(true)
    });

    let mut written = 0;
    for result in results {
        if result? {
            written += 1;
        }
    }
    let out = Metadata::new(dst, dims, metadata.color_depth(), brick_size, 1)?
        .with_voxel_pitch(metadata.voxel_pitch_mm())
        .with_rotation(metadata.rotation());
    write_descriptor(dst, &out)?;

    println!(
        "Wrote {} bricks ({} empty skipped) in {:.1}s",
        written,
        total as usize - written,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn is_empty(payload: &BrickPayload) -> bool {
    payload.as_bytes().iter().all(|&b| b == 0)
}

fn parse_dims(s: &str) -> Option<UVec3> {
    let parts: Vec<u32> = s.split('x').map(|p| p.trim().parse().ok()).collect::<Option<_>>()?;
    match parts.as_slice() {
        [w, h, d] => Some(UVec3::new(*w, *h, *d)),
        _ => None,
    }
}

fn positional(args: &[String], index: usize) -> Result<PathBuf> {
    args.get(index)
        .filter(|a| !a.starts_with("--"))
        .map(PathBuf::from)
        .ok_or_else(|| Error::InvalidConfig(format!("missing path argument {}", index - 1)))
}

fn parse_arg<T: FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    let Some(value) = args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)) else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| Error::InvalidConfig(format!("invalid value `{}` for {}", value, flag)))
}

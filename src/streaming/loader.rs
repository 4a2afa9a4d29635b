//! Bounded-concurrency loading of a whole resolution level into a brick cache.
//!
//! One work unit per linear brick index: import the brick, insert it into the
//! cache, then push its id onto the reply queue. Units are independent and
//! finish in any order, so the reply queue reflects completion order, not
//! index order. A failing unit is recorded and reported; it never stops its
//! siblings.

use std::sync::Arc;
use std::thread::JoinHandle;

use glam::UVec3;
use tokio::sync::mpsc;

use super::cache::{EvictionPolicy, SharedBrickCache};
use super::pool::{CancelToken, WorkerPool};
use super::progress::LoadProgress;
use crate::core::{Error, Result, StreamingConfig};
use crate::import::ImporterBackend;
use crate::volume::{BrickId, Metadata};

/// Producer side of the reply queue: "this brick is resident".
pub type ReplySender = mpsc::UnboundedSender<BrickId>;
/// Consumer side of the reply queue.
pub type ReplyReceiver = mpsc::UnboundedReceiver<BrickId>;

/// Create an unbounded multi-producer, single-consumer reply queue.
pub fn reply_queue() -> (ReplySender, ReplyReceiver) {
    mpsc::unbounded_channel()
}

/// Result of one work unit.
#[derive(Debug)]
enum UnitOutcome {
    Loaded,
    NotFound(BrickId),
    Failed(BrickId, String),
    Skipped,
}

/// Summary of a [`BrickLoader::load_all`] run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Total work units for the level
    pub total: u32,
    /// Bricks inserted and announced on the reply queue
    pub loaded: u32,
    /// Bricks the backend reported absent (left empty)
    pub not_found: Vec<BrickId>,
    /// Bricks whose import or insert failed
    pub failed: Vec<(BrickId, String)>,
    /// Units not started because the load was cancelled
    pub skipped: u32,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }
}

/// Fills a brick cache from an importer using a bounded worker pool.
pub struct BrickLoader {
    pool: WorkerPool,
    brick_size: u32,
    cancel: CancelToken,
    eviction: Option<Arc<dyn EvictionPolicy>>,
}

impl BrickLoader {
    /// Create a loader
    ///
    /// # Arguments
    /// * `concurrency` - Maximum number of bricks loading at once
    /// * `brick_size` - Brick edge in voxels
    pub fn new(concurrency: usize, brick_size: u32) -> Result<Self> {
        Ok(Self {
            pool: WorkerPool::new(concurrency)?,
            brick_size,
            cancel: CancelToken::new(),
            eviction: None,
        })
    }

    /// Loader for real datasets, using the configured I/O width.
    pub fn for_io(config: &StreamingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.io_concurrency, config.brick_size)
    }

    /// Loader for placeholder bricks, using the configured synthetic width.
    pub fn for_synthetic(config: &StreamingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.synthetic_concurrency, config.brick_size)
    }

    /// Evict with `policy` when the cache is full instead of failing the unit.
    pub fn with_eviction(mut self, policy: Arc<dyn EvictionPolicy>) -> Self {
        self.eviction = Some(policy);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.pool.width()
    }

    pub fn brick_size(&self) -> u32 {
        self.brick_size
    }

    /// Token that stops units which have not started yet.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load every brick of `level`.
    ///
    /// Blocks until all units finish. Configuration problems (unknown level,
    /// brick size not dividing the chunk size, cache brick size mismatch) fail
    /// before any unit runs; per-brick problems land in the report and in the
    /// progress message.
    pub fn load_all(
        &self,
        backend: &dyn ImporterBackend,
        metadata: &Metadata,
        cache: &SharedBrickCache,
        replies: &ReplySender,
        level: u8,
        progress: Option<&LoadProgress>,
    ) -> Result<LoadReport> {
        let brick_size = self.brick_size;
        let chunk_size = metadata.chunk_size();
        if brick_size == 0 || brick_size > chunk_size || chunk_size % brick_size != 0 {
            return Err(Error::InvalidConfig(format!(
                "brick size {} does not divide chunk size {}",
                brick_size, chunk_size
            )));
        }
        let cache_brick_size = cache.lock().unwrap_or_else(|e| e.into_inner()).brick_size();
        if cache_brick_size != brick_size {
            return Err(Error::InvalidConfig(format!(
                "cache holds {}³ bricks but loader produces {}³",
                cache_brick_size, brick_size
            )));
        }

        let total = metadata.brick_count(level, brick_size)?;
        let volume_dims = metadata.level_dims(level)?;
        let step = if total > 0 { 1.0 / total as f32 } else { 0.0 };

        log::info!(
            "Loading level {} of {}: {} bricks via {} (concurrency {})",
            level,
            metadata.root().display(),
            total,
            backend.name(),
            self.pool.width()
        );
        let start = std::time::Instant::now();

        let outcomes = self.pool.map_indices(total, |index| {
            if self.cancel.is_cancelled() {
                return UnitOutcome::Skipped;
            }
            let outcome = match BrickId::new(index, level) {
                Ok(id) => self.load_one(backend, id, volume_dims, cache, replies),
                Err(e) => UnitOutcome::Failed(BrickId::from_raw(index), e.to_string()),
            };
            if let Some(progress) = progress {
                if let UnitOutcome::Failed(id, reason) = &outcome {
                    progress.set_message(format!("brick {} failed: {}", id, reason));
                }
                progress.advance(step);
            }
            outcome
        });

        let mut report = LoadReport { total, ..Default::default() };
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Loaded => report.loaded += 1,
                UnitOutcome::NotFound(id) => report.not_found.push(id),
                UnitOutcome::Failed(id, reason) => report.failed.push((id, reason)),
                UnitOutcome::Skipped => report.skipped += 1,
            }
        }

        log::info!(
            "Level {} done in {:.2}s: {} loaded, {} absent, {} failed, {} skipped",
            level,
            start.elapsed().as_secs_f64(),
            report.loaded,
            report.not_found.len(),
            report.failed.len(),
            report.skipped
        );
        Ok(report)
    }

    /// Run [`load_all`](Self::load_all) on a background thread.
    ///
    /// The caller keeps the reply receiver and polls it while loading runs.
    pub fn spawn_load_all(
        self: Arc<Self>,
        backend: Arc<dyn ImporterBackend>,
        metadata: Arc<Metadata>,
        cache: SharedBrickCache,
        replies: ReplySender,
        level: u8,
        progress: Option<Arc<LoadProgress>>,
    ) -> JoinHandle<Result<LoadReport>> {
        std::thread::spawn(move || {
            self.load_all(
                backend.as_ref(),
                &metadata,
                &cache,
                &replies,
                level,
                progress.as_deref(),
            )
        })
    }

    fn load_one(
        &self,
        backend: &dyn ImporterBackend,
        id: BrickId,
        volume_dims: UVec3,
        cache: &SharedBrickCache,
        replies: &ReplySender,
    ) -> UnitOutcome {
        let payload = match backend.import_brick(id, self.brick_size, volume_dims) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                log::debug!("brick {} absent, leaving it empty", id);
                return UnitOutcome::NotFound(id);
            }
            Err(e) => {
                log::warn!("brick {} failed to import: {}", id, e);
                return UnitOutcome::Failed(id, e.to_string());
            }
        };

        let inserted = {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            match &self.eviction {
                Some(policy) => cache.insert_with(id, payload, policy.as_ref()).map(|_| ()),
                None => cache.insert(id, payload).map(|_| ()),
            }
        };
        if let Err(e) = inserted {
            log::warn!("brick {} not cached: {}", id, e);
            return UnitOutcome::Failed(id, e.to_string());
        }

        if replies.send(id).is_err() {
            log::debug!("reply queue closed, brick {} not announced", id);
        }
        UnitOutcome::Loaded
    }
}

/// Load a whole level with a one-off pool of width `concurrency`.
pub fn load_all(
    backend: &dyn ImporterBackend,
    metadata: &Metadata,
    cache: &SharedBrickCache,
    replies: &ReplySender,
    level: u8,
    concurrency: usize,
    progress: Option<&LoadProgress>,
) -> Result<LoadReport> {
    let brick_size = cache.lock().unwrap_or_else(|e| e.into_inner()).brick_size();
    BrickLoader::new(concurrency, brick_size)?.load_all(backend, metadata, cache, replies, level, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::import::chunked_binary::{write_brick, write_descriptor, ChunkedBinaryBackend};
    use crate::import::{BrickPayload, SyntheticBackend, SyntheticFill};
    use crate::streaming::cache::{BrickCache, LeastRecentlyUsed};
    use crate::volume::ColorDepth;

    const SIZE: u32 = 32;

    fn meta(dims: UVec3) -> Metadata {
        Metadata::new("/synthetic", dims, ColorDepth::U8, SIZE, 1).unwrap()
    }

    fn drain(rx: &mut ReplyReceiver) -> Vec<BrickId> {
        let mut ids = Vec::new();
        while let Ok(id) = rx.try_recv() {
            ids.push(id);
        }
        ids
    }

    /// Synthetic backend that records how many imports run at once.
    struct Instrumented {
        inner: SyntheticBackend,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ImporterBackend for Instrumented {
        fn name(&self) -> &'static str {
            "instrumented"
        }

        fn is_metadata_importable(&self) -> bool {
            true
        }

        fn import_metadata(&self) -> Result<Metadata> {
            self.inner.import_metadata()
        }

        fn import_brick(&self, id: BrickId, brick_size: u32, dims: UVec3) -> Result<Option<BrickPayload>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            let result = self.inner.import_brick(id, brick_size, dims);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[test]
    fn test_concurrency_cap_and_replies() {
        for cap in [1, 2, 4] {
            let metadata = meta(UVec3::new(128, 128, 64));
            let backend = Instrumented {
                inner: SyntheticBackend::new(metadata.clone(), SyntheticFill::Gradient),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            };
            let cache = BrickCache::new(64, SIZE).into_shared();
            let (tx, mut rx) = reply_queue();
            let progress = LoadProgress::new();

            let report = load_all(&backend, &metadata, &cache, &tx, 0, cap, Some(&progress)).unwrap();

            let total = 4 * 4 * 2;
            assert_eq!(report.total, total);
            assert_eq!(report.loaded, total);
            assert!(report.is_complete());
            assert!(backend.peak.load(Ordering::SeqCst) <= cap, "cap {cap}");
            assert!((progress.value() - 1.0).abs() < 1e-3);

            let ids = drain(&mut rx);
            assert_eq!(ids.len(), total as usize);
            let distinct: HashSet<BrickId> = ids.into_iter().collect();
            let expected: HashSet<BrickId> = (0..total).map(BrickId::from_raw).collect();
            assert_eq!(distinct, expected);
            assert_eq!(cache.lock().unwrap().usage(), total as usize);
        }
    }

    #[test]
    fn test_level_tag_in_ids() {
        let metadata = Metadata::new("/synthetic", UVec3::splat(64), ColorDepth::U8, SIZE, 2).unwrap();
        let backend = SyntheticBackend::new(metadata.clone(), SyntheticFill::Flat(3));
        let cache = BrickCache::new(8, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();

        let report = load_all(&backend, &metadata, &cache, &tx, 1, 1, None).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(drain(&mut rx), vec![BrickId::from_raw(1 << 26)]);
    }

    #[test]
    fn test_missing_chunks_left_empty() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = Metadata::new(dir.path(), UVec3::new(64, 64, 32), ColorDepth::U8, SIZE, 1).unwrap();
        write_descriptor(dir.path(), &metadata).unwrap();
        for index in [0u32, 3] {
            let payload = BrickPayload::U8(vec![index as u8 + 1; 32 * 32 * 32]);
            write_brick(dir.path(), BrickId::new(index, 0).unwrap(), &payload).unwrap();
        }
        let backend = ChunkedBinaryBackend::new(dir.path(), SIZE);
        let metadata = backend.import_metadata().unwrap();
        let cache = BrickCache::new(16, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();

        let report = BrickLoader::new(2, SIZE)
            .unwrap()
            .load_all(&backend, &metadata, &cache, &tx, 0, None)
            .unwrap();

        assert_eq!(report.loaded, 2);
        let mut absent = report.not_found.clone();
        absent.sort();
        assert_eq!(absent, vec![BrickId::from_raw(1), BrickId::from_raw(2)]);
        assert!(report.failed.is_empty());

        let mut ids = drain(&mut rx);
        ids.sort();
        assert_eq!(ids, vec![BrickId::from_raw(0), BrickId::from_raw(3)]);
        let mut cache = cache.lock().unwrap();
        assert_eq!(cache.try_get(BrickId::from_raw(3)).unwrap().sample(0), Some(4));
        assert!(cache.try_get(BrickId::from_raw(1)).is_none());
    }

    #[test]
    fn test_full_cache_fails_units_without_dropping() {
        let metadata = meta(UVec3::new(128, 64, 32));
        let backend = SyntheticBackend::new(metadata.clone(), SyntheticFill::Flat(1));
        let cache = BrickCache::new(3, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();
        let progress = LoadProgress::new();

        let report = load_all(&backend, &metadata, &cache, &tx, 0, 2, Some(&progress)).unwrap();

        assert_eq!(report.total, 8);
        assert_eq!(report.loaded, 3);
        assert_eq!(report.failed.len(), 5);
        assert!(progress.message().unwrap().contains("failed"));
        assert_eq!(cache.lock().unwrap().usage(), 3);

        // Every announced brick is actually resident
        let announced = drain(&mut rx);
        assert_eq!(announced.len(), 3);
        let cache = cache.lock().unwrap();
        assert!(announced.iter().all(|&id| cache.contains(id)));
    }

    #[test]
    fn test_eviction_policy_keeps_cache_bounded() {
        let metadata = meta(UVec3::new(128, 64, 32));
        let backend = SyntheticBackend::new(metadata.clone(), SyntheticFill::Flat(1));
        let cache = BrickCache::new(3, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();

        let loader = BrickLoader::new(2, SIZE).unwrap().with_eviction(Arc::new(LeastRecentlyUsed));
        let report = loader.load_all(&backend, &metadata, &cache, &tx, 0, None).unwrap();

        assert_eq!(report.loaded, 8);
        assert!(report.failed.is_empty());
        assert_eq!(drain(&mut rx).len(), 8);
        assert_eq!(cache.lock().unwrap().usage(), 3);
    }

    #[test]
    fn test_cancelled_before_start() {
        let metadata = meta(UVec3::splat(64));
        let backend = SyntheticBackend::new(metadata.clone(), SyntheticFill::Flat(1));
        let cache = BrickCache::new(8, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();

        let loader = BrickLoader::new(2, SIZE).unwrap();
        loader.cancel_token().cancel();
        let report = loader.load_all(&backend, &metadata, &cache, &tx, 0, None).unwrap();

        assert_eq!(report.skipped, 8);
        assert!(!report.is_complete());
        assert!(drain(&mut rx).is_empty());
        assert!(cache.lock().unwrap().is_empty());
    }

    #[test]
    fn test_configuration_errors() {
        let metadata = meta(UVec3::splat(64));
        let backend = SyntheticBackend::new(metadata.clone(), SyntheticFill::Flat(1));
        let (tx, _rx) = reply_queue();

        let cache = BrickCache::new(8, SIZE).into_shared();
        assert!(matches!(
            load_all(&backend, &metadata, &cache, &tx, 3, 1, None),
            Err(Error::LevelOutOfRange { .. })
        ));

        // Loader and cache disagree on brick size
        let loader = BrickLoader::new(1, 64).unwrap();
        assert!(matches!(
            loader.load_all(&backend, &metadata, &cache, &tx, 0, None),
            Err(Error::InvalidConfig(_))
        ));

        assert!(BrickLoader::new(0, SIZE).is_err());
    }

    #[test]
    fn test_level_beyond_id_range_fails_before_loading() {
        let metadata = meta(UVec3::splat(65536));
        let backend = Instrumented {
            inner: SyntheticBackend::new(metadata.clone(), SyntheticFill::Flat(1)),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let cache = BrickCache::new(8, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();

        assert!(matches!(
            load_all(&backend, &metadata, &cache, &tx, 0, 2, None),
            Err(Error::InvalidConfig(_))
        ));
        assert_eq!(backend.peak.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_spawned_load() {
        let metadata = Arc::new(meta(UVec3::splat(64)));
        let backend: Arc<dyn ImporterBackend> =
            Arc::new(SyntheticBackend::new((*metadata).clone(), SyntheticFill::Gradient));
        let cache = BrickCache::new(8, SIZE).into_shared();
        let (tx, mut rx) = reply_queue();

        let loader = Arc::new(BrickLoader::new(2, SIZE).unwrap());
        let handle = loader.spawn_load_all(backend, metadata, Arc::clone(&cache), tx, 0, None);

        let mut received = 0;
        while let Some(_id) = rx.blocking_recv() {
            received += 1;
        }
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.loaded, 8);
        assert_eq!(received, 8);
    }
}

//! Bounded worker pool for brick loading.
//!
//! Each pool owns its own rayon thread pool, so its width caps the number of
//! bricks being decoded at once independently of the global pool. Width 1
//! runs units one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::core::{Error, Result};

/// Cooperative cancellation flag checked before each unit starts.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag so the pool can run again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Fixed-width pool of worker threads.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    width: usize,
}

impl WorkerPool {
    /// Create a pool running at most `width` units at a time.
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfig("worker pool width must be at least 1".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("brick-worker-{}", i))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build worker pool: {}", e)))?;
        Ok(Self { pool, width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `unit` for every index in `0..total` and collect the results in
    /// index order. Units run on pool threads only; the caller blocks.
    pub fn map_indices<T, F>(&self, total: u32, unit: F) -> Vec<T>
    where
        T: Send,
        F: Fn(u32) -> T + Sync + Send,
    {
        self.pool.install(|| (0..total).into_par_iter().map(unit).collect())
    }
}

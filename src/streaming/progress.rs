//! Progress sink shared by loader workers and the UI.
//!
//! The value is advisory: workers add to it concurrently and readers may
//! observe any intermediate value.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// A scalar in `[0, 1]` plus an optional status message.
#[derive(Debug, Default)]
pub struct LoadProgress {
    /// f32 bits
    value: AtomicU32,
    message: Mutex<Option<String>>,
}

impl LoadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value in `[0, 1]`.
    pub fn value(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Overwrite the value, clamped to `[0, 1]`.
    pub fn set(&self, value: f32) {
        self.value.store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Add `delta`, saturating at 1.
    pub fn advance(&self, delta: f32) {
        let _ = self.value.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f32::from_bits(bits) + delta).clamp(0.0, 1.0).to_bits())
        });
    }

    pub fn message(&self) -> Option<String> {
        self.message.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        *self.message.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn clear_message(&self) {
        *self.message.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn reset(&self) {
        self.set(0.0);
        self.clear_message();
    }
}

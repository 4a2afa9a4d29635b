//! Capacity-bounded brick cache
//!
//! Holds decoded brick payloads keyed by [`BrickId`]. The capacity is fixed at
//! creation. A full cache never drops anything on its own: inserting a new
//! brick into it requires an eviction decision from the caller, either an
//! explicit victim or an [`EvictionPolicy`]. Without one the insert fails and
//! hands the payload back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::core::StreamingConfig;
use crate::import::BrickPayload;
use crate::import::payload::voxel_count;
use crate::volume::{BrickId, ColorDepth};

/// Cache shared between loader workers and the consumer.
pub type SharedBrickCache = Arc<Mutex<BrickCache>>;

/// Rejected insert. Carries the payload back so it is never lost silently.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("cache full ({capacity} bricks), no eviction decision for {id}")]
    Full {
        id: BrickId,
        payload: BrickPayload,
        capacity: usize,
    },

    #[error("eviction victim {victim} is not resident")]
    VictimNotResident {
        id: BrickId,
        payload: BrickPayload,
        victim: BrickId,
    },

    #[error("payload for {id} has {actual} samples, expected {expected}")]
    PayloadSize {
        id: BrickId,
        payload: BrickPayload,
        expected: usize,
        actual: usize,
    },
}

impl InsertError {
    /// Take back the rejected payload.
    pub fn into_payload(self) -> BrickPayload {
        match self {
            Self::Full { payload, .. }
            | Self::VictimNotResident { payload, .. }
            | Self::PayloadSize { payload, .. } => payload,
        }
    }
}

/// Chooses which resident brick to evict when the cache is full.
pub trait EvictionPolicy: Send + Sync {
    /// Return a resident brick to evict to make room for `incoming`, or
    /// `None` to refuse the insert.
    fn select_victim(&self, cache: &BrickCache, incoming: BrickId) -> Option<BrickId>;
}

/// Evict the brick with the oldest access.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeastRecentlyUsed;

impl EvictionPolicy for LeastRecentlyUsed {
    fn select_victim(&self, cache: &BrickCache, _incoming: BrickId) -> Option<BrickId> {
        cache.least_recently_used()
    }
}

struct Entry {
    payload: BrickPayload,
    last_access: u64,
}

/// Fixed-capacity store of decoded bricks.
pub struct BrickCache {
    entries: HashMap<BrickId, Entry>,
    capacity: usize,
    brick_size: u32,
    /// Monotonic access counter for recency
    clock: u64,
}

impl BrickCache {
    /// Create a new brick cache
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of resident bricks
    /// * `brick_size` - Brick edge; every payload must hold `brick_size³` samples
    pub fn new(capacity: usize, brick_size: u32) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1 << 16)),
            capacity,
            brick_size,
            clock: 0,
        }
    }

    /// Size the cache from the configured memory budget.
    pub fn from_config(config: &StreamingConfig, depth: ColorDepth) -> Self {
        let capacity = config.cache_capacity(depth);
        log::info!(
            "Brick cache: {} bricks of {}³ ({:?}) in {} MB",
            capacity,
            config.brick_size,
            depth,
            config.memory_budget_mb
        );
        Self::new(capacity, config.brick_size)
    }

    /// Wrap for sharing with loader workers.
    pub fn into_shared(self) -> SharedBrickCache {
        Arc::new(Mutex::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn brick_size(&self) -> u32 {
        self.brick_size
    }

    /// Number of resident bricks
    pub fn usage(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Bytes held by resident payloads
    pub fn usage_bytes(&self) -> usize {
        self.entries.values().map(|e| e.payload.byte_size()).sum()
    }

    pub fn contains(&self, id: BrickId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert without evicting.
    ///
    /// Replacing a resident brick always succeeds and returns the old
    /// payload. A new brick into a full cache fails with [`InsertError::Full`].
    pub fn insert(&mut self, id: BrickId, payload: BrickPayload) -> Result<Option<BrickPayload>, InsertError> {
        let payload = self.check_payload(id, payload)?;
        if !self.contains(id) && self.is_full() {
            return Err(InsertError::Full { id, payload, capacity: self.capacity });
        }
        Ok(self.put(id, payload))
    }

    /// Insert, evicting `victim` if room is needed.
    ///
    /// # Returns
    /// The evicted (or replaced) brick, if any
    pub fn insert_evicting(
        &mut self,
        id: BrickId,
        payload: BrickPayload,
        victim: BrickId,
    ) -> Result<Option<(BrickId, BrickPayload)>, InsertError> {
        let payload = self.check_payload(id, payload)?;
        if self.contains(id) || !self.is_full() {
            return Ok(self.put(id, payload).map(|old| (id, old)));
        }
        let Some(evicted) = self.remove(victim) else {
            return Err(InsertError::VictimNotResident { id, payload, victim });
        };
        self.put(id, payload);
        log::trace!("evicted {} for {}", victim, id);
        Ok(Some((victim, evicted)))
    }

    /// Insert, asking `policy` for a victim if room is needed.
    pub fn insert_with(
        &mut self,
        id: BrickId,
        payload: BrickPayload,
        policy: &dyn EvictionPolicy,
    ) -> Result<Option<(BrickId, BrickPayload)>, InsertError> {
        if self.contains(id) || !self.is_full() {
            return self.insert(id, payload).map(|old| old.map(|p| (id, p)));
        }
        match policy.select_victim(self, id) {
            Some(victim) => self.insert_evicting(id, payload, victim),
            None => {
                let payload = self.check_payload(id, payload)?;
                Err(InsertError::Full { id, payload, capacity: self.capacity })
            }
        }
    }

    /// Get a brick and mark it as recently used
    pub fn try_get(&mut self, id: BrickId) -> Option<&BrickPayload> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(&id).map(|entry| {
            entry.last_access = clock;
            &entry.payload
        })
    }

    /// Get a brick without touching its recency
    pub fn peek(&self, id: BrickId) -> Option<&BrickPayload> {
        self.entries.get(&id).map(|e| &e.payload)
    }

    /// Remove a brick, transferring its payload to the caller
    pub fn remove(&mut self, id: BrickId) -> Option<BrickPayload> {
        self.entries.remove(&id).map(|e| e.payload)
    }

    /// Resident brick with the oldest access
    pub fn least_recently_used(&self) -> Option<BrickId> {
        self.entries
            .iter()
            .min_by_key(|(id, e)| (e.last_access, **id))
            .map(|(id, _)| *id)
    }

    /// Access stamp of a resident brick (higher = more recent)
    pub fn last_access(&self, id: BrickId) -> Option<u64> {
        self.entries.get(&id).map(|e| e.last_access)
    }

    /// Iterate resident brick ids
    pub fn ids(&self) -> impl Iterator<Item = BrickId> + '_ {
        self.entries.keys().copied()
    }

    /// Drop every resident brick
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn check_payload(&self, id: BrickId, payload: BrickPayload) -> Result<BrickPayload, InsertError> {
        let expected = voxel_count(self.brick_size);
        let actual = payload.len();
        if actual != expected {
            return Err(InsertError::PayloadSize { id, payload, expected, actual });
        }
        Ok(payload)
    }

    fn put(&mut self, id: BrickId, payload: BrickPayload) -> Option<BrickPayload> {
        self.clock += 1;
        let entry = Entry { payload, last_access: self.clock };
        self.entries.insert(id, entry).map(|old| old.payload)
    }
}

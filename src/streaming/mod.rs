//! Brick streaming: bounded loading into a fixed-capacity cache
//!
//! Key concepts:
//! - Worker pool: explicit width caps bricks decoded at once
//! - Brick cache: fixed capacity, eviction only on the caller's decision
//! - Reply queue: brick ids announced in completion order
//! - Progress: advisory scalar plus status message

pub mod budget;
pub mod pool;
pub mod progress;
pub mod cache;
pub mod loader;

pub use budget::MemoryBudget;
pub use pool::{CancelToken, WorkerPool};
pub use progress::LoadProgress;
pub use cache::{BrickCache, EvictionPolicy, InsertError, LeastRecentlyUsed, SharedBrickCache};
pub use loader::{load_all, reply_queue, BrickLoader, LoadReport, ReplyReceiver, ReplySender};

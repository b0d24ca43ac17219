//! Coord Core - cross-process coordination primitives
//!
//! A distributed lock and a reliable bounded-concurrency task queue over a
//! shared Redis store, a process-local TTL cache with memoizing wrappers, and
//! an in-process cron scheduler.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod store;

pub use api::AppState;
pub use config::Config;
pub use error::{CoordError, Result};
pub use lock::{DistributedLock, LockGuard};
pub use queue::{QueueOptions, QueueRegistry, TaskHandler, TaskQueue, TaskStatus};
pub use scheduler::Scheduler;
pub use store::{MemoryStore, RedisStore, SharedStore};

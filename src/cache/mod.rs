//! Cache Module
//!
//! Process-local TTL cache and the memoizing wrappers built on it. Never used
//! for cross-process coordination; that goes through the shared store.

mod entry;
mod memoize;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use memoize::{args_key, query_key, AsyncMemo, BlockingMemo, MemoPolicy, QueryParams};
pub use store::TtlCache;

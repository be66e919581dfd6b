//! History cache backends
//!
//! - `memory` - Per-process cache, the default
//! - `redis` - Shared Redis cache (feature `redis`)

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryHistoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisHistoryCache;

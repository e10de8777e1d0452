//! # lrucache
//!
//! Bounded, thread-safe key/value cache with least-recently-used eviction.
//!
//! ## Architecture
//! - **Index**: AHash map from key to node handle (O(1) lookup)
//! - **Recency list**: arena-backed doubly-linked list, head = most recent (O(1) promote/evict)
//! - **Facade**: [`LruCache`] owns both behind one lock and keeps them in lock-step
//!
//! Only writes promote an entry; reads leave recency untouched.
//!
//! ```
//! use lrucache::LruCache;
//!
//! let cache = LruCache::new(2).unwrap();
//! cache.write("a", 1).unwrap();
//! cache.write("b", 2).unwrap();
//! cache.write("c", 3).unwrap();
//!
//! assert!(!cache.exists(&"a"));
//! assert_eq!(cache.read(&"c").unwrap(), 3);
//! ```

#![warn(missing_docs)]

mod cache;
mod error;
mod index;
mod list;
mod stats;

pub use cache::LruCache;
pub use error::{Error, Result};
pub use stats::{CacheStats, StatsSnapshot};

/// Upper bound for the capacity of any cache, at construction or resize
pub const MAX_CAPACITY: usize = 1500;

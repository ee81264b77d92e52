//! Read cache module
//!
//! # Module Structure
//!
//! - [`read_cache`] - Single-flight memoizing cache of one network variant
//! - [`handler`] - Per-variant index of caches, with network invalidation

pub mod handler;
pub mod read_cache;

pub use handler::CacheHandler;
pub use read_cache::ReadCache;

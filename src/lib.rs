//! gridcache - client-side consistency layer for a remote network store
//!
//! Sits between callers and a remote, versioned store of electrical network
//! resources: reads are memoized per network variant, writes are buffered and
//! flushed in batches, whole collections can be preloaded concurrently, and
//! electrical buses are derived from the switch graph of each voltage level.
//!
//! # Module Structure
//!
//! - [`resource`] - Resource types, typed attributes, shared handles
//! - [`store`] - The remote store seam, its REST client and an in-memory store
//! - [`buffer`] - Write buffers and the per-variant collection index
//! - [`cache`] - Single-flight read cache and its handler
//! - [`preload`] - Preloading strategies, presets and the orchestrator
//! - [`topology`] - Bus derivation for node/breaker and bus/breaker levels
//! - [`session`] - The context object exposing every operation
//! - [`config`] - Persisted user configuration of the CLI

pub mod buffer;
pub mod cache;
pub mod config;
pub mod preload;
pub mod resource;
pub mod session;
pub mod store;
pub mod topology;

pub use session::NetworkStoreSession;

/// Version injected at compile time via GRIDCACHE_VERSION env var (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("GRIDCACHE_VERSION") {
    Some(v) => v,
    None => "dev",
};

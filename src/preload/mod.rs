//! Preloading module
//!
//! Bulk loading of whole resource classes into a variant's read cache ahead
//! of first access. Preloading only saves round trips: anything it does not
//! load is fetched lazily by the cache.
//!
//! # Module Structure
//!
//! - [`strategy`] - Strategy descriptors and their builder
//! - [`registry`] - Named presets embedded as JSON
//! - [`orchestrator`] - Concurrent fan-out of a strategy into cache loads

pub mod orchestrator;
pub mod registry;
pub mod strategy;

pub use orchestrator::{LoadedTypes, PreloadReport, PreloadingOrchestrator};
pub use registry::{get_all_preset_names, get_preset, resolve_preset};
pub use strategy::{PreloadingStrategy, PreloadingStrategyBuilder, ResourceDescriptor};

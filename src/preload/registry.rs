//! Preset Registry - Load named preloading presets from JSON
//!
//! Presets are embedded in the binary and parsed once on first access.

use super::strategy::PreloadingStrategy;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded preset JSON files (compiled into the binary)
const PRESET_FILES: &[&str] = &[include_str!("../resources/preloading.json")];

/// Preset definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct PresetDef {
    pub description: String,
    pub strategy: PreloadingStrategy,
}

/// Root structure of resources/preloading.json
#[derive(Debug, Clone, Deserialize)]
pub struct PresetConfig {
    #[serde(default)]
    pub presets: HashMap<String, PresetDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<PresetConfig> = OnceLock::new();

/// Get the preset registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static PresetConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = PresetConfig {
            presets: HashMap::new(),
        };

        for content in PRESET_FILES {
            let partial: PresetConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded preset JSON: {}", e));
            final_config.presets.extend(partial.presets);
        }

        final_config
    })
}

/// Get a preset by name
pub fn get_preset(name: &str) -> Option<&'static PresetDef> {
    get_registry().presets.get(name)
}

/// Get all preset names, sorted
pub fn get_all_preset_names() -> Vec<&'static str> {
    let mut names: Vec<_> = get_registry()
        .presets
        .keys()
        .map(|s| s.as_str())
        .collect();
    names.sort_unstable();
    names
}

/// Strategy of a named preset
pub fn resolve_preset(name: &str) -> anyhow::Result<PreloadingStrategy> {
    match get_preset(name) {
        Some(preset) => Ok(preset.strategy.clone()),
        None => anyhow::bail!(
            "Unknown preloading preset '{}' (available: {})",
            name,
            get_all_preset_names().join(", ")
        ),
    }
}

//! Preloading strategies
//!
//! A strategy says which resource types (and which of their extensions and
//! operational limits) are bulk loaded into a variant's cache ahead of the
//! first read. Strategies come from the preset registry, from a YAML or JSON
//! file, or from [`PreloadingStrategy::builder`].

use crate::resource::{LimitsSelection, ResourceType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// What to bulk load for one resource type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Extension names to bulk load alongside the resources
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub extensions: BTreeSet<String>,
    /// Load every extension of the type instead of named ones
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_extensions: bool,
    /// Operational limits groups to load, for branch types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsSelection>,
}

impl ResourceDescriptor {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            extensions: BTreeSet::new(),
            all_extensions: false,
            limits: None,
        }
    }

    /// Fold another descriptor of the same type into this one
    fn merge(&mut self, other: ResourceDescriptor) {
        self.extensions.extend(other.extensions);
        self.all_extensions |= other.all_extensions;
        self.limits = self.limits.max(other.limits);
    }
}

/// Immutable preloading configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PreloadingStrategy {
    /// Load lazily on every miss
    #[default]
    None,
    /// Every contained resource type, with all extensions and limits
    WholeVariant,
    /// Listed resource types only, in order
    Collections { resources: Vec<ResourceDescriptor> },
}

impl PreloadingStrategy {
    pub fn builder() -> PreloadingStrategyBuilder {
        PreloadingStrategyBuilder::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.descriptors().is_empty()
    }

    /// Descriptors to load, one per resource type
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        match self {
            Self::None => Vec::new(),
            Self::WholeVariant => ResourceType::contained()
                .map(|t| ResourceDescriptor {
                    all_extensions: true,
                    limits: t.has_operational_limits().then_some(LimitsSelection::All),
                    ..ResourceDescriptor::new(t)
                })
                .collect(),
            Self::Collections { resources } => {
                let mut builder = Self::builder();
                for descriptor in resources {
                    builder = builder.with_descriptor(descriptor.clone());
                }
                builder.descriptors
            }
        }
    }

    pub fn resource_types(&self) -> BTreeSet<ResourceType> {
        self.descriptors().into_iter().map(|d| d.resource_type).collect()
    }

    /// Reject descriptors that cannot be loaded
    pub fn validate(&self) -> Result<()> {
        let Self::Collections { resources } = self else {
            return Ok(());
        };
        for descriptor in resources {
            if descriptor.resource_type == ResourceType::Network {
                anyhow::bail!("the network root cannot be preloaded as a collection");
            }
            if descriptor.limits.is_some() && !descriptor.resource_type.has_operational_limits() {
                anyhow::bail!(
                    "{} resources have no operational limits",
                    descriptor.resource_type
                );
            }
        }
        Ok(())
    }

    /// Parse a strategy document, YAML for `.yaml`/`.yml` files, JSON otherwise
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preloading file {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let strategy: Self = if is_yaml {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

/// Builder of arbitrary [`PreloadingStrategy::Collections`] strategies
///
/// Adding a type twice merges both descriptors.
#[derive(Debug, Default)]
pub struct PreloadingStrategyBuilder {
    descriptors: Vec<ResourceDescriptor>,
    seen: HashSet<ResourceType>,
}

impl PreloadingStrategyBuilder {
    pub fn with_descriptor(mut self, descriptor: ResourceDescriptor) -> Self {
        if descriptor.resource_type == ResourceType::Network {
            tracing::warn!("ignoring network root in preloading strategy");
            return self;
        }
        if self.seen.insert(descriptor.resource_type) {
            self.descriptors.push(descriptor);
        } else if let Some(existing) = self
            .descriptors
            .iter_mut()
            .find(|d| d.resource_type == descriptor.resource_type)
        {
            existing.merge(descriptor);
        }
        self
    }

    pub fn with(self, resource_type: ResourceType) -> Self {
        self.with_descriptor(ResourceDescriptor::new(resource_type))
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = ResourceType>) -> Self {
        for resource_type in types {
            self = self.with(resource_type);
        }
        self
    }

    pub fn with_extensions<S: Into<String>>(
        self,
        resource_type: ResourceType,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.with_descriptor(ResourceDescriptor {
            extensions: names.into_iter().map(Into::into).collect(),
            ..ResourceDescriptor::new(resource_type)
        })
    }

    pub fn with_all_extensions(self, resource_type: ResourceType) -> Self {
        self.with_descriptor(ResourceDescriptor {
            all_extensions: true,
            ..ResourceDescriptor::new(resource_type)
        })
    }

    pub fn with_limits(self, resource_type: ResourceType, selection: LimitsSelection) -> Self {
        self.with_descriptor(ResourceDescriptor {
            limits: Some(selection),
            ..ResourceDescriptor::new(resource_type)
        })
    }

    pub fn build(self) -> PreloadingStrategy {
        if self.descriptors.is_empty() {
            PreloadingStrategy::None
        } else {
            PreloadingStrategy::Collections {
                resources: self.descriptors,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_merges_repeated_types() {
        let strategy = PreloadingStrategy::builder()
            .with(ResourceType::Generator)
            .with_extensions(ResourceType::Generator, ["activePowerControl"])
            .with(ResourceType::Line)
            .with_limits(ResourceType::Line, LimitsSelection::Selected)
            .with_limits(ResourceType::Line, LimitsSelection::All)
            .build();

        let descriptors = strategy.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].resource_type, ResourceType::Generator);
        assert!(descriptors[0].extensions.contains("activePowerControl"));
        assert_eq!(descriptors[1].limits, Some(LimitsSelection::All));
    }

    #[test]
    fn test_empty_builder_is_none() {
        assert_eq!(PreloadingStrategy::builder().build(), PreloadingStrategy::None);
        assert!(!PreloadingStrategy::None.is_enabled());
    }

    #[test]
    fn test_whole_variant_covers_contained_types() {
        let types = PreloadingStrategy::WholeVariant.resource_types();
        assert_eq!(types.len(), ResourceType::ALL.len() - 1);
        assert!(!types.contains(&ResourceType::Network));
    }

    #[test]
    fn test_yaml_document() {
        let yaml = r#"
mode: collections
resources:
  - type: SWITCH
  - type: LINE
    limits: selected
  - type: GENERATOR
    extensions: [activePowerControl]
"#;
        let strategy: PreloadingStrategy = serde_yaml::from_str(yaml).unwrap();
        strategy.validate().unwrap();
        assert_eq!(strategy.descriptors().len(), 3);
    }

    #[test]
    fn test_validate_rejects_limits_on_loads() {
        let strategy = PreloadingStrategy::Collections {
            resources: vec![ResourceDescriptor {
                limits: Some(LimitsSelection::All),
                ..ResourceDescriptor::new(ResourceType::Load)
            }],
        };
        assert!(strategy.validate().is_err());
    }
}

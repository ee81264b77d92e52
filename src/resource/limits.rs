//! Operational limits groups
//!
//! Sub-resources of branches: named groups of current limits, one set per
//! side. Loaded and removed independently of the branch attributes.

use super::types::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryLimit {
    pub name: String,
    pub value: f64,
    pub acceptable_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingLimits {
    pub permanent_limit: f64,
    #[serde(default)]
    pub temporary_limits: Vec<TemporaryLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalLimitsGroup {
    pub id: String,
    pub side: Side,
    #[serde(default)]
    pub current_limits: Option<LoadingLimits>,
}

impl OperationalLimitsGroup {
    /// Key identifying a group among all groups of one branch
    pub fn key(&self) -> String {
        group_key(&self.id, self.side)
    }
}

/// Key of a limits group on one branch side, as used in removal batches
pub fn group_key(group_id: &str, side: Side) -> String {
    format!("{}@{}", group_id, side.index())
}

/// How much of the operational limits of a branch type to preload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitsSelection {
    /// Only the currently selected group of each side
    Selected,
    /// Every group
    All,
}

impl LimitsSelection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::All => "all",
        }
    }

    /// Whether data loaded at this level answers a query at `wanted`
    pub fn covers(self, wanted: LimitsSelection) -> bool {
        self >= wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_selected() {
        assert!(LimitsSelection::All.covers(LimitsSelection::Selected));
        assert!(LimitsSelection::All.covers(LimitsSelection::All));
        assert!(!LimitsSelection::Selected.covers(LimitsSelection::All));
    }

    #[test]
    fn test_group_key_distinguishes_sides() {
        assert_ne!(group_key("DEFAULT", Side::One), group_key("DEFAULT", Side::Two));
    }
}

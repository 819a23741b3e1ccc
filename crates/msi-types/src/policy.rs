use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Realtime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyBudget {
    Low,
    #[default]
    Balanced,
    Unbounded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    #[default]
    Any,
    Little,
    Big,
    Npu,
}

/// Scheduling hints for a lane. Never affects correctness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanePolicy {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub energy_budget: EnergyBudget,
    #[serde(default)]
    pub affinity: Affinity,
}

impl LanePolicy {
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, patch: LanePolicyPatch) {
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(energy_budget) = patch.energy_budget {
            self.energy_budget = energy_budget;
        }
        if let Some(affinity) = patch.affinity {
            self.affinity = affinity;
        }
    }
}

/// Partial policy update; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanePolicyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_budget: Option<EnergyBudget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
}

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ids::EventId;

pub type EventMeta = BTreeMap<String, String>;

/// Delivery guarantee requested by a publisher.
///
/// Only `BestEffort` is honoured; the stronger levels are accepted and
/// delivered at-most-once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QoS {
    #[default]
    BestEffort,
    AtLeastOnce,
    ExactlyOnce,
}

/// Immutable published event. Two events are equal when their ids are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub topic: String,
    pub ts_nanos: u64,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: EventMeta,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

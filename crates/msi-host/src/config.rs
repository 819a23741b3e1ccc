use std::str::FromStr;

use crate::error::{SubstrateError, SubstrateResult};

pub const ENV_EVENT_QUEUE_CAPACITY: &str = "MSI_EVENT_QUEUE_CAPACITY";
pub const ENV_MAX_LANES: &str = "MSI_MAX_LANES";
pub const ENV_LANE_HISTORY: &str = "MSI_LANE_HISTORY";
pub const ENV_MAX_STATE_BYTES: &str = "MSI_MAX_STATE_BYTES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstrateConfig {
    /// Per-subscription queue depth; a full queue drops new events.
    pub event_queue_capacity: usize,
    /// Upper bound on concurrently active lanes (None = unbounded).
    pub max_lanes: Option<usize>,
    /// How many terminal lane outcomes are kept for `lane_state` polling.
    pub lane_history: usize,
    /// Largest single state region in bytes (None = unbounded).
    pub max_state_bytes: Option<usize>,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 64,
            max_lanes: None,
            lane_history: 256,
            max_state_bytes: None,
        }
    }
}

impl SubstrateConfig {
    /// Defaults overridden by `MSI_*` environment variables.
    pub fn from_env() -> SubstrateResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SubstrateResult<Self> {
        let mut config = Self::default();
        if let Some(capacity) = parse_var(&lookup, ENV_EVENT_QUEUE_CAPACITY)? {
            if capacity == 0 {
                return Err(SubstrateError::Config(format!(
                    "{ENV_EVENT_QUEUE_CAPACITY} must be positive"
                )));
            }
            config.event_queue_capacity = capacity;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_LANES)? {
            config.max_lanes = Some(max);
        }
        if let Some(history) = parse_var(&lookup, ENV_LANE_HISTORY)? {
            config.lane_history = history;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_STATE_BYTES)? {
            config.max_state_bytes = Some(max);
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> SubstrateResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SubstrateError::Config(format!("{key}='{raw}' is not a valid number"))),
    }
}

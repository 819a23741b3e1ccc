use std::fmt;

use serde::{Deserialize, Serialize};

/// Access level attached to state and associative grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perms {
    R,
    RW,
}

impl Perms {
    pub fn can_write(self) -> bool {
        matches!(self, Perms::RW)
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Perms::R => f.write_str("r"),
            Perms::RW => f.write_str("rw"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accel {
    Cpu,
    Gpu,
    Npu,
    Dsp,
}

/// A single positive capability held by a domain. There is no deny form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    Events { topic_prefix: String },
    State { name: String, perms: Perms },
    Assoc { space: String, perms: Perms },
    Clock,
    Accel { which: Accel },
}

impl Grant {
    pub fn events(topic_prefix: impl Into<String>) -> Self {
        Grant::Events {
            topic_prefix: topic_prefix.into(),
        }
    }

    pub fn state(name: impl Into<String>, perms: Perms) -> Self {
        Grant::State {
            name: name.into(),
            perms,
        }
    }

    pub fn assoc(space: impl Into<String>, perms: Perms) -> Self {
        Grant::Assoc {
            space: space.into(),
            perms,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Grant::Events { .. } => "events",
            Grant::State { .. } => "state",
            Grant::Assoc { .. } => "assoc",
            Grant::Clock => "clock",
            Grant::Accel { .. } => "accel",
        }
    }

    /// Human readable resource label used in denial messages.
    pub fn resource(&self) -> String {
        match self {
            Grant::Events { topic_prefix } => format!("events:{topic_prefix}"),
            Grant::State { name, perms } => format!("state:{name}:{perms}"),
            Grant::Assoc { space, perms } => format!("assoc:{space}:{perms}"),
            Grant::Clock => "clock".to_string(),
            Grant::Accel { which } => format!("accel:{which:?}").to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_use_kind_tag_on_the_wire() {
        let grant = Grant::assoc("working", Perms::RW);
        let json = serde_json::to_value(&grant).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "assoc", "space": "working", "perms": "rw" })
        );

        let clock: Grant = serde_json::from_str(r#"{ "kind": "clock" }"#).unwrap();
        assert_eq!(clock, Grant::Clock);

        let accel: Grant = serde_json::from_str(r#"{ "kind": "accel", "which": "npu" }"#).unwrap();
        assert_eq!(accel, Grant::Accel { which: Accel::Npu });
    }

    #[test]
    fn resource_labels() {
        assert_eq!(Grant::events("sensor/").resource(), "events:sensor/");
        assert_eq!(Grant::state("frame", Perms::R).resource(), "state:frame:r");
        assert_eq!(Grant::Accel { which: Accel::Gpu }.resource(), "accel:gpu");
    }
}

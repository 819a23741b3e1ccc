//! Shared substrate vocabulary: handles, grants, manifests, events, associative
//! values and the capability descriptor advertised by every substrate.

mod assoc;
mod caps;
mod event;
mod grant;
mod ids;
pub mod manifest;
mod policy;

pub use assoc::{AssocQuery, AssocResult, AssocValue};
pub use caps::{
    AccelCaps, Attestation, Caps, ClockCaps, ClockModel, EventCaps, EventModel, LaneCaps,
    SecurityCaps, SecurityModel, Semver, StateCaps, StateModel,
};
pub use event::{Event, EventMeta, QoS};
pub use grant::{Accel, Grant, Perms};
pub use ids::{DomainId, EventId, LaneId, StateHandle, SubId};
pub use manifest::{DomainManifest, ManifestError, load_manifest_from_path};
pub use policy::{Affinity, EnergyBudget, LanePolicy, LanePolicyPatch, Priority};

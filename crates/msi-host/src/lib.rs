//! The substrate façade: composes the domain manager, event bus, state store
//! and associative store, and runs host-registered lane bodies on the tokio
//! worker pool.

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod entrypoints;
pub mod error;
pub mod lane;
pub mod substrate;

pub use bootstrap::{bootstrap_substrate, validate_caps};
pub use clock::MonotonicClock;
pub use config::SubstrateConfig;
pub use entrypoints::{EntrypointRegistry, LaneBody, LaneFuture};
pub use error::{SubstrateError, SubstrateResult};
pub use lane::{LaneContext, LaneInfo, LaneState};
pub use substrate::{MSI_VERSION, Substrate, SubstrateStats};

pub use msi_kernel::{KernelError, SubscriptionReceiver};
pub use msi_store::{StoreError, vector};
pub use msi_types::*;

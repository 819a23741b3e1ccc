//! Shared helpers for the substrate integration tests.
//!
//! Each test binary compiles this module separately, so not every helper is
//! used everywhere.

#![allow(dead_code)]

use std::time::Duration;

use msi_host::{
    DomainId, DomainManifest, Grant, LaneId, LaneState, Perms, Substrate, SubstrateConfig,
};

pub fn substrate() -> Substrate {
    Substrate::new(SubstrateConfig::default()).expect("tokio runtime")
}

pub fn substrate_with(config: SubstrateConfig) -> Substrate {
    Substrate::new(config).expect("tokio runtime")
}

/// A sealed domain that can use the percept pipeline topics and the
/// `working` space.
pub fn scout_domain(msi: &Substrate) -> DomainId {
    msi.domain_create(
        &DomainManifest::new("scout")
            .grant(Grant::events("sensor/"))
            .grant(Grant::events("percept/"))
            .grant(Grant::assoc("working", Perms::RW))
            .grant(Grant::Clock)
            .sealed(),
    )
}

/// Polls until the lane reaches `want` or five seconds pass.
pub async fn wait_for_lane(msi: &Substrate, lane: &LaneId, want: LaneState) -> bool {
    poll(|| msi.lane_state(lane) == Some(want)).await
}

pub async fn poll(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

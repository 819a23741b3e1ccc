//! The MSI façade.
//!
//! Every domain-scoped call builds the grant it needs from its topic, region
//! name or space, asks the [`DomainManager`], and only then touches the leaf
//! store. A `None` domain is the host context and bypasses the check.
//!
//! Store operations are synchronous and hold no lock across an await, so a
//! lane cancelled by [`Substrate::lane_kill`] can only stop between calls,
//! never in the middle of a write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use msi_kernel::{DomainManager, EventBus};
use msi_store::{AssocStore, StateStore, StoreError};
use msi_types::{
    AccelCaps, AssocQuery, AssocResult, AssocValue, Attestation, Caps, ClockCaps, ClockModel,
    DomainId, DomainManifest, Event, EventCaps, EventId, EventMeta, EventModel, Grant, LaneCaps,
    LaneId, LanePolicy, LanePolicyPatch, Perms, Priority, QoS, SecurityCaps, SecurityModel,
    Semver, StateCaps, StateHandle, StateModel, SubId,
};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::clock::MonotonicClock;
use crate::config::SubstrateConfig;
use crate::entrypoints::EntrypointRegistry;
use crate::error::{SubstrateError, SubstrateResult};
use crate::lane::{LaneContext, LaneInfo, LaneState, LaneTable};

pub const MSI_VERSION: Semver = Semver {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Read-only snapshot returned by [`Substrate::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstrateStats {
    pub version: String,
    pub lanes_active: usize,
    pub domains: usize,
    pub event_subscriptions: usize,
    pub state_regions: usize,
    pub assoc_spaces: usize,
    pub events_dropped: u64,
}

struct Inner {
    config: SubstrateConfig,
    runtime: Handle,
    clock: MonotonicClock,
    domains: DomainManager,
    bus: EventBus,
    state: StateStore,
    assoc: AssocStore,
    entrypoints: EntrypointRegistry,
    lanes: LaneTable,
    shut_down: AtomicBool,
}

/// Cheaply cloneable handle to one substrate instance.
#[derive(Clone)]
pub struct Substrate {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Substrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Substrate")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Substrate {
    /// Builds a substrate whose lanes run on the current tokio runtime.
    pub fn new(config: SubstrateConfig) -> SubstrateResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SubstrateError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: SubstrateConfig, runtime: Handle) -> Self {
        let inner = Inner {
            runtime,
            clock: MonotonicClock::new(),
            domains: DomainManager::new(),
            bus: EventBus::new(config.event_queue_capacity),
            state: StateStore::with_max_region_bytes(config.max_state_bytes),
            assoc: AssocStore::new(),
            entrypoints: EntrypointRegistry::new(),
            lanes: LaneTable::new(config.lane_history),
            shut_down: AtomicBool::new(false),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &SubstrateConfig {
        &self.inner.config
    }

    // ---------------------------------------------------------------------
    // Discovery

    pub fn version(&self) -> Semver {
        MSI_VERSION
    }

    pub fn capabilities(&self) -> Caps {
        Caps {
            lanes: LaneCaps {
                min: 1,
                max: self
                    .inner
                    .config
                    .max_lanes
                    .map(|m| u32::try_from(m).unwrap_or(u32::MAX)),
                realtime: false,
            },
            events: EventCaps {
                model: EventModel::Topic,
                max_topics: None,
            },
            state: StateCaps {
                model: StateModel::Hybrid,
                max_bytes: self.inner.config.max_state_bytes.map(|b| b as u64),
            },
            clock: ClockCaps {
                model: ClockModel::Monotonic,
            },
            security: SecurityCaps {
                model: SecurityModel::AppSandbox,
                attest: false,
            },
            accel: AccelCaps {
                cpu: true,
                gpu: false,
                npu: false,
                dsp: false,
            },
        }
    }

    /// No attestation provider is wired in; always reports absent.
    pub async fn attest(&self) -> Attestation {
        Attestation::default()
    }

    // ---------------------------------------------------------------------
    // Clock

    pub fn clock_now_nanos(&self) -> u64 {
        self.inner.clock.now_nanos()
    }

    pub async fn clock_sleep_until_nanos(&self, t_nanos: u64) {
        self.inner.clock.sleep_until_nanos(t_nanos).await;
    }

    // ---------------------------------------------------------------------
    // Domains

    pub fn domain_create(&self, manifest: &DomainManifest) -> DomainId {
        self.inner.domains.create(manifest)
    }

    pub fn domain_grant(&self, domain: &DomainId, grant: Grant) -> SubstrateResult<()> {
        Ok(self.inner.domains.grant(domain, grant)?)
    }

    pub fn domain_seal(&self, domain: &DomainId) -> SubstrateResult<()> {
        Ok(self.inner.domains.seal(domain)?)
    }

    pub fn domain_allowed(&self, domain: Option<&DomainId>, want: &Grant) -> bool {
        self.inner.domains.allowed(domain, want)
    }

    pub fn domain_name(&self, domain: &DomainId) -> Option<String> {
        self.inner.domains.name(domain)
    }

    // ---------------------------------------------------------------------
    // Entrypoints

    pub fn register_entrypoint<F, Fut>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(LaneContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.entrypoints.register(name, body);
    }

    pub fn unregister_entrypoint(&self, name: &str) -> bool {
        self.inner.entrypoints.unregister(name)
    }

    // ---------------------------------------------------------------------
    // Lanes

    /// Starts `entrypoint` as a new lane. The id comes back immediately; how
    /// the body ends is only visible later through [`Self::lane_state`].
    pub fn lane_spawn(
        &self,
        domain: Option<&DomainId>,
        entrypoint: &str,
        policy: LanePolicy,
    ) -> SubstrateResult<LaneId> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(SubstrateError::ShutDown);
        }
        let body = self
            .inner
            .entrypoints
            .resolve(entrypoint)
            .ok_or_else(|| SubstrateError::UnknownEntrypoint(entrypoint.to_string()))?;
        if policy.priority == Priority::Realtime {
            debug!(entrypoint, "realtime priority is best effort on this substrate");
        }

        let id = LaneId::generate();
        let ctx = LaneContext::new(id.clone(), domain.cloned(), self.clone());
        let (start_tx, start_rx) = oneshot::channel::<()>();
        let substrate = self.clone();
        let lane = id.clone();
        let name = entrypoint.to_string();
        let body_task: JoinHandle<()> = self.inner.runtime.spawn(async move {
            if start_rx.await.is_err() {
                return;
            }
            substrate.inner.lanes.mark_running(&lane);
            // No await between the body returning and the outcome landing in
            // the table, so a kill cannot relabel a lane that already finished.
            let outcome = match body(ctx).await {
                Ok(()) => LaneState::Completed,
                Err(err) => {
                    error!(lane = %lane, entrypoint = %name, error = %format!("{err:#}"), "lane failed");
                    LaneState::Failed
                }
            };
            if substrate.inner.lanes.finish(&lane, outcome) {
                debug!(lane = %lane, state = ?outcome, "lane finished");
            }
        });

        let info = LaneInfo {
            id: id.clone(),
            domain: domain.cloned(),
            entrypoint: entrypoint.to_string(),
            policy,
            state: LaneState::Spawned,
        };
        if let Err(err) =
            self.inner
                .lanes
                .try_insert(info, body_task.abort_handle(), self.inner.config.max_lanes)
        {
            // Dropping the start signal lets the gated task exit unrun.
            drop(start_tx);
            return Err(err);
        }
        self.inner.runtime.spawn(supervise(
            self.clone(),
            id.clone(),
            entrypoint.to_string(),
            body_task,
        ));
        let _ = start_tx.send(());
        debug!(lane = %id, entrypoint, domain = ?domain, ?policy, "lane spawned");
        Ok(id)
    }

    /// Cooperative yield point. Tokio already preempts at every await, so
    /// this does nothing.
    pub fn lane_yield(&self, _lane: &LaneId) {}

    pub async fn lane_sleep_nanos(&self, lane: &LaneId, nanos: i64) {
        if !self.inner.lanes.is_active(lane) {
            return;
        }
        self.inner.clock.sleep_nanos(nanos).await;
    }

    /// Cancels the lane at its next suspension point. Unknown or finished
    /// lanes are ignored.
    pub fn lane_kill(&self, lane: &LaneId) {
        if self.inner.lanes.kill(lane) {
            debug!(lane = %lane, "lane killed");
        }
    }

    /// Updates the recorded policy. Hints are only applied at spawn.
    pub fn lane_set_policy(&self, lane: &LaneId, patch: LanePolicyPatch) -> bool {
        let Some(mut info) = self.inner.lanes.info(lane) else {
            return false;
        };
        info.policy.apply(patch);
        self.inner.lanes.set_policy(lane, info.policy)
    }

    pub fn lane_is_alive(&self, lane: &LaneId) -> bool {
        self.inner.lanes.is_active(lane)
    }

    pub fn lane_state(&self, lane: &LaneId) -> Option<LaneState> {
        self.inner.lanes.state(lane)
    }

    pub fn lane_info(&self, lane: &LaneId) -> Option<LaneInfo> {
        self.inner.lanes.info(lane)
    }

    pub fn lane_count(&self) -> usize {
        self.inner.lanes.active_count()
    }

    pub fn lanes(&self) -> Vec<LaneInfo> {
        self.inner.lanes.list()
    }

    // ---------------------------------------------------------------------
    // Events

    /// Publishes under the topic's parent path: `percept/frame` needs an
    /// events grant compatible with `percept`.
    pub fn event_publish(
        &self,
        domain: Option<&DomainId>,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        meta: EventMeta,
    ) -> SubstrateResult<EventId> {
        let scope = topic.rsplit_once('/').map_or(topic, |(parent, _)| parent);
        self.require(domain, Grant::events(scope))?;
        if qos != QoS::BestEffort {
            debug!(topic, ?qos, "requested QoS not implemented; delivering best effort");
        }
        let event = Event {
            id: EventId::generate(),
            topic: topic.to_string(),
            ts_nanos: self.clock_now_nanos(),
            payload: payload.into(),
            meta,
        };
        let delivered = self.inner.bus.publish(&event);
        trace!(event = %event.id, topic, delivered, "event published");
        Ok(event.id)
    }

    pub fn event_subscribe(
        &self,
        domain: Option<&DomainId>,
        prefix: &str,
        filter: Option<&str>,
    ) -> SubstrateResult<SubId> {
        self.require(domain, Grant::events(prefix))?;
        let (id, _rx) = self.inner.bus.subscribe(prefix, filter);
        Ok(id)
    }

    /// Next event on `sub`. Resolves to `None` on timeout, for an unknown
    /// subscription, and once an unsubscribed queue is drained.
    pub async fn event_wait(
        &self,
        domain: Option<&DomainId>,
        sub: &SubId,
        timeout: Option<Duration>,
    ) -> SubstrateResult<Option<Event>> {
        let Some(info) = self.inner.bus.subscription(sub) else {
            return Ok(None);
        };
        self.require(domain, Grant::events(info.prefix))?;
        let Some(rx) = self.inner.bus.channel_for(sub) else {
            return Ok(None);
        };
        Ok(match timeout {
            Some(timeout) => rx.recv_timeout(timeout).await,
            None => rx.recv().await,
        })
    }

    pub fn event_unsubscribe(&self, domain: Option<&DomainId>, sub: &SubId) -> SubstrateResult<bool> {
        let Some(info) = self.inner.bus.subscription(sub) else {
            return Ok(false);
        };
        self.require(domain, Grant::events(info.prefix))?;
        Ok(self.inner.bus.unsubscribe(sub))
    }

    /// Acknowledgement is not tracked; delivery is at-most-once.
    pub fn event_ack(&self, event: &EventId) {
        trace!(event = %event, "event ack ignored");
    }

    // ---------------------------------------------------------------------
    // Addressable state

    pub fn state_map(
        &self,
        domain: Option<&DomainId>,
        name: &str,
        size: usize,
        perms: Perms,
    ) -> SubstrateResult<StateHandle> {
        self.require(domain, Grant::state(name, perms))?;
        Ok(self.inner.state.map(name, size, perms)?)
    }

    pub fn state_read(
        &self,
        domain: Option<&DomainId>,
        handle: &StateHandle,
        offset: usize,
        len: usize,
    ) -> SubstrateResult<Vec<u8>> {
        self.require_region(domain, handle, Perms::R)?;
        Ok(self.inner.state.read(handle, offset, len)?)
    }

    pub fn state_write(
        &self,
        domain: Option<&DomainId>,
        handle: &StateHandle,
        offset: usize,
        data: &[u8],
    ) -> SubstrateResult<()> {
        self.require_region(domain, handle, Perms::RW)?;
        Ok(self.inner.state.write(handle, offset, data)?)
    }

    /// Clears the dirty flag. Nothing is made durable.
    pub fn state_commit(&self, domain: Option<&DomainId>, handle: &StateHandle) -> SubstrateResult<()> {
        self.require_region(domain, handle, Perms::RW)?;
        Ok(self.inner.state.commit(handle)?)
    }

    pub fn state_unmap(&self, domain: Option<&DomainId>, handle: &StateHandle) -> SubstrateResult<()> {
        self.require_region(domain, handle, Perms::RW)?;
        self.inner.state.unmap(handle);
        Ok(())
    }

    pub fn state_is_dirty(&self, handle: &StateHandle) -> bool {
        self.inner.state.is_dirty(handle)
    }

    // ---------------------------------------------------------------------
    // Associative state

    /// Stores `value`, stamping it with the current clock reading when it
    /// carries no timestamp.
    pub fn assoc_put(
        &self,
        domain: Option<&DomainId>,
        space: &str,
        key: &str,
        mut value: AssocValue,
    ) -> SubstrateResult<()> {
        self.require(domain, Grant::assoc(space, Perms::RW))?;
        if value.ts_nanos.is_none() {
            value.ts_nanos = Some(self.clock_now_nanos());
        }
        self.inner.assoc.put(space, key, value);
        Ok(())
    }

    pub fn assoc_get(
        &self,
        domain: Option<&DomainId>,
        space: &str,
        key: &str,
    ) -> SubstrateResult<Option<AssocValue>> {
        self.require(domain, Grant::assoc(space, Perms::R))?;
        Ok(self.inner.assoc.get(space, key))
    }

    pub fn assoc_query(
        &self,
        domain: Option<&DomainId>,
        space: &str,
        query: &AssocQuery,
    ) -> SubstrateResult<Vec<AssocResult>> {
        self.require(domain, Grant::assoc(space, Perms::R))?;
        Ok(self.inner.assoc.query(space, query))
    }

    pub fn assoc_forget(
        &self,
        domain: Option<&DomainId>,
        space: &str,
        key_or_policy: &str,
    ) -> SubstrateResult<()> {
        self.require(domain, Grant::assoc(space, Perms::RW))?;
        self.inner.assoc.forget(space, key_or_policy);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Lifecycle

    /// Cancels every lane and drops all subscriptions, regions and spaces.
    /// Further spawns fail with [`SubstrateError::ShutDown`].
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let killed = self.inner.lanes.kill_all();
        self.inner.bus.clear();
        self.inner.state.clear();
        self.inner.assoc.clear();
        debug!(killed, "substrate shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SubstrateStats {
        SubstrateStats {
            version: self.version().to_string(),
            lanes_active: self.inner.lanes.active_count(),
            domains: self.inner.domains.domain_count(),
            event_subscriptions: self.inner.bus.subscription_count(),
            state_regions: self.inner.state.region_count(),
            assoc_spaces: self.inner.assoc.space_count(),
            events_dropped: self.inner.bus.dropped_total(),
        }
    }

    fn require(&self, domain: Option<&DomainId>, want: Grant) -> SubstrateResult<()> {
        let Some(domain) = domain else {
            return Ok(());
        };
        if self.inner.domains.allowed(Some(domain), &want) {
            return Ok(());
        }
        warn!(domain = %domain, resource = %want.resource(), "permission denied");
        Err(SubstrateError::PermissionDenied {
            domain: domain.clone(),
            resource: want.resource(),
        })
    }

    fn require_region(
        &self,
        domain: Option<&DomainId>,
        handle: &StateHandle,
        perms: Perms,
    ) -> SubstrateResult<()> {
        let name = self
            .inner
            .state
            .region_name(handle)
            .ok_or_else(|| StoreError::UnknownHandle(handle.clone()))?;
        self.require(domain, Grant::state(name, perms))
    }
}

/// Waits for a lane task and records exits the body could not record itself.
/// Cancellation through `lane_kill` is a normal exit; a panic is a failure.
async fn supervise(
    substrate: Substrate,
    lane: LaneId,
    entrypoint: String,
    body: JoinHandle<()>,
) {
    let outcome = match body.await {
        Ok(()) => return,
        Err(join) if join.is_cancelled() => LaneState::Killed,
        Err(join) => {
            error!(lane = %lane, entrypoint = %entrypoint, error = %join, "lane panicked");
            LaneState::Failed
        }
    };
    if substrate.inner.lanes.finish(&lane, outcome) {
        debug!(lane = %lane, state = ?outcome, "lane finished");
    }
}

//! Lane bookkeeping and the context handed to lane bodies.
//!
//! A lane moves `Spawned -> Running -> {Completed | Killed | Failed}` and never
//! leaves a terminal state. Only active lanes hold a record; terminal outcomes
//! go into a bounded history so callers can poll how a lane ended.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use msi_types::{
    AssocQuery, AssocResult, AssocValue, DomainId, Event, EventId, EventMeta, LaneId, LanePolicy,
    Perms, QoS, StateHandle, SubId,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;

use crate::error::{SubstrateError, SubstrateResult};
use crate::substrate::Substrate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneState {
    Spawned,
    Running,
    Completed,
    Killed,
    Failed,
}

impl LaneState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LaneState::Completed | LaneState::Killed | LaneState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneInfo {
    pub id: LaneId,
    pub domain: Option<DomainId>,
    pub entrypoint: String,
    pub policy: LanePolicy,
    pub state: LaneState,
}

struct LaneRecord {
    info: LaneInfo,
    abort: AbortHandle,
}

#[derive(Default)]
struct Lanes {
    active: HashMap<LaneId, LaneRecord>,
    finished: VecDeque<(LaneId, LaneState)>,
    /// Set by `kill_all`; no lane is admitted afterwards.
    closed: bool,
}

pub(crate) struct LaneTable {
    lanes: Mutex<Lanes>,
    history_limit: usize,
}

impl LaneTable {
    pub(crate) fn new(history_limit: usize) -> Self {
        Self {
            lanes: Mutex::new(Lanes::default()),
            history_limit,
        }
    }

    /// Admits a lane. The closed check, the lane cap and the insert happen
    /// under one lock so neither `kill_all` nor a concurrent spawn can slip in
    /// between them.
    pub(crate) fn try_insert(
        &self,
        info: LaneInfo,
        abort: AbortHandle,
        max: Option<usize>,
    ) -> SubstrateResult<()> {
        let mut lanes = self.lanes.lock();
        if lanes.closed {
            return Err(SubstrateError::ShutDown);
        }
        if let Some(max) = max {
            if lanes.active.len() >= max {
                return Err(SubstrateError::LaneLimit { max });
            }
        }
        lanes
            .active
            .insert(info.id.clone(), LaneRecord { info, abort });
        Ok(())
    }

    pub(crate) fn mark_running(&self, lane: &LaneId) {
        if let Some(record) = self.lanes.lock().active.get_mut(lane) {
            record.info.state = LaneState::Running;
        }
    }

    /// Records the terminal state unless the lane already left the active set
    /// (a kill or the body's own exit got there first).
    pub(crate) fn finish(&self, lane: &LaneId, outcome: LaneState) -> bool {
        let mut lanes = self.lanes.lock();
        if lanes.active.remove(lane).is_none() {
            return false;
        }
        self.push_history(&mut lanes, lane.clone(), outcome);
        true
    }

    /// Removes the lane and cancels its task. Returns false for unknown or
    /// already finished lanes.
    pub(crate) fn kill(&self, lane: &LaneId) -> bool {
        let mut lanes = self.lanes.lock();
        let Some(record) = lanes.active.remove(lane) else {
            return false;
        };
        record.abort.abort();
        self.push_history(&mut lanes, lane.clone(), LaneState::Killed);
        true
    }

    pub(crate) fn kill_all(&self) -> usize {
        let mut lanes = self.lanes.lock();
        lanes.closed = true;
        let drained: Vec<_> = lanes.active.drain().collect();
        let count = drained.len();
        for (id, record) in drained {
            record.abort.abort();
            self.push_history(&mut lanes, id, LaneState::Killed);
        }
        count
    }

    pub(crate) fn set_policy(&self, lane: &LaneId, policy: LanePolicy) -> bool {
        match self.lanes.lock().active.get_mut(lane) {
            Some(record) => {
                record.info.policy = policy;
                true
            }
            None => false,
        }
    }

    pub(crate) fn info(&self, lane: &LaneId) -> Option<LaneInfo> {
        self.lanes.lock().active.get(lane).map(|r| r.info.clone())
    }

    pub(crate) fn state(&self, lane: &LaneId) -> Option<LaneState> {
        let lanes = self.lanes.lock();
        if let Some(record) = lanes.active.get(lane) {
            return Some(record.info.state);
        }
        lanes
            .finished
            .iter()
            .rev()
            .find(|(id, _)| id == lane)
            .map(|(_, state)| *state)
    }

    pub(crate) fn is_active(&self, lane: &LaneId) -> bool {
        self.lanes.lock().active.contains_key(lane)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.lanes.lock().active.len()
    }

    pub(crate) fn list(&self) -> Vec<LaneInfo> {
        self.lanes
            .lock()
            .active
            .values()
            .map(|r| r.info.clone())
            .collect()
    }

    fn push_history(&self, lanes: &mut Lanes, lane: LaneId, state: LaneState) {
        if self.history_limit == 0 {
            return;
        }
        while lanes.finished.len() >= self.history_limit {
            lanes.finished.pop_front();
        }
        lanes.finished.push_back((lane, state));
    }
}

/// Handed to every lane body. Calls made through it are checked against the
/// lane's domain.
#[derive(Clone)]
pub struct LaneContext {
    lane: LaneId,
    domain: Option<DomainId>,
    substrate: Substrate,
}

impl std::fmt::Debug for LaneContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneContext")
            .field("lane", &self.lane)
            .field("domain", &self.domain)
            .finish()
    }
}

impl LaneContext {
    pub(crate) fn new(lane: LaneId, domain: Option<DomainId>, substrate: Substrate) -> Self {
        Self {
            lane,
            domain,
            substrate,
        }
    }

    pub fn lane_id(&self) -> &LaneId {
        &self.lane
    }

    pub fn domain(&self) -> Option<&DomainId> {
        self.domain.as_ref()
    }

    pub fn substrate(&self) -> &Substrate {
        &self.substrate
    }

    pub fn now_nanos(&self) -> u64 {
        self.substrate.clock_now_nanos()
    }

    pub async fn sleep_nanos(&self, nanos: i64) {
        self.substrate.lane_sleep_nanos(&self.lane, nanos).await;
    }

    pub async fn sleep(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.sleep_nanos(nanos).await;
    }

    pub async fn sleep_until_nanos(&self, t_nanos: u64) {
        self.substrate.clock_sleep_until_nanos(t_nanos).await;
    }

    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        meta: EventMeta,
    ) -> SubstrateResult<EventId> {
        self.substrate
            .event_publish(self.domain(), topic, payload, QoS::BestEffort, meta)
    }

    pub fn subscribe(&self, prefix: &str, filter: Option<&str>) -> SubstrateResult<SubId> {
        self.substrate.event_subscribe(self.domain(), prefix, filter)
    }

    pub async fn wait(
        &self,
        sub: &SubId,
        timeout: Option<Duration>,
    ) -> SubstrateResult<Option<Event>> {
        self.substrate.event_wait(self.domain(), sub, timeout).await
    }

    pub fn state_map(&self, name: &str, size: usize, perms: Perms) -> SubstrateResult<StateHandle> {
        self.substrate.state_map(self.domain(), name, size, perms)
    }

    pub fn state_read(
        &self,
        handle: &StateHandle,
        offset: usize,
        len: usize,
    ) -> SubstrateResult<Vec<u8>> {
        self.substrate.state_read(self.domain(), handle, offset, len)
    }

    pub fn state_write(&self, handle: &StateHandle, offset: usize, data: &[u8]) -> SubstrateResult<()> {
        self.substrate.state_write(self.domain(), handle, offset, data)
    }

    pub fn assoc_put(&self, space: &str, key: &str, value: AssocValue) -> SubstrateResult<()> {
        self.substrate.assoc_put(self.domain(), space, key, value)
    }

    pub fn assoc_get(&self, space: &str, key: &str) -> SubstrateResult<Option<AssocValue>> {
        self.substrate.assoc_get(self.domain(), space, key)
    }

    pub fn assoc_query(&self, space: &str, query: &AssocQuery) -> SubstrateResult<Vec<AssocResult>> {
        self.substrate.assoc_query(self.domain(), space, query)
    }

    pub fn assoc_forget(&self, space: &str, key_or_policy: &str) -> SubstrateResult<()> {
        self.substrate.assoc_forget(self.domain(), space, key_or_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &LaneId) -> LaneInfo {
        LaneInfo {
            id: id.clone(),
            domain: None,
            entrypoint: "test".into(),
            policy: LanePolicy::default(),
            state: LaneState::Spawned,
        }
    }

    #[tokio::test]
    async fn table_tracks_transitions() {
        let table = LaneTable::new(2);
        let task = tokio::spawn(std::future::pending::<()>());
        let id = LaneId::generate();
        table.try_insert(info(&id), task.abort_handle(), None).unwrap();

        assert_eq!(table.state(&id), Some(LaneState::Spawned));
        table.mark_running(&id);
        assert_eq!(table.state(&id), Some(LaneState::Running));

        assert!(table.kill(&id));
        assert!(!table.kill(&id));
        assert!(!table.finish(&id, LaneState::Completed));
        assert_eq!(table.state(&id), Some(LaneState::Killed));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let table = LaneTable::new(2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let task = tokio::spawn(async {});
            let id = LaneId::generate();
            table.try_insert(info(&id), task.abort_handle(), None).unwrap();
            assert!(table.finish(&id, LaneState::Completed));
            ids.push(id);
        }
        assert_eq!(table.state(&ids[0]), None);
        assert_eq!(table.state(&ids[2]), Some(LaneState::Completed));
        assert_eq!(table.active_count(), 0);
    }

    #[tokio::test]
    async fn admission_respects_cap_and_close() {
        let table = LaneTable::new(8);
        let task = tokio::spawn(std::future::pending::<()>());
        let first = LaneId::generate();
        table
            .try_insert(info(&first), task.abort_handle(), Some(1))
            .unwrap();
        let second = LaneId::generate();
        assert!(matches!(
            table.try_insert(info(&second), task.abort_handle(), Some(1)),
            Err(SubstrateError::LaneLimit { max: 1 })
        ));
        assert_eq!(table.active_count(), 1);

        assert_eq!(table.kill_all(), 1);
        assert!(matches!(
            table.try_insert(info(&second), task.abort_handle(), None),
            Err(SubstrateError::ShutDown)
        ));
        assert_eq!(table.active_count(), 0);
        assert_eq!(table.state(&first), Some(LaneState::Killed));
    }

    #[tokio::test]
    async fn finished_lanes_cannot_be_killed() {
        let table = LaneTable::new(8);
        let task = tokio::spawn(async {});
        let id = LaneId::generate();
        table.try_insert(info(&id), task.abort_handle(), None).unwrap();
        assert!(table.finish(&id, LaneState::Completed));
        assert!(!table.kill(&id));
        assert_eq!(table.state(&id), Some(LaneState::Completed));
    }

    #[test]
    fn terminal_states() {
        assert!(!LaneState::Spawned.is_terminal());
        assert!(!LaneState::Running.is_terminal());
        assert!(LaneState::Completed.is_terminal());
        assert!(LaneState::Killed.is_terminal());
        assert!(LaneState::Failed.is_terminal());
    }
}

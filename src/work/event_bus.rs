// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Node-local rendezvous between inbound fragment-initialization messages,
//! arriving data streams, and the per-query status listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::common::error::ExecError;
use crate::common::ids::{FragmentHandle, QueryId};
use crate::proto;

// Cancellation races with inbound traffic: after a fragment is torn down,
// peers may still send data or status for it. Handles linger here so such
// late messages are dropped instead of tripping a missing-setup error.
const RECENTLY_FINISHED_TTL: Duration = Duration::from_secs(600);
const RECENTLY_FINISHED_MAX_SIZE: usize = 10_000;

/// Receives status updates for all fragments of one query. At most one
/// listener per query is registered on the bus.
pub trait FragmentStatusListener: Send + Sync {
    fn status_update(&self, status: proto::FragmentStatus);
}

/// Per-fragment manager registered while a fragment on this node waits for
/// its inputs.
pub trait FragmentManager: Send + Sync + std::fmt::Debug {
    fn handle(&self) -> FragmentHandle;
    fn is_waiting(&self) -> bool;
    fn cancel(&self);
}

#[derive(Default)]
pub struct WorkEventBus {
    managers: Mutex<HashMap<FragmentHandle, Arc<dyn FragmentManager>>>,
    listeners: Mutex<HashMap<QueryId, Arc<dyn FragmentStatusListener>>>,
    recently_finished: Mutex<HashMap<FragmentHandle, Instant>>,
}

fn cleanup_recently_finished_locked(entries: &mut HashMap<FragmentHandle, Instant>, now: Instant) {
    entries.retain(|_, ts| now.duration_since(*ts) <= RECENTLY_FINISHED_TTL);
    if entries.len() > RECENTLY_FINISHED_MAX_SIZE {
        entries.clear();
    }
}

impl WorkEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_listener(
        &self,
        query_id: QueryId,
        listener: Arc<dyn FragmentStatusListener>,
    ) -> Result<(), ExecError> {
        debug!("adding fragment status listener for query {}", query_id);
        let mut guard = self.listeners.lock().expect("listeners lock");
        if guard.contains_key(&query_id) {
            return Err(ExecError::DuplicateListener(query_id));
        }
        guard.insert(query_id, listener);
        Ok(())
    }

    pub fn unregister_listener(&self, query_id: QueryId) {
        debug!("removing fragment status listener for query {}", query_id);
        let mut guard = self.listeners.lock().expect("listeners lock");
        guard.remove(&query_id);
    }

    /// Routes a fragment status to its query's listener. If no listener is
    /// registered the message is logged and dropped; the query is already
    /// finished or was never coordinated here.
    pub fn deliver_status(&self, status: proto::FragmentStatus) {
        let Some(handle) = proto::core_handle(status.handle.as_ref()) else {
            warn!("fragment status arrived without a handle, dropping");
            return;
        };
        let listener = {
            let guard = self.listeners.lock().expect("listeners lock");
            guard.get(&handle.query_id).cloned()
        };
        match listener {
            Some(listener) => listener.status_update(status),
            None => warn!(
                "fragment status for {} arrived but no listener is registered, dropping",
                handle
            ),
        }
    }

    pub fn register_manager(&self, manager: Arc<dyn FragmentManager>) -> Result<(), ExecError> {
        let handle = manager.handle();
        debug!("manager created: {}", handle);
        let mut guard = self.managers.lock().expect("managers lock");
        if guard.contains_key(&handle) {
            return Err(ExecError::DuplicateManager(handle));
        }
        guard.insert(handle, manager);
        Ok(())
    }

    pub fn lookup_manager_optional(&self, handle: FragmentHandle) -> Option<Arc<dyn FragmentManager>> {
        let guard = self.managers.lock().expect("managers lock");
        guard.get(&handle).cloned()
    }

    /// Resolves the manager an inbound message is addressed to. A handle in
    /// the recently-finished set means the message must be discarded
    /// (`Ok(None)`). A missing manager otherwise is a protocol error:
    /// non-leaf fragments are sent first, so the manager must be present by
    /// the time anything refers to it.
    pub fn lookup_manager(
        &self,
        handle: FragmentHandle,
    ) -> Result<Option<Arc<dyn FragmentManager>>, ExecError> {
        if self.recently_finished_contains(handle) {
            debug!("fragment {} was recently finished, ignoring message", handle);
            return Ok(None);
        }
        if let Some(manager) = self.lookup_manager_optional(handle) {
            return Ok(Some(manager));
        }
        Err(ExecError::fragment_setup(format!(
            "failed to receive plan fragment that was required for id {}",
            handle
        )))
    }

    /// Retires a fragment. The tombstone is inserted before the manager is
    /// removed so a concurrent `lookup_manager` can never observe the
    /// absence without the tombstone and conclude setup has not happened
    /// yet. A no-op for handles that were never registered.
    pub fn remove_manager(&self, handle: FragmentHandle) {
        debug!("removing fragment manager: {}", handle);
        {
            let now = Instant::now();
            let mut recent = self.recently_finished.lock().expect("recently finished lock");
            cleanup_recently_finished_locked(&mut recent, now);
            recent.insert(handle, now);
        }
        let mut guard = self.managers.lock().expect("managers lock");
        guard.remove(&handle);
    }

    fn recently_finished_contains(&self, handle: FragmentHandle) -> bool {
        let now = Instant::now();
        let mut recent = self.recently_finished.lock().expect("recently finished lock");
        cleanup_recently_finished_locked(&mut recent, now);
        recent.contains_key(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingListener {
        statuses: StdMutex<Vec<proto::FragmentStatus>>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                statuses: StdMutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.statuses.lock().expect("lock").len()
        }
    }

    impl FragmentStatusListener for RecordingListener {
        fn status_update(&self, status: proto::FragmentStatus) {
            self.statuses.lock().expect("lock").push(status);
        }
    }

    #[derive(Debug)]
    struct StubManager {
        handle: FragmentHandle,
    }

    impl FragmentManager for StubManager {
        fn handle(&self) -> FragmentHandle {
            self.handle
        }
        fn is_waiting(&self) -> bool {
            true
        }
        fn cancel(&self) {}
    }

    fn handle(lo: i64, major: i32, minor: i32) -> FragmentHandle {
        FragmentHandle::new(QueryId::new(0, lo), major, minor)
    }

    fn status_for(h: FragmentHandle) -> proto::FragmentStatus {
        proto::FragmentStatus {
            handle: Some(h.into()),
            state: proto::FragmentState::Running as i32,
            error_message: String::new(),
        }
    }

    #[test]
    fn duplicate_listener_registration_fails_and_keeps_original() {
        let bus = WorkEventBus::new();
        let query_id = QueryId::new(0, 1);
        let original = RecordingListener::new();
        let other = RecordingListener::new();
        bus.register_listener(query_id, original.clone()).expect("first");
        let err = bus
            .register_listener(query_id, other.clone())
            .expect_err("second must fail");
        assert!(matches!(err, ExecError::DuplicateListener(_)));

        bus.deliver_status(status_for(handle(1, 0, 0)));
        assert_eq!(original.count(), 1, "original listener stays active");
        assert_eq!(other.count(), 0);
    }

    #[test]
    fn status_without_listener_is_dropped() {
        let bus = WorkEventBus::new();
        bus.deliver_status(status_for(handle(9, 0, 0)));
    }

    #[test]
    fn unregister_listener_is_idempotent() {
        let bus = WorkEventBus::new();
        let query_id = QueryId::new(0, 2);
        bus.register_listener(query_id, RecordingListener::new())
            .expect("register");
        bus.unregister_listener(query_id);
        bus.unregister_listener(query_id);
        bus.register_listener(query_id, RecordingListener::new())
            .expect("re-register after unregister");
    }

    #[test]
    fn duplicate_manager_registration_fails() {
        let bus = WorkEventBus::new();
        let h = handle(3, 1, 0);
        bus.register_manager(Arc::new(StubManager { handle: h }))
            .expect("first");
        let err = bus
            .register_manager(Arc::new(StubManager { handle: h }))
            .expect_err("second must fail");
        assert!(matches!(err, ExecError::DuplicateManager(_)));
    }

    #[test]
    fn lookup_of_unknown_manager_is_a_fragment_setup_error() {
        let bus = WorkEventBus::new();
        let err = bus.lookup_manager(handle(4, 0, 0)).expect_err("must fail");
        assert!(matches!(err, ExecError::FragmentSetup { .. }));
    }

    #[test]
    fn removed_manager_is_suppressed_not_errored() {
        let bus = WorkEventBus::new();
        let h = handle(5, 2, 1);
        bus.register_manager(Arc::new(StubManager { handle: h }))
            .expect("register");
        assert!(bus.lookup_manager(h).expect("registered").is_some());

        bus.remove_manager(h);
        assert!(bus.lookup_manager_optional(h).is_none());
        // Late messages for a recently finished fragment are discarded.
        assert!(bus.lookup_manager(h).expect("suppressed").is_none());
    }

    #[test]
    fn remove_of_unregistered_manager_is_a_noop() {
        let bus = WorkEventBus::new();
        bus.remove_manager(handle(6, 0, 0));
        // The handle still lands in the recently-finished set.
        assert!(bus.lookup_manager(handle(6, 0, 0)).expect("suppressed").is_none());
    }

    #[test]
    fn reregistration_after_removal_is_allowed() {
        let bus = WorkEventBus::new();
        let h = handle(7, 0, 0);
        bus.register_manager(Arc::new(StubManager { handle: h }))
            .expect("register");
        bus.remove_manager(h);
        bus.register_manager(Arc::new(StubManager { handle: h }))
            .expect("register again");
    }
}

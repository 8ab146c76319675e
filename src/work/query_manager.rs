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
//! Per-query fragment tracking and status aggregation.
//!
//! The QueryManager owns one tracker slot per fragment and collapses the
//! stream of fragment events into Foreman state transitions: a failed
//! fragment drives FAILED immediately; everything else waits until every
//! tracker is terminal and then picks CANCELED over COMPLETED if any
//! fragment was cancelled.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::common::error::ExecError;
use crate::common::ids::{Endpoint, FragmentHandle, QueryId};
use crate::coord::{NodeStatusListener, PersistentStore};
use crate::proto::{self, FragmentState, QueryState};
use crate::rpc::Controller;
use crate::work::event_bus::FragmentStatusListener;
use crate::work::foreman::StateListener;
use crate::work::fragment::FragmentExecutor;

struct FragmentData {
    endpoint: Option<Endpoint>,
    is_root: bool,
    state: FragmentState,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<FragmentHandle, FragmentData>,
    terminal: usize,
    first_failure: Option<String>,
    later_failures: Vec<String>,
    aggregate_fired: bool,
}

pub struct QueryManager {
    query_id: QueryId,
    store: Arc<dyn PersistentStore>,
    state_listener: Arc<StateListener>,
    inner: Mutex<Inner>,
    start_time_millis: Mutex<Option<i64>>,
    end_time_millis: Mutex<Option<i64>>,
    plan_text: Mutex<Option<String>>,
}

impl QueryManager {
    pub fn new(
        query_id: QueryId,
        store: Arc<dyn PersistentStore>,
        state_listener: Arc<StateListener>,
    ) -> Self {
        Self {
            query_id,
            store,
            state_listener,
            inner: Mutex::new(Inner::default()),
            start_time_millis: Mutex::new(None),
            end_time_millis: Mutex::new(None),
            plan_text: Mutex::new(None),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Registers a tracker slot for one fragment, initialized to "submitted".
    pub fn add_fragment_status_tracker(&self, fragment: &proto::PlanFragment, is_root: bool) {
        let Some(handle) = proto::core_handle(fragment.handle.as_ref()) else {
            warn!("plan fragment without a handle cannot be tracked");
            return;
        };
        let mut inner = self.inner.lock().expect("query manager lock");
        inner.slots.insert(
            handle,
            FragmentData {
                endpoint: fragment.assignment.as_ref().map(|a| a.to_core()),
                is_root,
                state: FragmentState::Sending,
            },
        );
    }

    /// Best-effort cancellation broadcast: one cancel RPC per still-running
    /// remote fragment, plus a direct cancel on the local root runner. Does
    /// not wait for anything.
    pub fn cancel_executing_fragments(
        &self,
        controller: &Arc<dyn Controller>,
        root_runner: Option<&Arc<dyn FragmentExecutor>>,
    ) {
        let targets: Vec<(FragmentHandle, Endpoint)> = {
            let inner = self.inner.lock().expect("query manager lock");
            inner
                .slots
                .iter()
                .filter(|(_, data)| !data.is_root && !data.state.is_terminal())
                .filter_map(|(handle, data)| {
                    data.endpoint.clone().map(|endpoint| (*handle, endpoint))
                })
                .collect()
        };
        debug!(
            "broadcasting cancel for {} fragment(s) of query {}",
            targets.len(),
            self.query_id
        );
        for (handle, endpoint) in targets {
            controller.tunnel(&endpoint).cancel_fragment(handle);
        }
        if let Some(runner) = root_runner {
            runner.cancel();
        }
    }

    /// Counts of fragments per state, for the end-of-query log line.
    pub fn fragment_states_summary(&self) -> String {
        let inner = self.inner.lock().expect("query manager lock");
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for data in inner.slots.values() {
            *counts.entry(format!("{:?}", data.state)).or_insert(0) += 1;
        }
        counts
            .iter()
            .map(|(state, n)| format!("{state}:{n}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Failure messages that arrived after the first one; attached to the
    /// final result as suppressed causes.
    pub fn suppressed_failures(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("query manager lock");
        inner.later_failures.clone()
    }

    pub fn mark_start_time(&self) {
        let mut guard = self.start_time_millis.lock().expect("time lock");
        *guard = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn mark_end_time(&self) {
        let mut guard = self.end_time_millis.lock().expect("time lock");
        *guard = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn elapsed_millis(&self) -> Option<i64> {
        let start = (*self.start_time_millis.lock().expect("time lock"))?;
        let end = (*self.end_time_millis.lock().expect("time lock"))?;
        Some(end - start)
    }

    pub fn set_plan_text(&self, text: String) {
        let mut guard = self.plan_text.lock().expect("plan text lock");
        *guard = Some(text);
    }

    pub fn plan_text(&self) -> Option<String> {
        self.plan_text.lock().expect("plan text lock").clone()
    }

    /// Persistence of a query state transition, surfacing the store error to
    /// the caller (the end-of-query cleanup suppresses-and-promotes it).
    pub fn try_update_query_state(&self, state: QueryState, error: Option<&str>) -> Result<(), String> {
        self.store.update_query_state(self.query_id, state, error)
    }

    /// Best-effort persistence of a query state transition.
    pub fn update_query_state_in_store(&self, state: QueryState, error: Option<&str>) {
        if let Err(e) = self.try_update_query_state(state, error) {
            warn!(
                "failure while persisting state {:?} for query {}: {}",
                state, self.query_id, e
            );
        }
    }
}

impl FragmentStatusListener for QueryManager {
    /// Applies one fragment status in arrival order. Terminal updates for an
    /// already-terminal slot are dropped, so each slot contributes exactly
    /// once to the aggregate.
    fn status_update(&self, status: proto::FragmentStatus) {
        let Some(handle) = proto::core_handle(status.handle.as_ref()) else {
            warn!("fragment status without a handle, dropping");
            return;
        };
        let new_state = status.state();

        let (fire_failed, fire_aggregate) = {
            let mut inner = self.inner.lock().expect("query manager lock");
            let Some(data) = inner.slots.get_mut(&handle) else {
                warn!("status update for untracked fragment {}, dropping", handle);
                return;
            };
            if data.state.is_terminal() {
                debug!(
                    "dropping {:?} update for already-terminal fragment {}",
                    new_state, handle
                );
                return;
            }
            data.state = new_state;
            if !new_state.is_terminal() {
                return;
            }

            inner.terminal += 1;
            let failed_message = (new_state == FragmentState::Failed).then(|| {
                if status.error_message.is_empty() {
                    format!("fragment {handle} failed")
                } else {
                    status.error_message.clone()
                }
            });
            if let Some(message) = &failed_message {
                if inner.first_failure.is_none() {
                    inner.first_failure = Some(message.clone());
                } else {
                    inner.later_failures.push(message.clone());
                }
            }

            let all_terminal = inner.terminal == inner.slots.len();
            let fire_aggregate = if all_terminal && !inner.aggregate_fired
                && failed_message.is_none()
            {
                inner.aggregate_fired = true;
                Some(if inner.first_failure.is_some() {
                    (
                        QueryState::Failed,
                        inner.first_failure.clone().map(ExecError::execution),
                    )
                } else if inner
                    .slots
                    .values()
                    .any(|d| d.state == FragmentState::Cancelled)
                {
                    (QueryState::Canceled, None)
                } else {
                    (QueryState::Completed, None)
                })
            } else {
                if all_terminal {
                    inner.aggregate_fired = true;
                }
                None
            };

            (failed_message, fire_aggregate)
        };

        // Transitions are requested outside the tracker lock; the Foreman's
        // own monitor orders them and drops anything after the terminal one.
        if let Some(message) = fire_failed {
            self.state_listener
                .move_to_state(QueryState::Failed, Some(ExecError::execution(message)));
        } else if let Some((state, cause)) = fire_aggregate {
            self.state_listener.move_to_state(state, cause);
        }
    }
}

impl NodeStatusListener for QueryManager {
    /// A dead endpoint fails every fragment assigned to it, locally, through
    /// the regular status path. An endpoint carrying no fragments of this
    /// query produces no state change.
    fn nodes_unregistered(&self, nodes: &[Endpoint]) {
        let affected: Vec<(FragmentHandle, Endpoint)> = {
            let inner = self.inner.lock().expect("query manager lock");
            inner
                .slots
                .iter()
                .filter(|(_, data)| !data.state.is_terminal())
                .filter_map(|(handle, data)| {
                    let endpoint = data.endpoint.as_ref()?;
                    nodes
                        .contains(endpoint)
                        .then(|| (*handle, endpoint.clone()))
                })
                .collect()
        };
        if affected.is_empty() {
            return;
        }
        warn!(
            "{} fragment(s) of query {} lost to dead node(s)",
            affected.len(),
            self.query_id
        );
        for (handle, endpoint) in affected {
            self.status_update(proto::FragmentStatus {
                handle: Some(handle.into()),
                state: FragmentState::Failed as i32,
                error_message: format!("endpoint {endpoint} unreachable"),
            });
        }
    }
}

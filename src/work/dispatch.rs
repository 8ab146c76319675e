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
//! Two-phase remote fragment submission.
//!
//! Intermediates go first, batched into one message per target endpoint,
//! behind a barrier: every response (success or failure) counts down a
//! latch, and the dispatcher waits for all of them before any leaf is sent.
//! The barrier guarantees intermediates are set up before leaves start
//! producing data. Leaves are then fire-and-forget.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use tracing::debug;

use crate::common::error::{ExecError, RpcError};
use crate::common::ids::Endpoint;
use crate::proto::{self, QueryState};
use crate::rpc::{Controller, RpcOutcomeListener};
use crate::work::foreman::StateListener;
use crate::work::query_manager::QueryManager;

/// Countdown barrier with uninterruptible wait semantics: waiters absorb
/// spurious wake-ups and keep waiting until the count reaches zero.
pub(crate) struct CountdownLatch {
    count: Mutex<usize>,
    cv: Condvar,
}

impl CountdownLatch {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn count_down(&self) {
        let mut count = self.count.lock().expect("latch lock");
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                self.cv.notify_all();
            }
        }
    }

    pub(crate) fn wait(&self) {
        let mut count = self.count.lock().expect("latch lock");
        while *count > 0 {
            count = self.cv.wait(count).expect("latch wait");
        }
    }
}

#[derive(Default)]
struct FragmentSubmitFailures {
    failures: Mutex<Vec<(Endpoint, RpcError)>>,
}

impl FragmentSubmitFailures {
    fn add(&self, endpoint: Endpoint, error: RpcError) {
        let mut guard = self.failures.lock().expect("failures lock");
        guard.push((endpoint, error));
    }

    fn first(&self) -> Option<(Endpoint, RpcError)> {
        let guard = self.failures.lock().expect("failures lock");
        guard.first().cloned()
    }
}

/// Outcome listener for one per-endpoint submission. During the intermediate
/// phase it counts the latch down on either outcome and records failures for
/// the barrier check. During the leaf phase there is no latch; a failure is
/// routed asynchronously into the Foreman state machine instead.
struct FragmentSubmitListener {
    endpoint: Endpoint,
    latch: Option<Arc<CountdownLatch>>,
    failures: Option<Arc<FragmentSubmitFailures>>,
    state_listener: Arc<StateListener>,
}

impl RpcOutcomeListener for FragmentSubmitListener {
    fn success(&self) {
        if let Some(latch) = &self.latch {
            latch.count_down();
        }
    }

    fn failed(&self, error: RpcError) {
        match (&self.latch, &self.failures) {
            (Some(latch), Some(failures)) => {
                failures.add(self.endpoint.clone(), error);
                latch.count_down();
            }
            _ => {
                debug!(
                    "failure while sending leaf fragments to {}, stopping query: {}",
                    self.endpoint, error
                );
                self.state_listener
                    .move_to_state(QueryState::Failed, Some(ExecError::Rpc(error)));
            }
        }
    }
}

pub struct FragmentDispatcher {
    controller: Arc<dyn Controller>,
    state_listener: Arc<StateListener>,
}

impl FragmentDispatcher {
    pub fn new(controller: Arc<dyn Controller>, state_listener: Arc<StateListener>) -> Self {
        Self {
            controller,
            state_listener,
        }
    }

    /// Submits all non-root fragments. Registers a tracker for each, then
    /// runs the intermediate barrier phase followed by the leaf phase.
    ///
    /// Leaves are not acknowledged: an endpoint that accepts the message but
    /// fails before emitting a first fragment status is only discovered
    /// through a node-down event.
    pub fn dispatch(
        &self,
        fragments: &[proto::PlanFragment],
        query_manager: &Arc<QueryManager>,
    ) -> Result<(), ExecError> {
        let mut intermediates: HashMap<Endpoint, Vec<proto::PlanFragment>> = HashMap::new();
        let mut leaves: HashMap<Endpoint, Vec<proto::PlanFragment>> = HashMap::new();

        for fragment in fragments {
            query_manager.add_fragment_status_tracker(fragment, false);
            let endpoint = fragment
                .assignment
                .as_ref()
                .map(|a| a.to_core())
                .ok_or_else(|| {
                    ExecError::foreman_setup(format!(
                        "remote plan fragment {:?} has no endpoint assignment",
                        fragment.handle
                    ))
                })?;
            let group = if fragment.leaf_fragment {
                &mut leaves
            } else {
                &mut intermediates
            };
            group.entry(endpoint).or_default().push(fragment.clone());
        }

        // Phase 1: intermediates behind the barrier. A leaf-only plan arms a
        // zero-width latch, which the wait falls straight through.
        let latch = Arc::new(CountdownLatch::new(intermediates.len()));
        let failures = Arc::new(FragmentSubmitFailures::default());
        for (endpoint, batch) in intermediates {
            self.send_remote_fragments(endpoint, batch, Some(&latch), Some(&failures));
        }
        latch.wait();

        if let Some((endpoint, cause)) = failures.first() {
            return Err(ExecError::foreman_setup(format!(
                "Error setting up remote intermediate fragment execution on {endpoint}: {cause}"
            )));
        }

        // Phase 2: leaves, not waited on.
        for (endpoint, batch) in leaves {
            self.send_remote_fragments(endpoint, batch, None, None);
        }
        Ok(())
    }

    /// One message per target endpoint, regardless of how many fragments run
    /// there.
    fn send_remote_fragments(
        &self,
        endpoint: Endpoint,
        fragments: Vec<proto::PlanFragment>,
        latch: Option<&Arc<CountdownLatch>>,
        failures: Option<&Arc<FragmentSubmitFailures>>,
    ) {
        debug!(
            "sending {} fragment(s) to node {}",
            fragments.len(),
            endpoint
        );
        let listener = FragmentSubmitListener {
            endpoint: endpoint.clone(),
            latch: latch.cloned(),
            failures: failures.cloned(),
            state_listener: self.state_listener.clone(),
        };
        let message = proto::InitializeFragments { fragments };
        self.controller
            .tunnel(&endpoint)
            .send_fragments(Box::new(listener), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn zero_width_latch_does_not_block() {
        let latch = CountdownLatch::new(0);
        latch.wait();
    }

    #[test]
    fn latch_waits_for_every_response() {
        let latch = Arc::new(CountdownLatch::new(3));
        for _ in 0..3 {
            let latch = latch.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                latch.count_down();
            });
        }
        latch.wait();
    }

    #[test]
    fn extra_count_downs_are_harmless() {
        let latch = CountdownLatch::new(1);
        latch.count_down();
        latch.count_down();
        latch.wait();
    }

    #[test]
    fn failure_path_counts_the_latch_down_too() {
        let latch = Arc::new(CountdownLatch::new(1));
        let failures = Arc::new(FragmentSubmitFailures::default());
        failures.add(
            Endpoint::new("deadhost", 31011),
            RpcError::new("connection refused"),
        );
        latch.count_down();
        latch.wait();
        let (endpoint, cause) = failures.first().expect("failure recorded");
        assert_eq!(endpoint.address, "deadhost");
        assert!(cause.message.contains("refused"));
    }
}

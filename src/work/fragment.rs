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
//! Root-fragment plumbing on the coordinator node: the fragment context
//! handed to the executor, the incoming-stream accounting, and the bus
//! manager that starts the root once its inputs are ready.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::common::error::ExecError;
use crate::common::ids::FragmentHandle;
use crate::proto;
use crate::rpc::{UserClientConnection, UserSession};
use crate::work::event_bus::FragmentManager;
use crate::work::WorkerPool;

/// Counts the remote streams that must connect before the root operator can
/// produce anything. A root with no remote inputs is done from the start.
pub struct IncomingBuffers {
    remaining: Mutex<usize>,
}

impl IncomingBuffers {
    pub fn new(remote_inputs: usize) -> Self {
        Self {
            remaining: Mutex::new(remote_inputs),
        }
    }

    pub fn is_done(&self) -> bool {
        *self.remaining.lock().expect("buffers lock") == 0
    }

    /// Records one connected stream; returns true when that was the last
    /// one outstanding.
    pub fn stream_arrived(&self) -> bool {
        let mut remaining = self.remaining.lock().expect("buffers lock");
        if *remaining > 0 {
            *remaining -= 1;
        }
        *remaining == 0
    }
}

/// Contextual state for executing one fragment. The coordination core only
/// builds this for the root fragment; the executor owns everything below it
/// (allocator, operator state, outbound tunnels).
pub struct FragmentContext {
    fragment: proto::PlanFragment,
    handle: FragmentHandle,
    session: UserSession,
    options: serde_json::Value,
    cancelled: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl FragmentContext {
    pub fn new(
        fragment: proto::PlanFragment,
        connection: &Arc<dyn UserClientConnection>,
    ) -> Result<Self, ExecError> {
        let handle = proto::core_handle(fragment.handle.as_ref()).ok_or_else(|| {
            ExecError::foreman_setup("root plan fragment carries no fragment handle")
        })?;
        let options = if fragment.options_json.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&fragment.options_json).map_err(|e| {
                ExecError::foreman_setup(format!("failure while reading plan options: {e}"))
            })?
        };
        Ok(Self {
            handle,
            session: connection.session(),
            options,
            cancelled: AtomicBool::new(false),
            failure: Mutex::new(None),
            fragment,
        })
    }

    pub fn handle(&self) -> FragmentHandle {
        self.handle
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    pub fn mem_initial(&self) -> i64 {
        self.fragment.mem_initial
    }

    pub fn mem_max(&self) -> i64 {
        self.fragment.mem_max
    }

    pub fn query_start_time(&self) -> i64 {
        self.fragment.query_start_time
    }

    pub fn time_zone(&self) -> &str {
        &self.fragment.time_zone
    }

    /// Long-running operators poll this so cooperative cancellation is
    /// observed between batches.
    pub fn should_continue(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire) && self.failure.lock().expect("failure lock").is_none()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn fail(&self, message: impl Into<String>) {
        let mut failure = self.failure.lock().expect("failure lock");
        if failure.is_none() {
            *failure = Some(message.into());
        }
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().expect("failure lock").clone()
    }
}

/// Executes one fragment's operator tree. Implementations report progress
/// and the terminal state through the status listener they were built with.
///
/// `cancel` must only signal: the executor observes the signal and reports
/// its terminal status from its own thread. Reporting synchronously from
/// inside `cancel` would re-enter the caller's state machine.
pub trait FragmentExecutor: Send + Sync {
    fn handle(&self) -> FragmentHandle;
    fn run(&self);
    fn cancel(&self);
    fn should_continue(&self) -> bool;
}

/// Builds the root fragment executor. The per-fragment executor internals
/// live outside the coordination core; this is the seam they are injected
/// through.
pub trait ExecutorFactory: Send + Sync {
    fn build_root(
        &self,
        context: Arc<FragmentContext>,
        root_operator: Arc<crate::plan::OperatorTree>,
        status_listener: Arc<dyn crate::work::event_bus::FragmentStatusListener>,
    ) -> Result<Arc<dyn FragmentExecutor>, ExecError>;
}

/// Bus-registered manager for the root fragment while it waits on remote
/// input streams. Once the last stream connects, the runner is submitted to
/// the worker pool.
pub struct RootFragmentManager {
    handle: FragmentHandle,
    buffers: IncomingBuffers,
    runner: Arc<dyn FragmentExecutor>,
    pool: Arc<dyn WorkerPool>,
    started: AtomicBool,
}

impl RootFragmentManager {
    pub fn new(
        handle: FragmentHandle,
        buffers: IncomingBuffers,
        runner: Arc<dyn FragmentExecutor>,
        pool: Arc<dyn WorkerPool>,
    ) -> Self {
        Self {
            handle,
            buffers,
            runner,
            pool,
            started: AtomicBool::new(false),
        }
    }

    /// Submits the root runner to the worker pool, once.
    pub fn submit(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("submitting root fragment runner for {}", self.handle);
        let runner = self.runner.clone();
        self.pool.submit(Box::new(move || runner.run()));
    }

    /// Called as remote input streams connect; starts the root when the last
    /// one arrives.
    pub fn stream_arrived(&self) {
        if self.buffers.stream_arrived() {
            self.submit();
        }
    }
}

impl std::fmt::Debug for RootFragmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootFragmentManager")
            .field("handle", &self.handle)
            .finish()
    }
}

impl FragmentManager for RootFragmentManager {
    fn handle(&self) -> FragmentHandle {
        self.handle
    }

    fn is_waiting(&self) -> bool {
        !self.buffers.is_done()
    }

    fn cancel(&self) {
        self.runner.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::QueryId;
    use std::sync::mpsc;

    struct CountingExecutor {
        handle: FragmentHandle,
        runs: mpsc::Sender<()>,
    }

    impl FragmentExecutor for CountingExecutor {
        fn handle(&self) -> FragmentHandle {
            self.handle
        }
        fn run(&self) {
            self.runs.send(()).expect("send");
        }
        fn cancel(&self) {}
        fn should_continue(&self) -> bool {
            true
        }
    }

    #[test]
    fn incoming_buffers_count_down_to_done() {
        let buffers = IncomingBuffers::new(2);
        assert!(!buffers.is_done());
        assert!(!buffers.stream_arrived());
        assert!(buffers.stream_arrived());
        assert!(buffers.is_done());
        // Extra arrivals stay done.
        assert!(buffers.stream_arrived());
    }

    #[test]
    fn root_manager_starts_once_all_streams_arrive() {
        let (tx, rx) = mpsc::channel();
        let handle = FragmentHandle::new(QueryId::new(0, 1), 0, 0);
        let manager = RootFragmentManager::new(
            handle,
            IncomingBuffers::new(2),
            Arc::new(CountingExecutor { handle, runs: tx }),
            Arc::new(crate::work::SpawnPool),
        );
        assert!(manager.is_waiting());
        manager.stream_arrived();
        assert!(rx.try_recv().is_err(), "must not start early");
        manager.stream_arrived();
        rx.recv_timeout(std::time::Duration::from_secs(5))
            .expect("root runner started");
        // A duplicate arrival must not start a second run.
        manager.stream_arrived();
        assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
    }
}

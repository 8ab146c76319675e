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
//! The Foreman drives all fragments (local and remote) for a single query
//! where this node is the coordinating one.
//!
//! The flow: the Foreman is submitted to a worker; `run()` plans the query,
//! acquires admission, sends out the fragments and moves PENDING to RUNNING.
//! `run()` completing is not the end of the Foreman's role: it stays around
//! receiving fragment status events through the QueryManager until the query
//! completes, fails, or is cancelled, at which point the staged ForemanResult
//! is closed exactly once and the final result goes back to the client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};

use tracing::{debug, info, warn};

use crate::work::event_bus::FragmentManager;

use crate::common::error::ExecError;
use crate::common::ids::QueryId;
use crate::common::logging::current_thread_id;
use crate::coord::{Lease, NodeStatusListener};
use crate::plan::{PhysicalPlan, QueryWorkUnit, ResultMode};
use crate::proto::{self, QueryState, QueryType};
use crate::rpc::{QueryWritableBatch, RpcOutcomeListener, UserClientConnection};
use crate::runtime::node_context::NodeContext;
use crate::runtime::query_context::QueryContext;
use crate::work::admission::AdmissionController;
use crate::work::dispatch::FragmentDispatcher;
use crate::work::fragment::{FragmentContext, FragmentExecutor, IncomingBuffers, RootFragmentManager};
use crate::work::query_manager::QueryManager;

const NO_OWNER: u64 = u64::MAX;

/// One-shot gate for externally-originated events. Opened only after the
/// initial `run()` completes (including after setup failures), so
/// asynchronous events cannot race with setup and hang on half-initialized
/// state. Threads blocked here are implicitly queued.
pub(crate) struct EventGate {
    opened: Mutex<bool>,
    cv: Condvar,
}

impl EventGate {
    fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut opened = self.opened.lock().expect("event gate lock");
        *opened = true;
        self.cv.notify_all();
    }

    /// Uninterruptible wait: spurious wake-ups resume waiting.
    fn await_open(&self) {
        let mut opened = self.opened.lock().expect("event gate lock");
        while !*opened {
            opened = self.cv.wait(opened).expect("event gate wait");
        }
    }
}

/// Gated access to the Foreman's state machine, handed to everything that
/// produces events from other threads (the QueryManager, submit listeners,
/// response listeners, external cancel calls). Holds a weak back-reference
/// so a finished Foreman can be dropped while late events are still in
/// flight.
pub struct StateListener {
    gate: Arc<EventGate>,
    foreman: OnceLock<Weak<Foreman>>,
}

impl StateListener {
    fn new(gate: Arc<EventGate>) -> Self {
        Self {
            gate,
            foreman: OnceLock::new(),
        }
    }

    fn bind(&self, foreman: Weak<Foreman>) {
        let _ = self.foreman.set(foreman);
    }

    pub fn move_to_state(&self, new_state: QueryState, cause: Option<ExecError>) {
        self.gate.await_open();
        match self.foreman.get().and_then(Weak::upgrade) {
            Some(foreman) => foreman.move_to_state(new_state, cause),
            None => debug!(
                "dropping state change request to {:?} for a released foreman",
                new_state
            ),
        }
    }
}

/// Listens for the outcome of the final result sent to the client. A send
/// failure (typically a client that disconnected before the response could
/// go out) is folded back into the state machine as FAILED.
struct ResponseSendListener {
    state_listener: Arc<StateListener>,
}

impl RpcOutcomeListener for ResponseSendListener {
    fn failed(&self, error: crate::common::error::RpcError) {
        info!(
            "failure while communicating the query result to the initiating client: {}",
            error
        );
        self.state_listener
            .move_to_state(QueryState::Failed, Some(ExecError::Rpc(error)));
    }
}

/// End-state processing for one query.
///
/// Even a query that appears to succeed must be reported as failed if
/// cleanup then goes wrong, so the result to send is staged first, cleanup
/// runs (possibly promoting the staged result to FAILED), and only then is
/// the result sent. Closing is the last thing the Foreman does, and happens
/// exactly once no matter how many terminal paths fire.
struct ForemanResult {
    query_id: QueryId,
    client: Arc<dyn UserClientConnection>,
    bus: Arc<crate::work::event_bus::WorkEventBus>,
    coordinator: Arc<dyn crate::coord::ClusterCoordinator>,
    query_manager: Arc<QueryManager>,
    query_context: Arc<QueryContext>,
    result_state: Option<QueryState>,
    result_error: Option<ExecError>,
    suppressed: Vec<String>,
    closed: bool,
}

impl ForemanResult {
    /// Stages a COMPLETED or CANCELED result. Cleanup steps executed at
    /// close may still change it to FAILED.
    fn set_completed(&mut self, state: QueryState) {
        assert!(matches!(state, QueryState::Completed | QueryState::Canceled));
        assert!(!self.closed);
        assert!(self.result_state.is_none());
        self.result_state = Some(state);
    }

    fn set_failed(&mut self, error: ExecError) {
        assert!(!self.closed);
        assert!(self.result_state.is_none());
        self.result_state = Some(QueryState::Failed);
        self.result_error = Some(error);
    }

    /// Attaches a failure that arrived while a result was already staged
    /// (a terminal failure during cancellation), promoting the staged state
    /// to FAILED. The first cause stays visible; later ones are suppressed.
    fn attach_failure_promoting(&mut self, error: ExecError) {
        assert!(!self.closed);
        if self.result_error.is_none() {
            self.result_error = Some(error);
        } else {
            self.suppressed.push(error.root_cause_message());
        }
        self.result_state = Some(QueryState::Failed);
    }

    /// Runs one cleanup step, accumulating a failure instead of aborting:
    /// the step's error is recorded, the result is promoted to FAILED, and
    /// later steps still run.
    fn suppressing_step(&mut self, step: impl FnOnce() -> Result<(), String>) {
        if let Err(message) = step() {
            self.result_state = Some(QueryState::Failed);
            if self.result_error.is_none() {
                self.result_error = Some(ExecError::execution(message.clone()));
            }
            self.suppressed.push(message);
        }
    }

    /// The exactly-once cleanup-and-respond sequence. Every step runs even
    /// when an earlier one fails; the lease release is attempted regardless
    /// of the outcome of the result send.
    fn close(
        &mut self,
        recorded_state: &mut QueryState,
        lease: &mut Option<Box<dyn Lease>>,
        response_listener: Box<dyn RpcOutcomeListener>,
    ) {
        assert!(!self.closed, "foreman result closed twice");
        assert!(self.result_state.is_some(), "result staged before close");

        info!(
            "foreman cleaning up query {} - fragment states: {}",
            self.query_id,
            self.query_manager.fragment_states_summary()
        );

        // Plain map removals; these cannot fail.
        self.bus.unregister_listener(self.query_id);
        let node_listener: Arc<dyn NodeStatusListener> = self.query_manager.clone();
        self.coordinator.remove_node_status_listener(&node_listener);

        let context = self.query_context.clone();
        self.suppressing_step(|| context.close());

        for message in self.query_manager.suppressed_failures() {
            self.suppressed.push(message);
        }

        // Persist the staged state if it differs from the last recorded one.
        // The recorded state is advanced first; a failing store write cannot
        // be re-recorded anyway.
        let staged = self.result_state.expect("staged result");
        if staged != *recorded_state {
            *recorded_state = staged;
            let query_manager = self.query_manager.clone();
            let error_text = self.result_error.as_ref().map(|e| e.root_cause_message());
            self.suppressing_step(move || {
                query_manager.try_update_query_state(staged, error_text.as_deref())
            });
        }

        let final_state = self.result_state.expect("staged result");
        let mut header = proto::QueryResult {
            query_id: Some(self.query_id.into()),
            query_state: final_state as i32,
            is_last_chunk: true,
            errors: Vec::new(),
        };
        if let Some(error) = &self.result_error {
            warn!("query {} failed: {}", self.query_id, error);
            header.errors.push(proto::PbError {
                message: error.root_cause_message(),
            });
        }
        for message in &self.suppressed {
            debug!("suppressed failure for query {}: {}", self.query_id, message);
        }

        // If the send fails there is no way to amend what was sent; the
        // outcome comes back through the response listener.
        self.client
            .send_result(response_listener, QueryWritableBatch::new(header), true);

        AdmissionController::release(lease);
        self.closed = true;
    }
}

struct ForemanInner {
    state: QueryState,
    lease: Option<Box<dyn Lease>>,
    root_runner: Option<Arc<dyn FragmentExecutor>>,
    result: ForemanResult,
}

pub struct Foreman {
    query_id: QueryId,
    query_request: proto::RunQuery,
    node: Arc<NodeContext>,
    client: Arc<dyn UserClientConnection>,
    query_context: Arc<QueryContext>,
    query_manager: Arc<QueryManager>,
    state_listener: Arc<StateListener>,
    gate: Arc<EventGate>,
    inner: Mutex<ForemanInner>,
    // Thread currently inside the state monitor; transitions requested from
    // within a transition can only target a terminal state and are dropped.
    monitor_owner: AtomicU64,
}

impl Foreman {
    /// Sets up the Foreman without initiating any execution.
    pub fn new(
        node: Arc<NodeContext>,
        client: Arc<dyn UserClientConnection>,
        query_id: QueryId,
        query_request: proto::RunQuery,
    ) -> Arc<Self> {
        let gate = Arc::new(EventGate::new());
        let state_listener = Arc::new(StateListener::new(gate.clone()));
        let query_context = Arc::new(QueryContext::new(query_id, client.session(), &node));
        let query_manager = Arc::new(QueryManager::new(
            query_id,
            node.store().clone(),
            state_listener.clone(),
        ));
        let result = ForemanResult {
            query_id,
            client: client.clone(),
            bus: node.work_bus().clone(),
            coordinator: node.coordinator().clone(),
            query_manager: query_manager.clone(),
            query_context: query_context.clone(),
            result_state: None,
            result_error: None,
            suppressed: Vec::new(),
            closed: false,
        };
        let foreman = Arc::new(Self {
            query_id,
            query_request,
            node,
            client,
            query_context,
            query_manager,
            state_listener: state_listener.clone(),
            gate,
            inner: Mutex::new(ForemanInner {
                state: QueryState::Pending,
                lease: None,
                root_runner: None,
                result,
            }),
            monitor_owner: AtomicU64::new(NO_OWNER),
        });
        foreman
            .query_manager
            .update_query_state_in_store(QueryState::Pending, None);
        state_listener.bind(Arc::downgrade(&foreman));
        foreman
    }

    /// Builds a Foreman and schedules its `run()` on the node's worker pool.
    pub fn submit(
        node: Arc<NodeContext>,
        client: Arc<dyn UserClientConnection>,
        query_id: QueryId,
        query_request: proto::RunQuery,
    ) -> Arc<Self> {
        let pool = node.worker_pool().clone();
        let foreman = Self::new(node, client, query_id, query_request);
        let runner = foreman.clone();
        pool.submit(Box::new(move || runner.run()));
        foreman
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn state(&self) -> QueryState {
        self.inner.lock().expect("foreman state lock").state
    }

    pub fn query_context(&self) -> &Arc<QueryContext> {
        &self.query_context
    }

    pub fn query_manager(&self) -> &Arc<QueryManager> {
        &self.query_manager
    }

    pub fn state_listener(&self) -> &Arc<StateListener> {
        &self.state_listener
    }

    /// Requests cancellation. Asynchronous: remote fragments take time to
    /// acknowledge, and the terminal CANCELED state is only reached once
    /// every tracker reports terminal. Safe to call any number of times and
    /// from any thread.
    pub fn cancel(&self) {
        self.state_listener
            .move_to_state(QueryState::CancellationRequested, None);
    }

    /// Query setup: planning, admission, fragment dispatch. Completion of
    /// this method is not the end of the Foreman's role in the query.
    pub fn run(&self) {
        self.query_manager.mark_start_time();
        let outcome = self.execute();
        if let Err(e) = outcome {
            self.move_to_state(QueryState::Failed, Some(e));
        }
        // Open the gate no matter how setup went; external events generated
        // by partial setup (submit listeners, cancel calls, the response
        // listener) would otherwise hang the threads delivering them.
        self.gate.open();
    }

    fn execute(&self) -> Result<(), ExecError> {
        let injector = self.node.injector().clone();
        injector.inject("run-try-beginning")?;

        let plan_text = self.query_request.plan.clone();
        match QueryType::try_from(self.query_request.r#type) {
            Ok(QueryType::Logical) => self.parse_and_run_logical_plan(&plan_text)?,
            Ok(QueryType::Physical) => self.parse_and_run_physical_plan(&plan_text)?,
            Ok(QueryType::Sql) => self.run_sql(&plan_text)?,
            Err(_) => {
                return Err(ExecError::foreman_setup(format!(
                    "unsupported query type {}",
                    self.query_request.r#type
                )));
            }
        }

        injector.inject("run-try-end")?;
        Ok(())
    }

    fn parse_and_run_logical_plan(&self, text: &str) -> Result<(), ExecError> {
        let logical = self
            .node
            .plan_reader()
            .read_logical_plan(text)
            .map_err(|e| ExecError::foreman_setup(format!("Failure parsing logical plan: {e}")))?;

        if logical.result_mode == ResultMode::Logical {
            return Err(ExecError::foreman_setup(
                "a LOGICAL result mode cannot be executed; request PHYSICAL or EXEC output",
            ));
        }
        let return_physical = logical.result_mode == ResultMode::Physical;

        let physical = self
            .node
            .optimizer()
            .optimize(logical, &self.query_context)
            .map_err(|e| {
                ExecError::foreman_setup(format!("Failure while converting logical plan: {e}"))
            })?;

        if return_physical {
            // The client asked for the lowered plan, not its rows: record the
            // plan text and run a direct plan that returns it.
            self.query_manager.set_plan_text(physical.unparse());
            return self.run_physical_plan(PhysicalPlan::direct());
        }
        self.run_physical_plan(physical)
    }

    fn parse_and_run_physical_plan(&self, text: &str) -> Result<(), ExecError> {
        let plan = self
            .node
            .plan_reader()
            .read_physical_plan(text)
            .map_err(|e| {
                ExecError::foreman_setup(format!("Failure while parsing physical plan: {e}"))
            })?;
        self.run_physical_plan(plan)
    }

    fn run_sql(&self, sql: &str) -> Result<(), ExecError> {
        let (plan, text_plan) = self
            .node
            .sql_worker()
            .plan(sql, &self.query_context)
            .map_err(|e| ExecError::foreman_setup(format!("Failure while planning query: {e}")))?;
        if let Some(text) = text_plan {
            self.query_manager.set_plan_text(text);
        }
        self.run_physical_plan(plan)
    }

    fn run_physical_plan(&self, mut plan: PhysicalPlan) -> Result<(), ExecError> {
        validate_plan(&plan)?;
        let options = self.query_context.options().clone();
        setup_memory_allocations(&mut plan, &options);

        let admission = AdmissionController::new(self.node.coordinator().clone());
        let lease = admission.admit(plan.total_cost(), &options.queue)?;
        {
            let mut inner = self.inner.lock().expect("foreman state lock");
            inner.lease = lease;
        }

        let endpoints = self.node.coordinator().endpoints();
        let work = self
            .node
            .parallelizer()
            .make_work_unit(&plan, &self.query_context, self.query_id, &endpoints)
            .map_err(|e| {
                ExecError::foreman_setup(format!("Failure while parallelizing query: {e}"))
            })?;

        let root_handle = proto::core_handle(work.root_fragment.handle.as_ref())
            .ok_or_else(|| ExecError::foreman_setup("root plan fragment carries no handle"))?;
        if root_handle.query_id != self.query_id {
            return Err(ExecError::foreman_setup(format!(
                "root fragment belongs to query {} but this foreman coordinates {}",
                root_handle.query_id, self.query_id
            )));
        }

        self.node
            .work_bus()
            .register_listener(self.query_id, self.query_manager.clone())?;
        self.node
            .coordinator()
            .add_node_status_listener(self.query_manager.clone());

        self.log_plan_fragments(&work);

        // The root goes first so its incoming buffers exist before any
        // remote fragment starts producing data.
        self.setup_root_fragment(&work, root_handle)?;

        let dispatcher =
            FragmentDispatcher::new(self.node.controller().clone(), self.state_listener.clone());
        dispatcher.dispatch(&work.fragments, &self.query_manager)?;

        self.move_to_state(QueryState::Running, None);
        debug!("fragments running for query {}", self.query_id);
        Ok(())
    }

    fn log_plan_fragments(&self, work: &QueryWorkUnit) {
        info!(
            "query {}: 1 root + {} remote fragment(s)",
            self.query_id,
            work.fragments.len()
        );
        for (index, fragment) in work.fragments.iter().enumerate() {
            let assignment = fragment
                .assignment
                .as_ref()
                .map(|a| a.to_core().to_string())
                .unwrap_or_else(|| "<unassigned>".to_string());
            debug!(
                "fragment {}/{}: handle={:?} leaf={} endpoint={}",
                index + 1,
                work.fragments.len(),
                fragment.handle,
                fragment.leaf_fragment,
                assignment
            );
        }
    }

    /// Sets up the locally-run root fragment. If the root has no remote
    /// inputs to wait on it is submitted to the worker pool immediately;
    /// otherwise its manager is parked on the work bus and the root starts
    /// when the incoming streams connect.
    fn setup_root_fragment(
        &self,
        work: &QueryWorkUnit,
        root_handle: crate::common::ids::FragmentHandle,
    ) -> Result<(), ExecError> {
        let root_context = Arc::new(FragmentContext::new(
            work.root_fragment.clone(),
            &self.client,
        )?);
        let buffers = IncomingBuffers::new(work.root_operator.remote_inputs);

        self.query_manager
            .add_fragment_status_tracker(&work.root_fragment, true);

        let runner = self.node.executor_factory().build_root(
            root_context,
            work.root_operator.clone(),
            self.query_manager.clone(),
        )?;
        {
            let mut inner = self.inner.lock().expect("foreman state lock");
            inner.root_runner = Some(runner.clone());
        }

        let manager = Arc::new(RootFragmentManager::new(
            root_handle,
            buffers,
            runner,
            self.node.worker_pool().clone(),
        ));
        if manager.is_waiting() {
            self.node.work_bus().register_manager(manager)?;
        } else {
            manager.submit();
        }
        Ok(())
    }

    /// The single entry point for state transitions; serializes them under
    /// one per-Foreman monitor so each query observes a total order.
    pub(crate) fn move_to_state(&self, new_state: QueryState, cause: Option<ExecError>) {
        let me = current_thread_id();
        if self.monitor_owner.load(Ordering::Acquire) == me {
            // A callback fired synchronously inside a transition (such as
            // the response listener failing during close). By then the
            // query is terminal; the request would be dropped regardless.
            warn!(
                "dropping re-entrant state change request to {:?} for query {}",
                new_state, self.query_id
            );
            return;
        }
        let mut inner = self.inner.lock().expect("foreman state lock");
        self.monitor_owner.store(me, Ordering::Release);
        self.transition_locked(&mut inner, new_state, cause);
        self.monitor_owner.store(NO_OWNER, Ordering::Release);
    }

    fn transition_locked(
        &self,
        inner: &mut ForemanInner,
        new_state: QueryState,
        cause: Option<ExecError>,
    ) {
        info!(
            "query {} state change requested: {:?} --> {:?}",
            self.query_id, inner.state, new_state
        );
        match inner.state {
            QueryState::Pending | QueryState::Running => {
                if inner.state == QueryState::Pending && new_state == QueryState::Running {
                    self.record_new_state(inner, QueryState::Running);
                    return;
                }
                match new_state {
                    QueryState::CancellationRequested => {
                        // Record the new state before cancelling fragments:
                        // the root runner's teardown feeds back through the
                        // status path.
                        self.query_manager.mark_end_time();
                        self.record_new_state(inner, QueryState::CancellationRequested);
                        self.query_manager
                            .cancel_executing_fragments(self.node.controller(), inner.root_runner.as_ref());
                        inner.result.set_completed(QueryState::Canceled);
                        // The result is not closed until every fragment has
                        // acknowledged; that arrives as a later transition.
                    }
                    QueryState::Completed => {
                        self.query_manager.mark_end_time();
                        self.record_new_state(inner, QueryState::Completed);
                        inner.result.set_completed(QueryState::Completed);
                        self.close_result(inner);
                    }
                    QueryState::Failed => {
                        let cause = cause.unwrap_or_else(|| {
                            ExecError::execution("query failed for an unknown reason")
                        });
                        self.query_manager.mark_end_time();
                        self.record_new_state(inner, QueryState::Failed);
                        self.query_manager
                            .cancel_executing_fragments(self.node.controller(), inner.root_runner.as_ref());
                        inner.result.set_failed(cause);
                        self.close_result(inner);
                    }
                    other => panic!(
                        "illegal state transition from {:?} to {:?}",
                        inner.state, other
                    ),
                }
            }
            QueryState::CancellationRequested => match new_state {
                QueryState::Canceled | QueryState::Completed => {
                    // Completion of the cancellation request's cleanup; the
                    // new kind collapses into the staged CANCELED outcome.
                    self.close_result(inner);
                }
                QueryState::Failed => {
                    let cause = cause.unwrap_or_else(|| {
                        ExecError::execution("query failed during cancellation")
                    });
                    inner.result.attach_failure_promoting(cause);
                    self.close_result(inner);
                }
                // Repeated cancellation requests are indistinguishable from
                // the first one.
                _ => {}
            },
            QueryState::Canceled | QueryState::Completed | QueryState::Failed => {
                warn!(
                    "dropping request to move to {:?} as query {} is already at terminal state {:?}",
                    new_state, self.query_id, inner.state
                );
            }
        }
    }

    fn record_new_state(&self, inner: &mut ForemanInner, state: QueryState) {
        inner.state = state;
        self.query_manager.update_query_state_in_store(state, None);
    }

    fn close_result(&self, inner: &mut ForemanInner) {
        let response_listener = Box::new(ResponseSendListener {
            state_listener: self.state_listener.clone(),
        });
        let ForemanInner {
            state,
            lease,
            result,
            ..
        } = inner;
        result.close(state, lease, response_listener);
    }
}

fn validate_plan(plan: &PhysicalPlan) -> Result<(), ExecError> {
    if plan.result_mode != ResultMode::Exec {
        return Err(ExecError::foreman_setup(format!(
            "Failure running plan: a result mode of {:?} was requested, but a physical plan can only be output as EXEC",
            plan.result_mode
        )));
    }
    Ok(())
}

/// Splits the per-node query memory budget across the buffering operators.
fn setup_memory_allocations(plan: &mut PhysicalPlan, options: &crate::common::config::ExecOptions) {
    let buffered = plan
        .sorted_operators()
        .iter()
        .filter(|op| op.buffered)
        .count() as i64;
    if buffered == 0 {
        return;
    }
    let width = options.width_max_per_node.max(1) as i64;
    let per_operator = (options.max_query_memory_per_node / (buffered * width)).max(1);
    debug!("max buffered operator allocation: {}", per_operator);
    for op in plan.sorted_operators_mut() {
        if op.buffered {
            op.max_allocation = Some(per_operator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::ExecOptions;
    use crate::plan::OperatorDesc;

    #[test]
    fn memory_budget_is_split_across_buffered_operators() {
        let mut plan = PhysicalPlan::new(
            ResultMode::Exec,
            vec![
                OperatorDesc::new(0, 1.0),
                OperatorDesc::new(1, 1.0).buffered(),
                OperatorDesc::new(2, 1.0).buffered(),
            ],
        );
        let options = ExecOptions {
            width_max_per_node: 4,
            max_query_memory_per_node: 800,
            ..ExecOptions::default()
        };
        setup_memory_allocations(&mut plan, &options);
        let ops = plan.sorted_operators();
        assert_eq!(ops[0].max_allocation, None);
        assert_eq!(ops[1].max_allocation, Some(100));
        assert_eq!(ops[2].max_allocation, Some(100));
    }

    #[test]
    fn non_exec_plans_are_rejected() {
        let plan = PhysicalPlan::new(ResultMode::Physical, vec![OperatorDesc::new(0, 1.0)]);
        let err = validate_plan(&plan).expect_err("must fail");
        assert!(matches!(err, ExecError::ForemanSetup { .. }));
    }
}

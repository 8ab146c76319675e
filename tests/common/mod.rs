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
//! Shared fakes for coordination-core integration tests: a recording control
//! plane, a capturing user connection, scripted root executors, and a fixed
//! parallelizer.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use auger::common::config::ExecOptions;
use auger::common::error::{ExecError, RpcError};
use auger::common::ids::{Endpoint, FragmentHandle, QueryId};
use auger::common::injector::ExecutionInjector;
use auger::coord::local::LocalClusterCoordinator;
use auger::coord::PersistentStore;
use auger::plan::{
    LogicalPlan, OperatorDesc, OperatorTree, Parallelizer, PhysicalOptimizer, PhysicalPlan,
    PlanReader, QueryWorkUnit, ResultMode, SqlWorker,
};
use auger::proto;
use auger::rpc::{
    ControlTunnel, Controller, QueryWritableBatch, RpcOutcomeListener, UserClientConnection,
    UserSession,
};
use auger::runtime::node_context::NodeContext;
use auger::runtime::query_context::QueryContext;
use auger::work::event_bus::FragmentStatusListener;
use auger::work::fragment::{ExecutorFactory, FragmentContext, FragmentExecutor};

pub const LOCAL_PORT: u16 = 31011;

pub fn local_endpoint() -> Endpoint {
    Endpoint::new("coordinator", LOCAL_PORT)
}

pub fn worker_endpoint(name: &str) -> Endpoint {
    Endpoint::new(name, LOCAL_PORT)
}

pub fn test_query_id(lo: i64) -> QueryId {
    QueryId::new(0x5151, lo)
}

pub fn sql_query(text: &str) -> proto::RunQuery {
    proto::RunQuery {
        r#type: proto::QueryType::Sql as i32,
        plan: text.to_string(),
    }
}

pub fn logical_query(text: &str) -> proto::RunQuery {
    proto::RunQuery {
        r#type: proto::QueryType::Logical as i32,
        plan: text.to_string(),
    }
}

pub fn physical_query(text: &str) -> proto::RunQuery {
    proto::RunQuery {
        r#type: proto::QueryType::Physical as i32,
        plan: text.to_string(),
    }
}

pub fn remote_handle(query_id: QueryId, major: i32) -> FragmentHandle {
    FragmentHandle::new(query_id, major, 0)
}

pub fn fragment_status(
    handle: FragmentHandle,
    state: proto::FragmentState,
    error: &str,
) -> proto::FragmentStatus {
    proto::FragmentStatus {
        handle: Some(handle.into()),
        state: state as i32,
        error_message: error.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Persistent store recording the full transition sequence.

#[derive(Default)]
pub struct RecordingStore {
    states: Mutex<Vec<(proto::QueryState, Option<String>)>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn states(&self) -> Vec<proto::QueryState> {
        self.states
            .lock()
            .expect("store lock")
            .iter()
            .map(|(s, _)| *s)
            .collect()
    }
}

impl PersistentStore for RecordingStore {
    fn update_query_state(
        &self,
        _query_id: QueryId,
        state: proto::QueryState,
        error: Option<&str>,
    ) -> Result<(), String> {
        let mut guard = self.states.lock().expect("store lock");
        guard.push((state, error.map(str::to_string)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// User connection capturing every result sent to the client.

#[derive(Default)]
pub struct CapturingClient {
    results: Mutex<Vec<(proto::QueryResult, bool)>>,
    cv: Condvar,
}

impl CapturingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn results(&self) -> Vec<(proto::QueryResult, bool)> {
        self.results.lock().expect("client lock").clone()
    }

    /// Waits until at least one result was sent and returns the first one.
    pub fn wait_for_result(&self, timeout: Duration) -> proto::QueryResult {
        let deadline = Instant::now() + timeout;
        let mut guard = self.results.lock().expect("client lock");
        while guard.is_empty() {
            let now = Instant::now();
            assert!(now < deadline, "no query result arrived within {timeout:?}");
            let (g, _) = self
                .cv
                .wait_timeout(guard, deadline - now)
                .expect("client wait");
            guard = g;
        }
        guard[0].0.clone()
    }
}

impl UserClientConnection for CapturingClient {
    fn session(&self) -> UserSession {
        UserSession::default()
    }

    fn send_result(
        &self,
        listener: Box<dyn RpcOutcomeListener>,
        batch: QueryWritableBatch,
        is_last: bool,
    ) {
        {
            let mut guard = self.results.lock().expect("client lock");
            guard.push((batch.header, is_last));
            self.cv.notify_all();
        }
        thread::spawn(move || listener.success());
    }
}

// ---------------------------------------------------------------------------
// Control plane recording sends and cancels, acking from its own threads.

#[derive(Default)]
struct ControllerState {
    failing: Mutex<HashSet<Endpoint>>,
    ack_delay: Mutex<HashMap<Endpoint, Duration>>,
    sends: Mutex<Vec<(Endpoint, proto::InitializeFragments)>>,
    cancels: Mutex<Vec<(Endpoint, FragmentHandle)>>,
    log: Mutex<Vec<String>>,
}

#[derive(Default)]
pub struct RecordingController {
    state: Arc<ControllerState>,
}

impl RecordingController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every subsequent send to this endpoint fails asynchronously.
    pub fn fail_endpoint(&self, endpoint: &Endpoint) {
        self.state
            .failing
            .lock()
            .expect("controller lock")
            .insert(endpoint.clone());
    }

    pub fn delay_ack(&self, endpoint: &Endpoint, delay: Duration) {
        self.state
            .ack_delay
            .lock()
            .expect("controller lock")
            .insert(endpoint.clone(), delay);
    }

    pub fn sends(&self) -> Vec<(Endpoint, proto::InitializeFragments)> {
        self.state.sends.lock().expect("controller lock").clone()
    }

    pub fn cancels(&self) -> Vec<(Endpoint, FragmentHandle)> {
        self.state.cancels.lock().expect("controller lock").clone()
    }

    /// Ordered event log: `send:<ep>:<kind>`, `ack:<ep>:<ok>`, `cancel:<ep>`.
    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().expect("controller lock").clone()
    }
}

impl Controller for RecordingController {
    fn tunnel(&self, endpoint: &Endpoint) -> Arc<dyn ControlTunnel> {
        Arc::new(RecordingTunnel {
            endpoint: endpoint.clone(),
            state: self.state.clone(),
        })
    }
}

struct RecordingTunnel {
    endpoint: Endpoint,
    state: Arc<ControllerState>,
}

impl ControlTunnel for RecordingTunnel {
    fn send_fragments(
        &self,
        listener: Box<dyn RpcOutcomeListener>,
        fragments: proto::InitializeFragments,
    ) {
        let kind = if fragments.fragments.iter().all(|f| f.leaf_fragment) {
            "leaf"
        } else {
            "intermediate"
        };
        let fail = {
            let guard = self.state.failing.lock().expect("controller lock");
            guard.contains(&self.endpoint)
        };
        let delay = {
            let guard = self.state.ack_delay.lock().expect("controller lock");
            guard.get(&self.endpoint).copied().unwrap_or(Duration::ZERO)
        };
        {
            let mut log = self.state.log.lock().expect("controller lock");
            log.push(format!("send:{}:{}", self.endpoint, kind));
        }
        {
            let mut sends = self.state.sends.lock().expect("controller lock");
            sends.push((self.endpoint.clone(), fragments));
        }

        let state = self.state.clone();
        let endpoint = self.endpoint.clone();
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            {
                let mut log = state.log.lock().expect("controller lock");
                log.push(format!("ack:{}:{}", endpoint, !fail));
            }
            if fail {
                listener.failed(RpcError::new(format!("connection to {endpoint} refused")));
            } else {
                listener.success();
            }
        });
    }

    fn cancel_fragment(&self, handle: FragmentHandle) {
        {
            let mut log = self.state.log.lock().expect("controller lock");
            log.push(format!("cancel:{}", self.endpoint));
        }
        let mut cancels = self.state.cancels.lock().expect("controller lock");
        cancels.push((self.endpoint.clone(), handle));
    }
}

// ---------------------------------------------------------------------------
// Scripted root executor.

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RootBehavior {
    /// Reports FINISHED as soon as the runner is scheduled.
    FinishOnRun,
    /// Idles until cancelled, then reports CANCELLED from its own thread.
    WaitForCancel,
}

pub struct ScriptedExecutorFactory {
    behavior: RootBehavior,
}

impl ScriptedExecutorFactory {
    pub fn new(behavior: RootBehavior) -> Arc<Self> {
        Arc::new(Self { behavior })
    }
}

impl ExecutorFactory for ScriptedExecutorFactory {
    fn build_root(
        &self,
        context: Arc<FragmentContext>,
        _root_operator: Arc<OperatorTree>,
        status_listener: Arc<dyn FragmentStatusListener>,
    ) -> Result<Arc<dyn FragmentExecutor>, ExecError> {
        Ok(Arc::new(ScriptedExecutor {
            behavior: self.behavior,
            listener: status_listener,
            context,
        }))
    }
}

struct ScriptedExecutor {
    behavior: RootBehavior,
    listener: Arc<dyn FragmentStatusListener>,
    context: Arc<FragmentContext>,
}

impl ScriptedExecutor {
    fn report(&self, state: proto::FragmentState, error: &str) {
        self.listener
            .status_update(fragment_status(self.context.handle(), state, error));
    }
}

impl FragmentExecutor for ScriptedExecutor {
    fn handle(&self) -> FragmentHandle {
        self.context.handle()
    }

    fn run(&self) {
        match self.behavior {
            RootBehavior::FinishOnRun => self.report(proto::FragmentState::Finished, ""),
            RootBehavior::WaitForCancel => {}
        }
    }

    fn cancel(&self) {
        self.context.cancel();
        let listener = self.listener.clone();
        let handle = self.context.handle();
        thread::spawn(move || {
            listener.status_update(fragment_status(
                handle,
                proto::FragmentState::Cancelled,
                "",
            ));
        });
    }

    fn should_continue(&self) -> bool {
        self.context.should_continue()
    }
}

// ---------------------------------------------------------------------------
// Fixed plan collaborators.

#[derive(Clone, Debug)]
pub struct RemoteFragment {
    pub endpoint: Endpoint,
    pub leaf: bool,
}

pub fn intermediate_on(name: &str) -> RemoteFragment {
    RemoteFragment {
        endpoint: worker_endpoint(name),
        leaf: false,
    }
}

pub fn leaf_on(name: &str) -> RemoteFragment {
    RemoteFragment {
        endpoint: worker_endpoint(name),
        leaf: true,
    }
}

pub fn plan_fragment(
    query_id: QueryId,
    major: i32,
    endpoint: Endpoint,
    leaf: bool,
) -> proto::PlanFragment {
    proto::PlanFragment {
        handle: Some(FragmentHandle::new(query_id, major, 0).into()),
        assignment: Some(endpoint.into()),
        leaf_fragment: leaf,
        fragment_json: "{}".to_string(),
        mem_initial: 1 << 20,
        mem_max: 1 << 30,
        query_start_time: 0,
        time_zone: "UTC".to_string(),
        options_json: String::new(),
    }
}

/// Parallelizer producing one root on the coordinator plus the configured
/// remote fragments; major fragment ids are assigned in order.
pub struct FixedParallelizer {
    remotes: Vec<RemoteFragment>,
}

impl FixedParallelizer {
    pub fn new(remotes: Vec<RemoteFragment>) -> Arc<Self> {
        Arc::new(Self { remotes })
    }
}

impl Parallelizer for FixedParallelizer {
    fn make_work_unit(
        &self,
        _plan: &PhysicalPlan,
        context: &QueryContext,
        query_id: QueryId,
        _endpoints: &[Endpoint],
    ) -> Result<QueryWorkUnit, String> {
        let root_fragment =
            plan_fragment(query_id, 0, context.current_endpoint().clone(), false);
        let fragments = self
            .remotes
            .iter()
            .enumerate()
            .map(|(i, remote)| {
                plan_fragment(query_id, (i + 1) as i32, remote.endpoint.clone(), remote.leaf)
            })
            .collect();
        Ok(QueryWorkUnit {
            root_fragment,
            root_operator: Arc::new(OperatorTree { remote_inputs: 0 }),
            fragments,
        })
    }
}

/// Plan reader with a fixed grammar: the logical result mode is embedded in
/// the plan text as `mode=logical` / `mode=physical` (EXEC otherwise), and
/// any physical plan text containing `garbage` fails to parse.
pub struct FixedPlanReader;

impl PlanReader for FixedPlanReader {
    fn read_logical_plan(&self, text: &str) -> Result<LogicalPlan, String> {
        let result_mode = if text.contains("mode=logical") {
            ResultMode::Logical
        } else if text.contains("mode=physical") {
            ResultMode::Physical
        } else {
            ResultMode::Exec
        };
        Ok(LogicalPlan {
            result_mode,
            json: text.to_string(),
        })
    }

    fn read_physical_plan(&self, text: &str) -> Result<PhysicalPlan, String> {
        if text.contains("garbage") {
            return Err("unrecognized plan text".to_string());
        }
        Ok(PhysicalPlan::new(
            ResultMode::Exec,
            vec![OperatorDesc::new(0, 1.0)],
        ))
    }
}

pub struct FixedOptimizer;

impl PhysicalOptimizer for FixedOptimizer {
    fn optimize(
        &self,
        _plan: LogicalPlan,
        _context: &QueryContext,
    ) -> Result<PhysicalPlan, String> {
        Ok(PhysicalPlan::new(
            ResultMode::Exec,
            vec![OperatorDesc::new(0, 1.0)],
        ))
    }
}

pub struct FixedSqlWorker {
    cost: f64,
}

impl FixedSqlWorker {
    pub fn new(cost: f64) -> Arc<Self> {
        Arc::new(Self { cost })
    }
}

impl SqlWorker for FixedSqlWorker {
    fn plan(
        &self,
        sql: &str,
        _context: &QueryContext,
    ) -> Result<(PhysicalPlan, Option<String>), String> {
        let plan = PhysicalPlan::new(ResultMode::Exec, vec![OperatorDesc::new(0, self.cost)]);
        Ok((plan, Some(format!("plan for: {sql}"))))
    }
}

// ---------------------------------------------------------------------------
// Cluster assembly.

pub struct TestCluster {
    pub node: Arc<NodeContext>,
    pub controller: Arc<RecordingController>,
    pub store: Arc<RecordingStore>,
    pub coordinator: Arc<LocalClusterCoordinator>,
}

pub struct TestClusterBuilder {
    remotes: Vec<RemoteFragment>,
    behavior: RootBehavior,
    options: ExecOptions,
    plan_cost: f64,
    injector: Option<Arc<dyn ExecutionInjector>>,
}

impl TestClusterBuilder {
    pub fn new() -> Self {
        Self {
            remotes: Vec::new(),
            behavior: RootBehavior::FinishOnRun,
            options: ExecOptions::default(),
            plan_cost: 10.0,
            injector: None,
        }
    }

    pub fn remotes(mut self, remotes: Vec<RemoteFragment>) -> Self {
        self.remotes = remotes;
        self
    }

    pub fn root_behavior(mut self, behavior: RootBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn plan_cost(mut self, cost: f64) -> Self {
        self.plan_cost = cost;
        self
    }

    pub fn injector(mut self, injector: Arc<dyn ExecutionInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn build(self) -> TestCluster {
        auger::auger_logging::init_with_level("warn");

        let mut endpoints = vec![local_endpoint()];
        for remote in &self.remotes {
            if !endpoints.contains(&remote.endpoint) {
                endpoints.push(remote.endpoint.clone());
            }
        }
        let coordinator = Arc::new(LocalClusterCoordinator::new(endpoints));
        let controller = RecordingController::new();
        let store = RecordingStore::new();

        let mut builder = NodeContext::builder(local_endpoint())
            .options(self.options)
            .coordinator(coordinator.clone())
            .controller(controller.clone())
            .store(store.clone())
            .plan_reader(Arc::new(FixedPlanReader))
            .optimizer(Arc::new(FixedOptimizer))
            .parallelizer(FixedParallelizer::new(self.remotes))
            .sql_worker(FixedSqlWorker::new(self.plan_cost))
            .executor_factory(ScriptedExecutorFactory::new(self.behavior));
        if let Some(injector) = self.injector {
            builder = builder.injector(injector);
        }

        TestCluster {
            node: builder.build(),
            controller,
            store,
            coordinator,
        }
    }
}

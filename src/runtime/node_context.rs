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
use std::sync::Arc;

use crate::common::config::ExecOptions;
use crate::common::error::ExecError;
use crate::common::ids::{Endpoint, QueryId};
use crate::common::injector::{ExecutionInjector, NoopInjector};
use crate::coord::local::LocalClusterCoordinator;
use crate::coord::{ClusterCoordinator, InMemoryStore, PersistentStore};
use crate::plan::{
    LogicalPlan, Parallelizer, PhysicalOptimizer, PhysicalPlan, PlanReader, QueryWorkUnit,
    SqlWorker,
};
use crate::rpc::control::GrpcController;
use crate::rpc::Controller;
use crate::runtime::query_context::QueryContext;
use crate::work::event_bus::WorkEventBus;
use crate::work::fragment::ExecutorFactory;
use crate::work::{SpawnPool, WorkerPool};

/// Per-process wiring hub: everything a Foreman needs to coordinate a query
/// on this node. Collaborator implementations are injected at assembly time;
/// the builder fills in the local/in-process defaults.
pub struct NodeContext {
    endpoint: Endpoint,
    options: ExecOptions,
    work_bus: Arc<WorkEventBus>,
    coordinator: Arc<dyn ClusterCoordinator>,
    controller: Arc<dyn Controller>,
    worker_pool: Arc<dyn WorkerPool>,
    store: Arc<dyn PersistentStore>,
    plan_reader: Arc<dyn PlanReader>,
    optimizer: Arc<dyn PhysicalOptimizer>,
    parallelizer: Arc<dyn Parallelizer>,
    sql_worker: Arc<dyn SqlWorker>,
    executor_factory: Arc<dyn ExecutorFactory>,
    injector: Arc<dyn ExecutionInjector>,
}

impl NodeContext {
    pub fn builder(endpoint: Endpoint) -> NodeContextBuilder {
        NodeContextBuilder {
            endpoint,
            options: None,
            work_bus: None,
            coordinator: None,
            controller: None,
            worker_pool: None,
            store: None,
            plan_reader: None,
            optimizer: None,
            parallelizer: None,
            sql_worker: None,
            executor_factory: None,
            injector: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn work_bus(&self) -> &Arc<WorkEventBus> {
        &self.work_bus
    }

    pub fn coordinator(&self) -> &Arc<dyn ClusterCoordinator> {
        &self.coordinator
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    pub fn worker_pool(&self) -> &Arc<dyn WorkerPool> {
        &self.worker_pool
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn plan_reader(&self) -> &Arc<dyn PlanReader> {
        &self.plan_reader
    }

    pub fn optimizer(&self) -> &Arc<dyn PhysicalOptimizer> {
        &self.optimizer
    }

    pub fn parallelizer(&self) -> &Arc<dyn Parallelizer> {
        &self.parallelizer
    }

    pub fn sql_worker(&self) -> &Arc<dyn SqlWorker> {
        &self.sql_worker
    }

    pub fn executor_factory(&self) -> &Arc<dyn ExecutorFactory> {
        &self.executor_factory
    }

    pub fn injector(&self) -> &Arc<dyn ExecutionInjector> {
        &self.injector
    }
}

pub struct NodeContextBuilder {
    endpoint: Endpoint,
    options: Option<ExecOptions>,
    work_bus: Option<Arc<WorkEventBus>>,
    coordinator: Option<Arc<dyn ClusterCoordinator>>,
    controller: Option<Arc<dyn Controller>>,
    worker_pool: Option<Arc<dyn WorkerPool>>,
    store: Option<Arc<dyn PersistentStore>>,
    plan_reader: Option<Arc<dyn PlanReader>>,
    optimizer: Option<Arc<dyn PhysicalOptimizer>>,
    parallelizer: Option<Arc<dyn Parallelizer>>,
    sql_worker: Option<Arc<dyn SqlWorker>>,
    executor_factory: Option<Arc<dyn ExecutorFactory>>,
    injector: Option<Arc<dyn ExecutionInjector>>,
}

impl NodeContextBuilder {
    pub fn options(mut self, options: ExecOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn coordinator(mut self, coordinator: Arc<dyn ClusterCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn controller(mut self, controller: Arc<dyn Controller>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.worker_pool = Some(pool);
        self
    }

    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn plan_reader(mut self, reader: Arc<dyn PlanReader>) -> Self {
        self.plan_reader = Some(reader);
        self
    }

    pub fn optimizer(mut self, optimizer: Arc<dyn PhysicalOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn parallelizer(mut self, parallelizer: Arc<dyn Parallelizer>) -> Self {
        self.parallelizer = Some(parallelizer);
        self
    }

    pub fn sql_worker(mut self, sql_worker: Arc<dyn SqlWorker>) -> Self {
        self.sql_worker = Some(sql_worker);
        self
    }

    pub fn executor_factory(mut self, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.executor_factory = Some(factory);
        self
    }

    pub fn injector(mut self, injector: Arc<dyn ExecutionInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn build(self) -> Arc<NodeContext> {
        let endpoint = self.endpoint;
        let not_configured = Arc::new(NotConfigured);
        let coordinator: Arc<dyn ClusterCoordinator> = match self.coordinator {
            Some(c) => c,
            None => Arc::new(LocalClusterCoordinator::new(vec![endpoint.clone()])),
        };
        let controller: Arc<dyn Controller> = match self.controller {
            Some(c) => c,
            None => Arc::new(GrpcController::new()),
        };
        let worker_pool: Arc<dyn WorkerPool> = match self.worker_pool {
            Some(p) => p,
            None => Arc::new(SpawnPool),
        };
        let store: Arc<dyn PersistentStore> = match self.store {
            Some(s) => s,
            None => Arc::new(InMemoryStore::new()),
        };
        let plan_reader: Arc<dyn PlanReader> = match self.plan_reader {
            Some(r) => r,
            None => not_configured.clone(),
        };
        let optimizer: Arc<dyn PhysicalOptimizer> = match self.optimizer {
            Some(o) => o,
            None => not_configured.clone(),
        };
        let parallelizer: Arc<dyn Parallelizer> = match self.parallelizer {
            Some(p) => p,
            None => not_configured.clone(),
        };
        let sql_worker: Arc<dyn SqlWorker> = match self.sql_worker {
            Some(w) => w,
            None => not_configured.clone(),
        };
        let executor_factory: Arc<dyn ExecutorFactory> = match self.executor_factory {
            Some(f) => f,
            None => not_configured,
        };
        let injector: Arc<dyn ExecutionInjector> = match self.injector {
            Some(i) => i,
            None => Arc::new(NoopInjector),
        };
        Arc::new(NodeContext {
            options: self.options.unwrap_or_else(ExecOptions::from_config),
            work_bus: self.work_bus.unwrap_or_default(),
            coordinator,
            controller,
            worker_pool,
            store,
            plan_reader,
            optimizer,
            parallelizer,
            sql_worker,
            executor_factory,
            injector,
            endpoint,
        })
    }
}

/// Placeholder for planner collaborators that were not wired in. Every call
/// fails, so a missing component is reported as a query setup failure rather
/// than a panic at assembly time.
struct NotConfigured;

impl PlanReader for NotConfigured {
    fn read_logical_plan(&self, _text: &str) -> Result<LogicalPlan, String> {
        Err("no plan reader configured on this node".to_string())
    }

    fn read_physical_plan(&self, _text: &str) -> Result<PhysicalPlan, String> {
        Err("no plan reader configured on this node".to_string())
    }
}

impl PhysicalOptimizer for NotConfigured {
    fn optimize(&self, _plan: LogicalPlan, _context: &QueryContext) -> Result<PhysicalPlan, String> {
        Err("no physical optimizer configured on this node".to_string())
    }
}

impl Parallelizer for NotConfigured {
    fn make_work_unit(
        &self,
        _plan: &PhysicalPlan,
        _context: &QueryContext,
        _query_id: QueryId,
        _endpoints: &[Endpoint],
    ) -> Result<QueryWorkUnit, String> {
        Err("no parallelizer configured on this node".to_string())
    }
}

impl SqlWorker for NotConfigured {
    fn plan(
        &self,
        _sql: &str,
        _context: &QueryContext,
    ) -> Result<(PhysicalPlan, Option<String>), String> {
        Err("no sql worker configured on this node".to_string())
    }
}

impl ExecutorFactory for NotConfigured {
    fn build_root(
        &self,
        _context: Arc<crate::work::fragment::FragmentContext>,
        _root_operator: Arc<crate::plan::OperatorTree>,
        _status_listener: Arc<dyn crate::work::event_bus::FragmentStatusListener>,
    ) -> Result<Arc<dyn crate::work::fragment::FragmentExecutor>, ExecError> {
        Err(ExecError::foreman_setup(
            "no executor factory configured on this node",
        ))
    }
}

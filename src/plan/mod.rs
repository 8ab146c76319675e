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
//! Planning collaborator surfaces.
//!
//! The coordination core consumes plans through these interfaces; SQL
//! parsing, optimization and parallelization are implemented elsewhere. The
//! plan representation kept here is the minimum the coordinator needs:
//! operator costs for admission, buffered-operator flags for memory budgets,
//! and the parallelized work unit.

use std::sync::Arc;

use serde::Serialize;

use crate::common::ids::{Endpoint, QueryId};
use crate::proto;
use crate::runtime::query_context::QueryContext;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ResultMode {
    Logical,
    Physical,
    Exec,
}

#[derive(Clone, Debug)]
pub struct LogicalPlan {
    pub result_mode: ResultMode,
    pub json: String,
}

/// One operator of a sorted physical plan, root first. `cost` feeds the
/// admission decision; `buffered` marks operators that hold query memory
/// (sorts, hash builds) and receive a per-operator allocation budget.
#[derive(Clone, Debug, Serialize)]
pub struct OperatorDesc {
    pub id: i32,
    pub cost: f64,
    pub buffered: bool,
    pub max_allocation: Option<i64>,
}

impl OperatorDesc {
    pub fn new(id: i32, cost: f64) -> Self {
        Self {
            id,
            cost,
            buffered: false,
            max_allocation: None,
        }
    }

    pub fn buffered(mut self) -> Self {
        self.buffered = true;
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PhysicalPlan {
    pub result_mode: ResultMode,
    operators: Vec<OperatorDesc>,
}

impl PhysicalPlan {
    pub fn new(result_mode: ResultMode, operators: Vec<OperatorDesc>) -> Self {
        Self {
            result_mode,
            operators,
        }
    }

    /// Plan wrapping a precomputed payload, used to return an explain text to
    /// the client through the regular execution path.
    pub fn direct() -> Self {
        Self {
            result_mode: ResultMode::Exec,
            operators: vec![OperatorDesc::new(0, 0.0)],
        }
    }

    pub fn sorted_operators(&self) -> &[OperatorDesc] {
        &self.operators
    }

    pub fn sorted_operators_mut(&mut self) -> &mut [OperatorDesc] {
        &mut self.operators
    }

    pub fn total_cost(&self) -> f64 {
        self.operators.iter().map(|op| op.cost).sum()
    }

    pub fn unparse(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "<<malformed plan>>".to_string())
    }
}

/// Opaque surface of the root operator tree. The coordinator only needs to
/// know how many remote streams feed the root, to decide whether the root
/// runner can start immediately.
#[derive(Clone, Debug, Default)]
pub struct OperatorTree {
    pub remote_inputs: usize,
}

/// Result of parallelization: the locally-run root fragment plus the remote
/// fragments with their endpoint assignments. The root handle's query id
/// must equal the submitting coordinator's query id.
#[derive(Clone, Debug)]
pub struct QueryWorkUnit {
    pub root_fragment: proto::PlanFragment,
    pub root_operator: Arc<OperatorTree>,
    pub fragments: Vec<proto::PlanFragment>,
}

/// Parses serialized plans from their textual representation.
pub trait PlanReader: Send + Sync {
    fn read_logical_plan(&self, text: &str) -> Result<LogicalPlan, String>;
    fn read_physical_plan(&self, text: &str) -> Result<PhysicalPlan, String>;
}

/// Lowers a logical plan to a physical plan.
pub trait PhysicalOptimizer: Send + Sync {
    fn optimize(&self, plan: LogicalPlan, context: &QueryContext) -> Result<PhysicalPlan, String>;
}

/// Produces the fragment work unit from a physical plan and the current
/// cluster membership.
pub trait Parallelizer: Send + Sync {
    fn make_work_unit(
        &self,
        plan: &PhysicalPlan,
        context: &QueryContext,
        query_id: QueryId,
        endpoints: &[Endpoint],
    ) -> Result<QueryWorkUnit, String>;
}

/// Plans a SQL statement into a physical plan, optionally returning the text
/// plan for observability.
pub trait SqlWorker: Send + Sync {
    fn plan(
        &self,
        sql: &str,
        context: &QueryContext,
    ) -> Result<(PhysicalPlan, Option<String>), String>;
}

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
//! Cluster coordination surface consumed by the query core.
//!
//! Production deployments back these traits with an external coordination
//! service; `local` provides the complete in-process implementation used for
//! embedded mode and tests.

pub mod local;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::ids::{Endpoint, QueryId};
use crate::proto::QueryState;

/// Why releasing an admission lease failed. `Interrupted` is retryable; the
/// caller loops on it. Anything else is logged and abandoned, since the
/// lease will eventually expire cluster-side.
#[derive(Clone, Debug)]
pub enum LeaseError {
    Interrupted,
    Other(String),
}

impl fmt::Display for LeaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("interrupted"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

/// An acquired slot on a cluster-wide admission semaphore. Released exactly
/// once; the query coordinator owns it for the lifetime of the query.
pub trait Lease: Send + std::fmt::Debug {
    fn release(&mut self) -> Result<(), LeaseError>;
}

pub trait DistributedSemaphore: Send + Sync {
    /// Blocks the calling thread until a slot is available or the timeout
    /// elapses.
    fn acquire(&self, timeout: Duration) -> Result<Box<dyn Lease>, String>;
}

/// Observer of cluster membership changes.
pub trait NodeStatusListener: Send + Sync {
    fn nodes_registered(&self, nodes: &[Endpoint]) {
        let _ = nodes;
    }
    fn nodes_unregistered(&self, nodes: &[Endpoint]);
}

pub trait ClusterCoordinator: Send + Sync {
    /// A named cluster-wide counting semaphore with the given capacity.
    fn semaphore(&self, name: &str, capacity: u32) -> Arc<dyn DistributedSemaphore>;

    /// Current cluster membership.
    fn endpoints(&self) -> Vec<Endpoint>;

    fn add_node_status_listener(&self, listener: Arc<dyn NodeStatusListener>);

    /// Removal is by identity; unknown listeners are ignored.
    fn remove_node_status_listener(&self, listener: &Arc<dyn NodeStatusListener>);
}

/// Best-effort record of query state transitions. Failures are logged by the
/// caller and never fail the query.
pub trait PersistentStore: Send + Sync {
    fn update_query_state(
        &self,
        query_id: QueryId,
        state: QueryState,
        error: Option<&str>,
    ) -> Result<(), String>;
}

#[derive(Default)]
pub struct InMemoryStore {
    states: Mutex<HashMap<QueryId, (QueryState, Option<String>)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_state(&self, query_id: QueryId) -> Option<(QueryState, Option<String>)> {
        let guard = self.states.lock().expect("store lock");
        guard.get(&query_id).cloned()
    }
}

impl PersistentStore for InMemoryStore {
    fn update_query_state(
        &self,
        query_id: QueryId,
        state: QueryState,
        error: Option<&str>,
    ) -> Result<(), String> {
        let mut guard = self.states.lock().expect("store lock");
        guard.insert(query_id, (state, error.map(str::to_string)));
        Ok(())
    }
}

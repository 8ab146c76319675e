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
//! The query coordination core: per-query lifecycle, fragment dispatch and
//! tracking, and the node-local work event bus.

pub mod admission;
pub mod dispatch;
pub mod event_bus;
pub mod foreman;
pub mod fragment;
pub mod query_manager;

/// Schedules coordinator-side work (the Foreman itself, the root fragment
/// runner) onto execution threads.
pub trait WorkerPool: Send + Sync {
    fn submit(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Thread-per-task pool. Coordinator-side tasks are few and long-lived, so a
/// dedicated thread each is the simplest correct scheduling.
pub struct SpawnPool;

impl WorkerPool for SpawnPool {
    fn submit(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        std::thread::spawn(task);
    }
}

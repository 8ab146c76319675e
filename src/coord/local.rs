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
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::common::ids::Endpoint;
use crate::coord::{
    ClusterCoordinator, DistributedSemaphore, Lease, LeaseError, NodeStatusListener,
};

/// In-process cluster coordinator for embedded/single-process deployments.
/// Named semaphores are plain counting semaphores; membership changes are
/// driven by whoever assembles the process (a heartbeat service in a real
/// cluster, the test harness otherwise).
pub struct LocalClusterCoordinator {
    semaphores: Mutex<HashMap<String, Arc<LocalSemaphore>>>,
    listeners: Mutex<Vec<Arc<dyn NodeStatusListener>>>,
    endpoints: Mutex<Vec<Endpoint>>,
}

impl LocalClusterCoordinator {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            semaphores: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            endpoints: Mutex::new(endpoints),
        }
    }

    /// Drops the given endpoints from the membership view and notifies every
    /// registered listener.
    pub fn report_nodes_down(&self, nodes: &[Endpoint]) {
        {
            let mut guard = self.endpoints.lock().expect("endpoints lock");
            guard.retain(|e| !nodes.contains(e));
        }
        let listeners = {
            let guard = self.listeners.lock().expect("listeners lock");
            guard.clone()
        };
        debug!(
            "reporting {} node(s) down to {} listener(s)",
            nodes.len(),
            listeners.len()
        );
        for listener in listeners {
            listener.nodes_unregistered(nodes);
        }
    }
}

impl ClusterCoordinator for LocalClusterCoordinator {
    fn semaphore(&self, name: &str, capacity: u32) -> Arc<dyn DistributedSemaphore> {
        let mut guard = self.semaphores.lock().expect("semaphores lock");
        let semaphore = guard
            .entry(name.to_string())
            .or_insert_with(|| LocalSemaphore::new(capacity))
            .clone();
        semaphore
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.lock().expect("endpoints lock").clone()
    }

    fn add_node_status_listener(&self, listener: Arc<dyn NodeStatusListener>) {
        let mut guard = self.listeners.lock().expect("listeners lock");
        guard.push(listener);
    }

    fn remove_node_status_listener(&self, listener: &Arc<dyn NodeStatusListener>) {
        let mut guard = self.listeners.lock().expect("listeners lock");
        guard.retain(|l| !Arc::ptr_eq(l, listener));
    }
}

struct LocalSemaphore {
    permits: Mutex<u32>,
    cv: Condvar,
    self_ref: Weak<LocalSemaphore>,
}

impl LocalSemaphore {
    fn new(capacity: u32) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            permits: Mutex::new(capacity),
            cv: Condvar::new(),
            self_ref: self_ref.clone(),
        })
    }

    fn give_back(&self) {
        let mut permits = self.permits.lock().expect("semaphore lock");
        *permits += 1;
        self.cv.notify_one();
    }
}

impl DistributedSemaphore for LocalSemaphore {
    fn acquire(&self, timeout: Duration) -> Result<Box<dyn Lease>, String> {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock().expect("semaphore lock");
        loop {
            if *permits > 0 {
                *permits -= 1;
                return Ok(Box::new(LocalLease {
                    semaphore: self.self_ref.upgrade().expect("semaphore alive"),
                    released: false,
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(format!("semaphore acquire timed out after {:?}", timeout));
            }
            let (guard, wait) = self
                .cv
                .wait_timeout(permits, deadline - now)
                .expect("semaphore wait");
            permits = guard;
            if wait.timed_out() && *permits == 0 {
                return Err(format!("semaphore acquire timed out after {:?}", timeout));
            }
        }
    }
}

struct LocalLease {
    semaphore: Arc<LocalSemaphore>,
    released: bool,
}

impl std::fmt::Debug for LocalLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLease")
            .field("released", &self.released)
            .finish()
    }
}

impl Lease for LocalLease {
    fn release(&mut self) -> Result<(), LeaseError> {
        if !self.released {
            self.released = true;
            self.semaphore.give_back();
        }
        Ok(())
    }
}

impl Drop for LocalLease {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn semaphore_capacity_is_enforced() {
        let coordinator = LocalClusterCoordinator::new(vec![]);
        let semaphore = coordinator.semaphore("query.small", 1);
        let first = semaphore.acquire(Duration::from_millis(10)).expect("slot");
        let second = semaphore.acquire(Duration::from_millis(50));
        assert!(second.is_err(), "second acquire should time out");
        drop(first);
        let third = semaphore.acquire(Duration::from_millis(50));
        assert!(third.is_ok(), "released slot should be reusable");
    }

    #[test]
    fn release_unblocks_a_waiter() {
        let coordinator = Arc::new(LocalClusterCoordinator::new(vec![]));
        let semaphore = coordinator.semaphore("query.large", 1);
        let mut lease = semaphore.acquire(Duration::from_millis(10)).expect("slot");

        let waiting = {
            let semaphore = coordinator.semaphore("query.large", 1);
            thread::spawn(move || semaphore.acquire(Duration::from_secs(5)).is_ok())
        };
        thread::sleep(Duration::from_millis(50));
        lease.release().expect("release");
        assert!(waiting.join().expect("join"));
    }

    #[test]
    fn same_name_returns_same_semaphore() {
        let coordinator = LocalClusterCoordinator::new(vec![]);
        let a = coordinator.semaphore("query.small", 1);
        let _slot = a.acquire(Duration::from_millis(10)).expect("slot");
        let b = coordinator.semaphore("query.small", 1);
        assert!(b.acquire(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn double_release_gives_back_one_permit() {
        let coordinator = LocalClusterCoordinator::new(vec![]);
        let semaphore = coordinator.semaphore("query.small", 1);
        let mut lease = semaphore.acquire(Duration::from_millis(10)).expect("slot");
        lease.release().expect("first release");
        lease.release().expect("second release is a no-op");
        let _slot = semaphore.acquire(Duration::from_millis(10)).expect("slot");
        assert!(semaphore.acquire(Duration::from_millis(20)).is_err());
    }
}

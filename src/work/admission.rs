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
//! Cluster-wide query admission.
//!
//! Limits the number of small and large queries running concurrently, if
//! queuing is enabled. Acquisition blocks the calling thread, so this runs
//! inside the Foreman's setup phase and consumes that worker while waiting.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::common::config::QueueOptions;
use crate::common::error::ExecError;
use crate::coord::{ClusterCoordinator, Lease, LeaseError};

const SMALL_QUEUE: &str = "query.small";
const LARGE_QUEUE: &str = "query.large";

pub struct AdmissionController {
    coordinator: Arc<dyn ClusterCoordinator>,
}

impl AdmissionController {
    pub fn new(coordinator: Arc<dyn ClusterCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Acquires an admission lease for a query of the given total plan cost.
    /// Returns `None` without touching the coordinator when queuing is
    /// disabled. A timeout is a query setup failure.
    pub fn admit(
        &self,
        total_cost: f64,
        queue: &QueueOptions,
    ) -> Result<Option<Box<dyn Lease>>, ExecError> {
        if !queue.enable {
            return Ok(None);
        }

        let (name, capacity) = if total_cost > queue.threshold as f64 {
            (LARGE_QUEUE, queue.large)
        } else {
            (SMALL_QUEUE, queue.small)
        };

        let semaphore = self.coordinator.semaphore(name, capacity);
        let timeout = Duration::from_millis(queue.timeout_millis);
        match semaphore.acquire(timeout) {
            Ok(lease) => Ok(Some(lease)),
            Err(e) => Err(ExecError::foreman_setup(format!(
                "Unable to acquire slot for query: {e}"
            ))),
        }
    }

    /// Releases a lease, retrying on interruption. Any other failure is
    /// logged and the lease abandoned; it will expire cluster-side.
    pub fn release(lease: &mut Option<Box<dyn Lease>>) {
        while let Some(held) = lease.as_mut() {
            match held.release() {
                Ok(()) => {
                    *lease = None;
                }
                Err(LeaseError::Interrupted) => continue,
                Err(LeaseError::Other(e)) => {
                    warn!("failure while releasing admission lease: {}", e);
                    break;
                }
            }
        }
    }
}

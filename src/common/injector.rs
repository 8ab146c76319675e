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
use std::sync::Mutex;

use crate::common::error::ExecError;

/// Fault-injection seam for controlled failure testing.
///
/// Passed at construction through the node context, defaulting to a no-op,
/// so tests can trigger synchronous failures at named points without any
/// process-wide state.
pub trait ExecutionInjector: Send + Sync {
    fn inject(&self, site: &'static str) -> Result<(), ExecError> {
        let _ = site;
        Ok(())
    }
}

#[derive(Default)]
pub struct NoopInjector;

impl ExecutionInjector for NoopInjector {}

/// Table-driven injector: each armed site fires once, then disarms.
#[derive(Default)]
pub struct FaultInjector {
    sites: Mutex<HashMap<&'static str, String>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, site: &'static str, message: impl Into<String>) {
        let mut guard = self.sites.lock().expect("fault injector lock");
        guard.insert(site, message.into());
    }
}

impl ExecutionInjector for FaultInjector {
    fn inject(&self, site: &'static str) -> Result<(), ExecError> {
        let armed = {
            let mut guard = self.sites.lock().expect("fault injector lock");
            guard.remove(site)
        };
        match armed {
            Some(message) => Err(ExecError::foreman_setup(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armed_site_fires_once() {
        let injector = FaultInjector::new();
        injector.arm("run-try-beginning", "boom");
        assert!(injector.inject("run-try-beginning").is_err());
        assert!(injector.inject("run-try-beginning").is_ok());
        assert!(injector.inject("run-try-end").is_ok());
    }
}

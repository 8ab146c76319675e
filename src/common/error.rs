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
use thiserror::Error;

use crate::common::ids::{FragmentHandle, QueryId};

/// Failure reported by the RPC layer for an asynchronous send or a remote
/// rejection. Cloneable so a first-seen failure can be recorded and cited
/// later without giving up the original.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    pub message: String,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error taxonomy of the coordination core.
///
/// `ForemanSetup` covers synchronous setup failures (planning, admission,
/// the intermediate dispatch barrier). `FragmentSetup` is raised at the work
/// bus when an inbound control message refers to a fragment with no manager
/// and no recently-finished record; it is surfaced to the sender only.
/// `DuplicateListener` / `DuplicateManager` are programming errors.
#[derive(Clone, Debug, Error)]
pub enum ExecError {
    #[error("foreman setup failed: {message}")]
    ForemanSetup { message: String },

    #[error("fragment setup failed: {message}")]
    FragmentSetup { message: String },

    #[error("rpc failure: {0}")]
    Rpc(#[from] RpcError),

    #[error("{message}")]
    Execution { message: String },

    #[error("a fragment status listener is already registered for query {0}")]
    DuplicateListener(QueryId),

    #[error("a fragment manager is already registered for handle {0}")]
    DuplicateManager(FragmentHandle),
}

impl ExecError {
    pub fn foreman_setup(message: impl Into<String>) -> Self {
        Self::ForemanSetup {
            message: message.into(),
        }
    }

    pub fn fragment_setup(message: impl Into<String>) -> Self {
        Self::FragmentSetup {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// The innermost cause text, used as the user-visible error message in
    /// the final query result.
    pub fn root_cause_message(&self) -> String {
        match self {
            Self::Rpc(e) => e.message.clone(),
            Self::Execution { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_root_cause_drops_the_taxonomy_prefix() {
        let err = ExecError::from(RpcError::new("connection reset"));
        assert_eq!(err.root_cause_message(), "connection reset");
        assert_eq!(err.to_string(), "rpc failure: connection reset");
    }

    #[test]
    fn setup_errors_keep_their_context() {
        let err = ExecError::foreman_setup("Unable to acquire slot for query");
        assert!(err.root_cause_message().contains("Unable to acquire slot"));
    }
}

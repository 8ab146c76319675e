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
//! RPC surfaces consumed by the query core: the control channel to peer
//! nodes and the user channel back to the submitting client.

pub mod control;

use std::sync::Arc;

use crate::common::error::RpcError;
use crate::common::ids::{Endpoint, FragmentHandle};
use crate::proto;

/// Outcome callback for an asynchronous RPC. Called exactly once, from an
/// arbitrary thread.
pub trait RpcOutcomeListener: Send {
    fn success(&self) {}
    fn failed(&self, error: RpcError) {
        let _ = error;
    }
}

/// Control channel to one peer node.
pub trait ControlTunnel: Send + Sync {
    /// Delivers a batch of fragments for initialization. The listener fires
    /// when the peer acknowledges or the send fails.
    fn send_fragments(
        &self,
        listener: Box<dyn RpcOutcomeListener>,
        fragments: proto::InitializeFragments,
    );

    /// Best-effort cancellation of one fragment. Fire-and-forget.
    fn cancel_fragment(&self, handle: FragmentHandle);
}

/// Provides per-endpoint control tunnels. Tunnels are pool-managed shared
/// resources; callers never own them.
pub trait Controller: Send + Sync {
    fn tunnel(&self, endpoint: &Endpoint) -> Arc<dyn ControlTunnel>;
}

#[derive(Clone, Debug)]
pub struct UserSession {
    pub user: String,
    pub time_zone: String,
}

impl Default for UserSession {
    fn default() -> Self {
        Self {
            user: "anonymous".to_string(),
            time_zone: "UTC".to_string(),
        }
    }
}

/// A result batch addressed to the client. Only the header travels through
/// the coordination core; data buffers are produced by the root executor.
#[derive(Clone, Debug)]
pub struct QueryWritableBatch {
    pub header: proto::QueryResult,
}

impl QueryWritableBatch {
    pub fn new(header: proto::QueryResult) -> Self {
        Self { header }
    }
}

/// Connection to the client that submitted the query. The coordinator sends
/// the final result through it but never closes it.
pub trait UserClientConnection: Send + Sync {
    fn session(&self) -> UserSession;

    fn send_result(
        &self,
        listener: Box<dyn RpcOutcomeListener>,
        batch: QueryWritableBatch,
        is_last: bool,
    );
}

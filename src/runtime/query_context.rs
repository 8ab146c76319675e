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
use std::sync::atomic::{AtomicBool, Ordering};

use crate::common::config::ExecOptions;
use crate::common::ids::{Endpoint, QueryId};
use crate::rpc::UserSession;
use crate::runtime::node_context::NodeContext;

/// Per-query context: the session that submitted the query, the options
/// snapshot taken at admission, the query's timestamp and time zone, and the
/// cluster membership the plan was parallelized against.
///
/// Closed exactly once at the end of the query; a second close is an error
/// so cleanup bugs surface instead of passing silently.
pub struct QueryContext {
    query_id: QueryId,
    session: UserSession,
    options: ExecOptions,
    start_time_millis: i64,
    active_endpoints: Vec<Endpoint>,
    current_endpoint: Endpoint,
    closed: AtomicBool,
}

impl QueryContext {
    pub fn new(query_id: QueryId, session: UserSession, node: &NodeContext) -> Self {
        Self {
            query_id,
            session,
            options: node.options().clone(),
            start_time_millis: chrono::Utc::now().timestamp_millis(),
            active_endpoints: node.coordinator().endpoints(),
            current_endpoint: node.endpoint().clone(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn query_start_time(&self) -> i64 {
        self.start_time_millis
    }

    pub fn time_zone(&self) -> &str {
        &self.session.time_zone
    }

    pub fn active_endpoints(&self) -> &[Endpoint] {
        &self.active_endpoints
    }

    pub fn current_endpoint(&self) -> &Endpoint {
        &self.current_endpoint
    }

    pub fn close(&self) -> Result<(), String> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(format!("query context {} closed twice", self.query_id));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node_context::NodeContext;

    #[test]
    fn close_is_exactly_once() {
        let node = NodeContext::builder(Endpoint::new("localhost", 31011)).build();
        let context = QueryContext::new(QueryId::new(1, 1), UserSession::default(), &node);
        assert!(!context.is_closed());
        context.close().expect("first close");
        assert!(context.is_closed());
        assert!(context.close().is_err());
    }
}

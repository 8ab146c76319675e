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
//! Protobuf-shaped wire messages of the coordination core.
//!
//! The set is small and fixed, so the messages are written out by hand with
//! prost derives instead of going through protoc at build time. Field tags
//! are part of the wire contract; do not renumber.

use crate::common::ids;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum QueryType {
    Logical = 1,
    Physical = 2,
    Sql = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum QueryState {
    Pending = 0,
    Running = 1,
    Completed = 2,
    Canceled = 3,
    Failed = 4,
    CancellationRequested = 5,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FragmentState {
    Sending = 0,
    AwaitingAllocation = 1,
    Running = 2,
    Finished = 3,
    Cancelled = 4,
    Failed = 5,
}

impl FragmentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Failed)
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct QueryId {
    #[prost(sfixed64, tag = "1")]
    pub part1: i64,
    #[prost(sfixed64, tag = "2")]
    pub part2: i64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct FragmentHandle {
    #[prost(message, optional, tag = "1")]
    pub query_id: Option<QueryId>,
    #[prost(int32, tag = "2")]
    pub major_fragment_id: i32,
    #[prost(int32, tag = "3")]
    pub minor_fragment_id: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Endpoint {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(uint32, tag = "2")]
    pub control_port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunQuery {
    #[prost(enumeration = "QueryType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub plan: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanFragment {
    #[prost(message, optional, tag = "1")]
    pub handle: Option<FragmentHandle>,
    #[prost(message, optional, tag = "2")]
    pub assignment: Option<Endpoint>,
    #[prost(bool, tag = "3")]
    pub leaf_fragment: bool,
    #[prost(string, tag = "4")]
    pub fragment_json: String,
    #[prost(int64, tag = "5")]
    pub mem_initial: i64,
    #[prost(int64, tag = "6")]
    pub mem_max: i64,
    #[prost(int64, tag = "7")]
    pub query_start_time: i64,
    #[prost(string, tag = "8")]
    pub time_zone: String,
    #[prost(string, tag = "9")]
    pub options_json: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitializeFragments {
    #[prost(message, repeated, tag = "1")]
    pub fragments: Vec<PlanFragment>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FragmentStatus {
    #[prost(message, optional, tag = "1")]
    pub handle: Option<FragmentHandle>,
    #[prost(enumeration = "FragmentState", tag = "2")]
    pub state: i32,
    #[prost(string, tag = "3")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbError {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryResult {
    #[prost(message, optional, tag = "1")]
    pub query_id: Option<QueryId>,
    #[prost(enumeration = "QueryState", tag = "2")]
    pub query_state: i32,
    #[prost(bool, tag = "3")]
    pub is_last_chunk: bool,
    #[prost(message, repeated, tag = "4")]
    pub errors: Vec<PbError>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Ack {
    #[prost(bool, tag = "1")]
    pub ok: bool,
}

impl From<ids::QueryId> for QueryId {
    fn from(id: ids::QueryId) -> Self {
        Self {
            part1: id.hi,
            part2: id.lo,
        }
    }
}

impl From<QueryId> for ids::QueryId {
    fn from(id: QueryId) -> Self {
        Self {
            hi: id.part1,
            lo: id.part2,
        }
    }
}

impl From<ids::FragmentHandle> for FragmentHandle {
    fn from(h: ids::FragmentHandle) -> Self {
        Self {
            query_id: Some(h.query_id.into()),
            major_fragment_id: h.major_fragment_id,
            minor_fragment_id: h.minor_fragment_id,
        }
    }
}

impl From<ids::Endpoint> for Endpoint {
    fn from(e: ids::Endpoint) -> Self {
        Self {
            address: e.address,
            control_port: u32::from(e.port),
        }
    }
}

impl Endpoint {
    pub fn to_core(&self) -> ids::Endpoint {
        ids::Endpoint::new(self.address.clone(), self.control_port as u16)
    }
}

/// Core view of an optional wire handle; `None` when the query id is absent.
pub fn core_handle(handle: Option<&FragmentHandle>) -> Option<ids::FragmentHandle> {
    let h = handle?;
    let query_id = h.query_id?;
    Some(ids::FragmentHandle::new(
        query_id.into(),
        h.major_fragment_id,
        h.minor_fragment_id,
    ))
}

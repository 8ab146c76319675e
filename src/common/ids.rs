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
use std::fmt;

/// Globally unique query identifier, assigned by the submitting node.
///
/// The two halves carry a UUID; the textual form is the canonical hyphenated
/// layout so log lines can be grepped against client-side ids.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct QueryId {
    pub hi: i64,
    pub lo: i64,
}

pub fn format_query_id(hi: i64, lo: i64) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        ((hi as u64) >> 32) as u32,
        ((hi as u64) >> 16) as u16,
        (hi as u64) as u16,
        ((lo as u64) >> 48) as u16,
        (lo as u64) & 0x0000_FFFF_FFFF_FFFF
    )
}

impl QueryId {
    pub const fn new(hi: i64, lo: i64) -> Self {
        Self { hi, lo }
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_query_id(self.hi, self.lo))
    }
}

/// Identity of one fragment instance on one node. Equality is by all three
/// fields. The display form `<queryIdHex>:<majorId>:<minorId>` is the
/// identifier used in logs and map keys.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FragmentHandle {
    pub query_id: QueryId,
    pub major_fragment_id: i32,
    pub minor_fragment_id: i32,
}

impl FragmentHandle {
    pub const fn new(query_id: QueryId, major_fragment_id: i32, minor_fragment_id: i32) -> Self {
        Self {
            query_id,
            major_fragment_id,
            minor_fragment_id,
        }
    }
}

impl fmt::Display for FragmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.query_id, self.major_fragment_id, self.minor_fragment_id
        )
    }
}

/// Network identity of a cluster node, as used for fragment assignment and
/// control RPC routing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_id_display_uses_uuid_layout() {
        let id = QueryId::new(0, 1);
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn fragment_handle_identifier_format() {
        let handle = FragmentHandle::new(QueryId::new(0, 0x2a), 3, 7);
        assert_eq!(
            handle.to_string(),
            "00000000-0000-0000-0000-00000000002a:3:7"
        );
    }

    #[test]
    fn fragment_handle_equality_is_by_all_fields() {
        let q = QueryId::new(1, 2);
        assert_eq!(FragmentHandle::new(q, 1, 0), FragmentHandle::new(q, 1, 0));
        assert_ne!(FragmentHandle::new(q, 1, 0), FragmentHandle::new(q, 1, 1));
        assert_ne!(
            FragmentHandle::new(q, 1, 0),
            FragmentHandle::new(QueryId::new(1, 3), 1, 0)
        );
    }
}

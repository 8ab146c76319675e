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
pub mod common;
pub mod coord;
pub mod plan;
pub mod proto;
pub mod rpc;
pub mod runtime;
pub mod work;

// Convenience aliases for the assembly surface.
pub use common::app_config as auger_config;
pub use common::logging as auger_logging;

pub use common::config::{ExecOptions, QueueOptions};
pub use common::error::{ExecError, RpcError};
pub use common::ids::{Endpoint, FragmentHandle, QueryId};
pub use runtime::node_context::NodeContext;
pub use work::event_bus::WorkEventBus;
pub use work::foreman::Foreman;

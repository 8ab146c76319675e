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
use crate::common::app_config::config as auger_app_config;

pub(crate) fn queue_enable() -> bool {
    auger_app_config()
        .ok()
        .map(|c| c.exec.queue.enable)
        .unwrap_or(false)
}

pub(crate) fn queue_threshold() -> i64 {
    auger_app_config()
        .ok()
        .map(|c| c.exec.queue.threshold)
        .unwrap_or(30_000_000)
}

pub(crate) fn queue_small() -> u32 {
    auger_app_config()
        .ok()
        .map(|c| c.exec.queue.small)
        .unwrap_or(100)
}

pub(crate) fn queue_large() -> u32 {
    auger_app_config()
        .ok()
        .map(|c| c.exec.queue.large)
        .unwrap_or(10)
}

pub(crate) fn queue_timeout_millis() -> u64 {
    auger_app_config()
        .ok()
        .map(|c| c.exec.queue.timeout_millis)
        .unwrap_or(300_000)
}

pub(crate) fn width_max_per_node() -> u64 {
    auger_app_config()
        .ok()
        .map(|c| c.planner.width.max_per_node)
        .filter(|v| *v > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() as u64)
                .unwrap_or(1)
        })
}

pub(crate) fn max_query_memory_per_node() -> i64 {
    auger_app_config()
        .ok()
        .map(|c| c.planner.memory.max_query_memory_per_node)
        .unwrap_or(2 * 1024 * 1024 * 1024)
}

/// Per-query snapshot of the admission queue knobs. Decoupled from the
/// process-wide config so callers can assemble options directly.
#[derive(Clone, Debug)]
pub struct QueueOptions {
    pub enable: bool,
    pub threshold: i64,
    pub small: u32,
    pub large: u32,
    pub timeout_millis: u64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            enable: false,
            threshold: 30_000_000,
            small: 100,
            large: 10,
            timeout_millis: 300_000,
        }
    }
}

/// Execution options snapshot handed to each query at admission time.
#[derive(Clone, Debug)]
pub struct ExecOptions {
    pub queue: QueueOptions,
    pub width_max_per_node: u64,
    pub max_query_memory_per_node: i64,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            queue: QueueOptions::default(),
            width_max_per_node: 1,
            max_query_memory_per_node: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl ExecOptions {
    pub fn from_config() -> Self {
        Self {
            queue: QueueOptions {
                enable: queue_enable(),
                threshold: queue_threshold(),
                small: queue_small(),
                large: queue_large(),
                timeout_millis: queue_timeout_millis(),
            },
            width_max_per_node: width_max_per_node(),
            max_query_memory_per_node: max_query_memory_per_node(),
        }
    }
}

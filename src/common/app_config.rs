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
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static CONFIG: OnceLock<AugerConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static AugerConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let cfg = AugerConfig::load_from_file(path.as_ref())?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn init_from_env_or_default() -> Result<&'static AugerConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = AugerConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn config() -> Result<&'static AugerConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("AUGER_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidate = PathBuf::from("auger.toml");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow!(
        "missing config file: set $AUGER_CONFIG or create ./auger.toml"
    ))
}

#[derive(Clone, Deserialize)]
pub struct AugerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression. If set, this takes
    /// precedence over `log_level`.
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub exec: ExecConfig,

    #[serde(default)]
    pub planner: PlannerConfig,
}

impl AugerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: AugerConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        Ok(cfg)
    }
}

impl Default for AugerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            server: ServerConfig::default(),
            exec: ExecConfig::default(),
            planner: PlannerConfig::default(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_user_port")]
    pub user_port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port() -> u16 {
    31011
}
fn default_user_port() -> u16 {
    31010
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            control_port: default_control_port(),
            user_port: default_user_port(),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct ExecConfig {
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Admission queue knobs. The TOML layout mirrors the option names:
/// `exec.queue.enable`, `exec.queue.threshold`, `exec.queue.small`,
/// `exec.queue.large`, `exec.queue.timeout_millis`.
#[derive(Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_queue_threshold")]
    pub threshold: i64,
    #[serde(default = "default_queue_small")]
    pub small: u32,
    #[serde(default = "default_queue_large")]
    pub large: u32,
    #[serde(default = "default_queue_timeout_millis")]
    pub timeout_millis: u64,
}

fn default_queue_threshold() -> i64 {
    30_000_000
}
fn default_queue_small() -> u32 {
    100
}
fn default_queue_large() -> u32 {
    10
}
fn default_queue_timeout_millis() -> u64 {
    300_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enable: false,
            threshold: default_queue_threshold(),
            small: default_queue_small(),
            large: default_queue_large(),
            timeout_millis: default_queue_timeout_millis(),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub width: WidthConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// `planner.width.max_per_node`; 0 means derive from available parallelism.
#[derive(Clone, Deserialize)]
pub struct WidthConfig {
    #[serde(default)]
    pub max_per_node: u64,
}

impl Default for WidthConfig {
    fn default() -> Self {
        Self { max_per_node: 0 }
    }
}

/// `planner.memory.max_query_memory_per_node`, in bytes.
#[derive(Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_max_query_memory_per_node")]
    pub max_query_memory_per_node: i64,
}

fn default_max_query_memory_per_node() -> i64 {
    2 * 1024 * 1024 * 1024
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_query_memory_per_node: default_max_query_memory_per_node(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knob_names_map_to_toml_tables() {
        let cfg: AugerConfig = toml::from_str(
            r#"
            [exec.queue]
            enable = true
            threshold = 123
            small = 5
            large = 2
            timeout_millis = 1000

            [planner.width]
            max_per_node = 4

            [planner.memory]
            max_query_memory_per_node = 1048576
            "#,
        )
        .expect("parse");
        assert!(cfg.exec.queue.enable);
        assert_eq!(cfg.exec.queue.threshold, 123);
        assert_eq!(cfg.exec.queue.small, 5);
        assert_eq!(cfg.exec.queue.large, 2);
        assert_eq!(cfg.exec.queue.timeout_millis, 1000);
        assert_eq!(cfg.planner.width.max_per_node, 4);
        assert_eq!(cfg.planner.memory.max_query_memory_per_node, 1_048_576);
    }

    #[test]
    fn defaults_keep_queuing_disabled() {
        let cfg: AugerConfig = toml::from_str("").expect("parse");
        assert!(!cfg.exec.queue.enable);
        assert_eq!(cfg.exec.queue.threshold, 30_000_000);
    }
}

//! Server configuration: a TOML file layered with `SIFT_` environment
//! variables.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `SIFT_SCHEDULER__ENABLED=true`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8600 }
fn default_timeout() -> u64 { 60 }
fn default_interval() -> u64 { 24 * 60 * 60 }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  pub ledger_path:          PathBuf,
  pub auth_username:        String,
  pub auth_password_hash:   String,
  /// Base URL of the knowledge service holding memories, rules and skills.
  pub knowledge_url:        String,
  /// Base URL of the classification service.
  pub analyzer_url:         String,
  #[serde(default = "default_timeout")]
  pub request_timeout_secs: u64,
  #[serde(default)]
  pub scheduler:            SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
  #[serde(default)]
  pub enabled:       bool,
  #[serde(default = "default_interval")]
  pub interval_secs: u64,
  #[serde(default = "default_true")]
  pub dry_run:       bool,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self { enabled: false, interval_secs: default_interval(), dry_run: true }
  }
}

pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
  let builder = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("SIFT")
        .prefix_separator("_")
        .separator("__"),
    );
  finish(builder)
}

fn finish(
  builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> anyhow::Result<ServerConfig> {
  builder
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise ServerConfig")
}

//! sift server binary.
//!
//! Reads `sift.toml` (or the path specified with `--config`), opens the SQLite
//! job ledger, wires the HTTP collaborators into a batch runner, optionally
//! starts the periodic scheduler, and serves the control API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash` in sift.toml:
//!
//! ```
//! cargo run -p sift-server -- --hash-password
//! ```

mod config;
mod http;
mod scheduler;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use sift_api::AuthConfig;
use sift_batch::{BatchRunner, Collaborators};
use sift_store_sqlite::SqliteLedger;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::http::{AnalyzerClient, KnowledgeClient};

#[derive(Parser)]
#[command(author, version, about = "sift batch deduplication server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "sift.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let server_cfg = config::load(&cli.config)?;

  let ledger_path = expand_tilde(&server_cfg.ledger_path);
  if let Some(parent) = ledger_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let ledger = SqliteLedger::open(&ledger_path)
    .await
    .with_context(|| format!("failed to open ledger at {ledger_path:?}"))?;

  let timeout = Duration::from_secs(server_cfg.request_timeout_secs);
  let knowledge = KnowledgeClient::new(&server_cfg.knowledge_url, timeout)?;
  let analyzer = Arc::new(AnalyzerClient::new(&server_cfg.analyzer_url, timeout)?);
  let collaborators = Collaborators {
    collector:  Arc::new(knowledge.clone()),
    analyzer:   analyzer.clone(),
    extractor:  analyzer,
    committers: knowledge.committers(),
  };
  let runner = Arc::new(BatchRunner::new(collaborators, Arc::new(ledger)));

  if server_cfg.scheduler.enabled {
    tokio::spawn(scheduler::run(runner.clone(), server_cfg.scheduler.clone()));
  }

  let app = sift_api::api_router(runner, AuthConfig {
    username:      server_cfg.auth_username.clone(),
    password_hash: server_cfg.auth_password_hash.clone(),
  });
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/") {
    if let Ok(home) = std::env::var("HOME") {
      return PathBuf::from(home).join(rest);
    }
  }
  path.to_path_buf()
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
  fs::File,
  path::{Path, PathBuf},
  time::Duration,
};

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub chain: ChainConfig,
  pub scan: ScanConfig,
  pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
  pub chain_name: String,
  pub chain_id: u64,
  /// Full node JSON-RPC endpoint.
  pub rpc: String,
  pub username: Option<String>,
  pub password: Option<String>,
  /// brc-20 aware ord index.
  pub ord_rpc: String,
  /// Runes aware ordinals index.
  pub ordinals_rpc: String,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      chain_name: "btc".into(),
      chain_id: 0,
      rpc: "http://127.0.0.1:8332".into(),
      username: None,
      password: None,
      ord_rpc: "http://127.0.0.1:80".into(),
      ordinals_rpc: String::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
  pub start_block: u64,
  pub poll_interval_secs: u64,
  pub settle_window_secs: u64,
  pub request_timeout_secs: u64,
  pub prefetch_permits: usize,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      start_block: 779832,
      poll_interval_secs: 10,
      settle_window_secs: 30,
      request_timeout_secs: 30,
      prefetch_permits: 20,
    }
  }
}

impl ScanConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs)
  }

  pub fn settle_window(&self) -> Duration {
    Duration::from_secs(self.settle_window_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
  pub path: PathBuf,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("records.jsonl"),
    }
  }
}

impl Config {
  pub fn load(path: &Path) -> Result<Self> {
    serde_yaml::from_reader(
      File::open(path).with_context(|| format!("failed to open config `{}`", path.display()))?,
    )
    .with_context(|| format!("failed to parse config `{}`", path.display()))
  }
}

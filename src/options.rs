use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Parser;
use log::LevelFilter;
use std::{path::PathBuf, str::FromStr};

#[derive(Clone, Default, Debug, Parser)]
pub struct Options {
  #[arg(long, help = "Load configuration from <CONFIG>.")]
  pub(crate) config: Option<PathBuf>,
  #[arg(long, default_value = "info", help = "Log at <LOG_LEVEL>.")]
  pub(crate) log_level: String,
  #[arg(long, help = "Write rolling log files to <LOG_DIR>.")]
  pub(crate) log_dir: Option<PathBuf>,
  #[arg(long, help = "Connect to the full node at <RPC_URL>.")]
  pub(crate) rpc_url: Option<String>,
  #[arg(long, requires = "rpc_pass", help = "Authenticate to the full node as <RPC_USER>.")]
  pub(crate) rpc_user: Option<String>,
  #[arg(long, requires = "rpc_user", help = "Authenticate to the full node with <RPC_PASS>.")]
  pub(crate) rpc_pass: Option<String>,
  #[arg(long, help = "Query the brc-20 ord index at <ORD_RPC>.")]
  pub(crate) ord_rpc: Option<String>,
  #[arg(long, help = "Query the runes index at <ORDINALS_RPC>.")]
  pub(crate) ordinals_rpc: Option<String>,
  #[arg(long, help = "Write block records to <OUTPUT>.")]
  pub(crate) output: Option<PathBuf>,
}

impl Options {
  pub(crate) fn log_level(&self) -> Result<LevelFilter> {
    LevelFilter::from_str(&self.log_level)
      .map_err(|_| anyhow!("invalid log level `{}`", self.log_level))
  }

  pub(crate) fn log_dir(&self) -> Option<PathBuf> {
    self.log_dir.clone()
  }

  /// The config file, if any, with command line overrides applied on top.
  pub(crate) fn load_config(&self) -> Result<Config> {
    let mut config = match &self.config {
      Some(path) => Config::load(path)?,
      None => Config::default(),
    };

    if let Some(rpc_url) = &self.rpc_url {
      config.chain.rpc = rpc_url.clone();
    }
    if let Some(rpc_user) = &self.rpc_user {
      config.chain.username = Some(rpc_user.clone());
    }
    if let Some(rpc_pass) = &self.rpc_pass {
      config.chain.password = Some(rpc_pass.clone());
    }
    if let Some(ord_rpc) = &self.ord_rpc {
      config.chain.ord_rpc = ord_rpc.clone();
    }
    if let Some(ordinals_rpc) = &self.ordinals_rpc {
      config.chain.ordinals_rpc = ordinals_rpc.clone();
    }
    if let Some(output) = &self.output {
      config.output.path = output.clone();
    }
    Ok(config)
  }
}

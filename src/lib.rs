#![allow(
  clippy::too_many_arguments,
  clippy::type_complexity,
  clippy::result_large_err
)]
#![deny(
  clippy::cast_lossless,
  clippy::cast_possible_truncation,
  clippy::cast_possible_wrap,
  clippy::cast_sign_loss
)]

use {
  self::{
    arguments::Arguments,
    chain::Chain,
    config::Config,
    explorer::{
      holder::{run_holder_recount, RECOUNT_INTERVAL},
      Explorer,
    },
    ledger::MemoryLedger,
    model::DbModelEvent,
    options::Options,
    sink::{BlockWriter, FileStore},
    subcommand::{Subcommand, SubcommandResult},
  },
  anyhow::Error,
  clap::Parser,
  serde::Serialize,
  std::{
    env, io, process,
    sync::{
      atomic::{self, AtomicBool},
      Arc,
    },
  },
  tokio::runtime::Runtime,
};

pub use self::num::Num;

mod arguments;
pub mod chain;
pub mod client;
pub mod config;
pub mod explorer;
pub mod ledger;
mod logger;
pub mod model;
pub mod num;
mod options;
pub mod sink;
mod subcommand;

type Result<T = (), E = Error> = std::result::Result<T, E>;

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

pub fn main() {
  let args = Arguments::parse();
  let log_level = match args.options.log_level() {
    Ok(level) => level,
    Err(e) => panic!("get log level error: {}", e),
  };
  if let Err(e) = logger::init(log_level, args.options.log_dir()) {
    panic!("initialize logger error: {}", e);
  }

  if let Err(e) = ctrlc::set_handler(move || {
    if SHUTTING_DOWN.fetch_or(true, atomic::Ordering::Relaxed) {
      process::exit(1);
    }

    println!("Shutting down gracefully. Press <CTRL-C> again to shutdown immediately.");
  }) {
    log::warn!("setting <CTRL-C> handler failed: {e}");
  }

  match args.run() {
    Err(err) => {
      eprintln!("error: {err}");
      err
        .chain()
        .skip(1)
        .for_each(|cause| eprintln!("because: {cause}"));
      if env::var_os("RUST_BACKTRACE")
        .map(|val| val == "1")
        .unwrap_or_default()
      {
        eprintln!("{}", err.backtrace());
      }

      process::exit(1);
    }
    Ok(output) => output.print_json(),
  }
}

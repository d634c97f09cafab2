use super::*;

mod block;
mod height;
mod sync;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
  #[clap(about = "Print the reconciled chain height")]
  Height,
  #[clap(about = "Process one block and print its records")]
  Block(block::Block),
  #[clap(about = "Scan blocks continuously and write their records")]
  Sync,
}

impl Subcommand {
  pub(crate) fn run(self, options: Options) -> SubcommandResult {
    let config = options.load_config()?;
    match self {
      Self::Height => height::run(config),
      Self::Block(block) => block.run(config),
      Self::Sync => sync::run(config),
    }
  }
}

pub(crate) trait Output: Send {
  fn print_json(&self);
}

impl<T> Output for T
where
  T: Serialize + Send,
{
  fn print_json(&self) {
    if let Err(e) = serde_json::to_writer_pretty(io::stdout(), self) {
      log::error!("print output err[{e}]");
    }
    println!();
  }
}

pub(crate) type SubcommandResult = Result<Box<dyn Output>>;

fn chain(config: &Config) -> Result<Chain> {
  Ok(Chain::new(
    &config.chain,
    config.scan.request_timeout(),
    config.scan.settle_window(),
  )?)
}

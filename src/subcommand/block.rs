use super::*;

#[derive(Debug, Parser)]
pub(crate) struct Block {
  #[arg(help = "Process block at <HEIGHT>.")]
  height: u64,
}

#[derive(Debug, Serialize)]
pub struct Output {
  pub height: u64,
  pub hash: String,
  pub records: Vec<DbModelEvent>,
}

impl Block {
  pub(crate) fn run(self, config: Config) -> SubcommandResult {
    Runtime::new()?.block_on(self.process(config))
  }

  async fn process(self, config: Config) -> SubcommandResult {
    let chain = Arc::new(chain(&config)?);
    let explorer = Explorer::new(
      &config.chain.chain_name,
      chain.clone(),
      Arc::new(MemoryLedger::new()),
    )
    .with_prefetch_permits(config.scan.prefetch_permits);

    let block = chain.block_by_number(self.height).await?;
    let records = explorer.handle_block(&block).await?;

    Ok(Box::new(Output {
      height: block.number,
      hash: block.hash,
      records,
    }))
  }
}

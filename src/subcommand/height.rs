use super::*;

#[derive(Debug, Serialize)]
pub struct Output {
  pub chain: String,
  pub height: u64,
  pub runes_height: Option<u64>,
}

pub(crate) fn run(config: Config) -> SubcommandResult {
  Runtime::new()?.block_on(query(config))
}

async fn query(config: Config) -> SubcommandResult {
  let chain = chain(&config)?;
  let height = chain.block_number().await?;
  let runes_height = if config.chain.ordinals_rpc.is_empty() {
    None
  } else {
    Some(chain.runes_height().await?)
  };

  Ok(Box::new(Output {
    chain: config.chain.chain_name,
    height,
    runes_height,
  }))
}

use super::*;

#[derive(Debug, Serialize)]
pub struct Output {
  pub chain: String,
  pub last_block: Option<u64>,
}

pub(crate) fn run(config: Config) -> SubcommandResult {
  Runtime::new()?.block_on(scan(config))
}

fn shutting_down() -> bool {
  SHUTTING_DOWN.load(atomic::Ordering::Relaxed)
}

async fn scan(config: Config) -> SubcommandResult {
  let chain = Arc::new(chain(&config)?);
  let ledger = Arc::new(MemoryLedger::new());
  let explorer = Explorer::new(&config.chain.chain_name, chain.clone(), ledger.clone())
    .with_prefetch_permits(config.scan.prefetch_permits);
  let writer = BlockWriter::spawn(
    &config.chain.chain_name,
    FileStore::open(&config.output.path)?,
  );
  let recount = tokio::spawn(run_holder_recount(ledger, RECOUNT_INTERVAL));

  let mut next = config.scan.start_block;
  log::info!(
    "chain[{}] scan from block[{next}] output[{}]",
    config.chain.chain_name,
    config.output.path.display()
  );

  while !shutting_down() {
    match chain.block_number().await {
      Ok(height) => {
        while next <= height && !shutting_down() {
          let block = match chain.block_by_number(next).await {
            Ok(block) => block,
            Err(e) => {
              log::error!("get block[{next}] err[{e}]");
              break;
            }
          };
          let records = match explorer.handle_block(&block).await {
            Ok(records) => records,
            Err(e) => {
              log::error!("handle block[{next}] err[{e}], retry later");
              break;
            }
          };
          writer.submit(next, records).await?;
          next += 1;
        }
      }
      Err(e) => log::error!("get block number err[{e}]"),
    }

    if !shutting_down() {
      tokio::time::sleep(config.scan.poll_interval()).await;
    }
  }

  recount.abort();
  writer.close().await?;
  log::info!("chain[{}] scan stopped before block[{next}]", config.chain.chain_name);

  Ok(Box::new(Output {
    chain: config.chain.chain_name,
    last_block: next.checked_sub(1).filter(|last| *last >= config.scan.start_block),
  }))
}

use self::{
  balance::{prefetch, touched_pairs, RemoteBalances},
  builder::{
    build_address_tx, build_balance, build_inscription, build_inscription_stats, build_tx,
    build_utxo, EventContext,
  },
};
use crate::{
  chain::{ChainSource, RpcBlock},
  client::{self, types::BlockEvent},
  ledger::LedgerCache,
  model::{DbModelEvent, TxEvent, PROTOCOL_BRC20},
  num::{Num, NumError},
};
use std::{collections::HashMap, sync::Arc, time::Instant};

mod balance;
mod builder;
mod cache;
pub mod holder;

/// Concurrent balance lookups allowed while prefetching one block.
pub const PREFETCH_PERMITS: usize = 20;

/// Block processing is all or nothing; callers only learn that it failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("internal error")]
  Internal,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BuildError<E> {
  #[error("ledger error: {0}")]
  Ledger(E),

  #[error("chain source error: {0}")]
  Source(#[from] client::Error),

  #[error("invalid event amount: {0}")]
  Amount(#[from] NumError),

  #[error("tx {0} not found in block")]
  TxNotFound(String),

  #[error("inscription {0} not found")]
  InscriptionNotFound(String),

  #[error("tick {0} has no cached inscription")]
  TickNotCached(String),

  #[error("abnormal user balance. address[{address}] amount[{amount}]")]
  AbnormalBalance { address: String, amount: Num },
}

/// Turns the token events of a block into the rows the store needs, keeping the
/// ledger cache in step.
pub struct Explorer<S: ?Sized, L> {
  chain_name: String,
  source: Arc<S>,
  ledger: Arc<L>,
  permits: usize,
}

impl<S, L> Explorer<S, L>
where
  S: ChainSource + ?Sized,
  L: LedgerCache,
{
  pub fn new(chain_name: &str, source: Arc<S>, ledger: Arc<L>) -> Self {
    Self {
      chain_name: chain_name.to_string(),
      source,
      ledger,
      permits: PREFETCH_PERMITS,
    }
  }

  pub fn with_prefetch_permits(mut self, permits: usize) -> Self {
    self.permits = permits;
    self
  }

  pub fn ledger(&self) -> &Arc<L> {
    &self.ledger
  }

  /// Cache changes of a block that fails are rolled back, so the same block
  /// can be handled again.
  pub async fn handle_block(&self, block: &RpcBlock) -> Result<Vec<DbModelEvent>, Error> {
    let start = Instant::now();
    self.ledger.begin_block().map_err(|e| {
      log::error!("begin block[{}] err[{e}]", block.number);
      Error::Internal
    })?;
    let records = match self.build_block(block).await {
      Ok(records) => {
        self.ledger.commit_block().map_err(|e| {
          log::error!("commit block[{}] err[{e}]", block.number);
          Error::Internal
        })?;
        records
      }
      Err(e) => {
        log::error!("handle block[{}] hash[{}] err[{e}]", block.number, block.hash);
        if let Err(e) = self.ledger.rollback_block() {
          log::error!("rollback block[{}] err[{e}]", block.number);
        }
        return Err(Error::Internal);
      }
    };
    log::info!(
      "handle tx use time [{:?}] block[{}] records[{}]",
      start.elapsed(),
      block.number,
      records.len()
    );
    Ok(records)
  }

  async fn build_block(&self, block: &RpcBlock) -> Result<Vec<DbModelEvent>, BuildError<L::Error>> {
    let positions = block
      .rpc_txs
      .iter()
      .enumerate()
      .map(|(position, tx)| (tx.txid.to_string(), position))
      .collect::<HashMap<_, _>>();

    let remote = prefetch(self.source.as_ref(), touched_pairs(block), self.permits).await?;

    let mut records = Vec::new();
    for tx in &block.txs {
      let position = *positions
        .get(&tx.txid)
        .ok_or_else(|| BuildError::TxNotFound(tx.txid.clone()))?;

      for event in &tx.events {
        let (from, to) = (event.from.address(), event.to.address());
        if !event.valid || from.is_empty() || to.is_empty() {
          continue;
        }
        records.push(
          self
            .build_model(block, position, &tx.txid, event, &remote)
            .await?,
        );
      }
    }
    Ok(records)
  }

  async fn build_model(
    &self,
    block: &RpcBlock,
    position: usize,
    txid: &str,
    event: &BlockEvent,
    remote: &RemoteBalances,
  ) -> Result<DbModelEvent, BuildError<L::Error>> {
    let ledger = self.ledger.as_ref();
    let tick = event.tick.to_lowercase();
    let (from, to) = (event.from.address(), event.to.address());
    let op = TxEvent::from_operate(&event.event);
    let amount = Num::from_raw_amount(&event.amount)?;

    let exists = |address: &str| {
      ledger
        .get_balance(PROTOCOL_BRC20, &tick, address)
        .map(|item| item.is_some())
        .map_err(BuildError::Ledger)
    };
    let from_ok = exists(from)?;
    let to_ok = exists(to)?;

    let mut deploy = None;
    match op {
      TxEvent::Deploy => {
        let inscription = self
          .source
          .deploy_inscription(&event.inscription_id)
          .await?
          .ok_or_else(|| BuildError::InscriptionNotFound(event.inscription_id.clone()))?;
        cache::update_deploy(ledger, &tick, &inscription).map_err(BuildError::Ledger)?;
        deploy = Some(inscription);
      }
      TxEvent::Mint => cache::update_mint(ledger, &tick, to, &amount).map_err(BuildError::Ledger)?,
      TxEvent::Transfer => {
        let delta =
          cache::update_transfer(ledger, &tick, from, to, &amount).map_err(BuildError::Ledger)?;
        if delta != 0 {
          log::debug!("tick[{tick}] holder delta[{delta}] left to recount");
        }
      }
      TxEvent::InscribeTransfer => cache::update_inscribe_transfer(
        ledger,
        &tick,
        to,
        txid,
        &event.inscription_id,
        &amount,
      )
      .map_err(BuildError::Ledger)?,
      _ => {}
    }

    let ctx = EventContext {
      chain: &self.chain_name,
      block,
      position,
      txid,
      event,
      op,
      tick,
      from,
      to,
      amount,
      from_ok,
      to_ok,
    };

    let mut model = DbModelEvent::new(build_tx(&ctx));
    model.inscription = build_inscription(&ctx, ledger, deploy.as_ref())?;
    model.inscription_stats = build_inscription_stats(&ctx, ledger)?;
    build_balance(&ctx, ledger, self.source.as_ref(), remote, &mut model).await?;
    model.address_txs = build_address_tx(&ctx);
    model.utxos.extend(build_utxo(&ctx));
    Ok(model)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    chain::AddressBalance,
    client::{
      ord::DeployInscription,
      types::{ScriptPubkey, TxEvents},
    },
    ledger::MemoryLedger,
    model::{DbAction, UtxoStatus},
  };
  use async_trait::async_trait;
  use bitcoincore_rpc::json::GetRawTransactionResult;
  use pretty_assertions::assert_eq;
  use std::sync::Mutex;

  fn amount(n: u64) -> String {
    format!("{n}000000000000000000")
  }

  /// Fixed remote answers; records every balance query.
  #[derive(Default)]
  struct StubSource {
    balances: HashMap<String, (u64, u64)>,
    fail: bool,
    queries: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl ChainSource for StubSource {
    async fn address_balance(
      &self,
      tick: &str,
      address: &str,
    ) -> Result<AddressBalance, client::Error> {
      self.queries.lock().unwrap().push(address.to_string());
      if self.fail {
        return Err(client::Error::Status {
          status: 503,
          url: address.to_string(),
        });
      }
      let (overall, available) = self.balances.get(address).copied().unwrap_or_default();
      Ok(AddressBalance {
        address: address.to_string(),
        tick: tick.to_string(),
        overall: Num::from(overall),
        available: Num::from(available),
      })
    }

    async fn deploy_inscription(
      &self,
      inscription_id: &str,
    ) -> Result<Option<DeployInscription>, client::Error> {
      Ok(Some(DeployInscription {
        id: inscription_id.to_string(),
        tick: "ORDI".into(),
        limit_per_mint: Num::from(1000u64),
        total_supply: Num::from(2000u64),
        decimals: 18,
        owner: "bc1qowner".into(),
      }))
    }
  }

  fn txid(n: u64) -> String {
    format!("{n:064x}")
  }

  fn raw_tx(n: u64) -> GetRawTransactionResult {
    serde_json::from_value(crate::client::fetcher::tests::raw_tx_json(&txid(n))).unwrap()
  }

  fn event(op: &str, from: &str, to: &str, amount: &str, inscription_id: &str) -> BlockEvent {
    BlockEvent {
      event: op.into(),
      tick: "ORDI".into(),
      inscription_id: inscription_id.into(),
      amount: amount.into(),
      from: ScriptPubkey::from(from),
      to: ScriptPubkey::from(to),
      valid: true,
      ..Default::default()
    }
  }

  fn block(number: u64, txs: Vec<(u64, Vec<BlockEvent>)>) -> RpcBlock {
    RpcBlock {
      number,
      hash: format!("{number:064x}"),
      time: 1700000000 + number,
      parent_hash: String::new(),
      tx_hash: "merkle".into(),
      rpc_txs: txs.iter().map(|(n, _)| raw_tx(*n)).collect(),
      txs: txs
        .into_iter()
        .map(|(n, events)| TxEvents {
          txid: txid(n),
          events,
        })
        .collect(),
    }
  }

  fn explorer(source: StubSource) -> Explorer<StubSource, MemoryLedger> {
    Explorer::new("btc", Arc::new(source), Arc::new(MemoryLedger::new()))
  }

  fn deploy_block() -> RpcBlock {
    block(
      100,
      vec![(1, vec![event("deploy", "bc1qowner", "bc1qowner", "", "d0i0")])],
    )
  }

  fn cached(explorer: &Explorer<StubSource, MemoryLedger>, address: &str) -> (Num, Num) {
    let item = explorer
      .ledger()
      .get_balance(PROTOCOL_BRC20, "ordi", address)
      .unwrap()
      .unwrap();
    (item.available, item.overall)
  }

  #[tokio::test]
  async fn test_deploy_rows() {
    let explorer = explorer(StubSource::default());
    let records = explorer.handle_block(&deploy_block()).await.unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.tx.tick, "ordi");
    assert_eq!(record.tx.position_in_block, 0);
    let inscription = record.inscription.as_ref().unwrap();
    assert_eq!(inscription.action, DbAction::Create);
    assert_eq!(inscription.row.name, "ORDI");
    assert_eq!(inscription.row.deploy_hash, txid(1));
    let stats = record.inscription_stats.as_ref().unwrap();
    assert_eq!(stats.action, DbAction::Create);
    assert_eq!(stats.row.tx_cnt, 1);
    assert!(record.balances.is_empty());
    assert_eq!(record.address_txs.len(), 1);
  }

  #[tokio::test]
  async fn test_mint_rows_are_stable_across_runs() {
    let run = || async {
      let source = StubSource {
        balances: HashMap::from([("bc1qa".to_string(), (1000, 1000))]),
        ..Default::default()
      };
      let explorer = explorer(source);
      explorer.handle_block(&deploy_block()).await.unwrap();
      let records = explorer
        .handle_block(&block(
          101,
          vec![(2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")])],
        ))
        .await
        .unwrap();
      serde_json::to_string(&(&records[0].balance_txns, &records[0].balances)).unwrap()
    };

    let first = run().await;
    assert_eq!(first, run().await);

    let value: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(value[0][0]["amount"], "1000");
    assert_eq!(value[0][0]["balance"], "1000");
    assert_eq!(value[1][0]["action"], "Create");
    assert_eq!(value[1][0]["balance"], "1000");
  }

  #[tokio::test]
  async fn test_mint_stats_mark_first_and_last_block() {
    let explorer = explorer(StubSource::default());
    explorer.handle_block(&deploy_block()).await.unwrap();

    let records = explorer
      .handle_block(&block(
        101,
        vec![
          (2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")]),
          (3, vec![event("mint", "bc1qb", "bc1qb", &amount(1000), "m1i0")]),
        ],
      ))
      .await
      .unwrap();

    let first = &records[0].inscription_stats.as_ref().unwrap().row;
    assert_eq!(first.mint_first_block, Some(101));
    assert_eq!(first.mint_last_block, None);
    let last = &records[1].inscription_stats.as_ref().unwrap().row;
    assert_eq!(last.mint_first_block, None);
    assert_eq!(last.mint_last_block, Some(101));
    assert!(last.mint_completed_time.is_some());
    assert_eq!(last.holders, 2);
    assert_eq!(records[1].tx.position_in_block, 1);
  }

  #[tokio::test]
  async fn test_transfer_moves_balance() {
    let explorer = explorer(StubSource::default());
    explorer.handle_block(&deploy_block()).await.unwrap();
    explorer
      .handle_block(&block(
        101,
        vec![
          (2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")]),
          (3, vec![event("inscribeTransfer", "bc1qa", "bc1qa", &amount(300), "t0i0")]),
        ],
      ))
      .await
      .unwrap();

    let (_, before) = cached(&explorer, "bc1qa");
    let records = explorer
      .handle_block(&block(
        102,
        vec![(4, vec![event("transfer", "bc1qa", "bc1qb", &amount(300), "t0i0")])],
      ))
      .await
      .unwrap();

    let (_, sender) = cached(&explorer, "bc1qa");
    let (_, receiver) = cached(&explorer, "bc1qb");
    assert_eq!(&sender + &receiver, before);
    assert_eq!(receiver, Num::from(300u64));

    let record = &records[0];
    assert_eq!(record.balance_txns.len(), 2);
    assert_eq!(record.balance_txns[0].address, "bc1qb");
    assert_eq!(record.balance_txns[1].address, "bc1qa");
    assert_eq!(record.balance_txns[1].amount, -Num::from(300u64));
    assert_eq!(record.balances[0].action, DbAction::Create);
    assert_eq!(record.balances[1].action, DbAction::Update);
    assert_eq!(record.address_txs.len(), 2);
    assert_eq!(record.utxos[0].action, DbAction::Update);
    assert_eq!(record.utxos[0].row.status, UtxoStatus::Spent);
    assert_eq!(record.utxos[0].row.address, "bc1qa");
  }

  #[tokio::test]
  async fn test_inscribe_transfer_locks_available() {
    let explorer = explorer(StubSource::default());
    explorer.handle_block(&deploy_block()).await.unwrap();
    explorer
      .handle_block(&block(
        101,
        vec![(2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")])],
      ))
      .await
      .unwrap();

    let records = explorer
      .handle_block(&block(
        102,
        vec![(3, vec![event("inscribeTransfer", "bc1qa", "bc1qa", &amount(400), "t0i0")])],
      ))
      .await
      .unwrap();

    assert_eq!(cached(&explorer, "bc1qa"), (Num::from(600u64), Num::from(1000u64)));
    let utxos = &records[0].utxos;
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].action, DbAction::Create);
    assert_eq!(utxos[0].row.status, UtxoStatus::Unspent);
    assert_eq!(utxos[0].row.sn, "t0i0");
    assert_eq!(utxos[0].row.root_hash, "merkle");
    assert_eq!(records[0].address_txs.len(), 1);
  }

  #[tokio::test]
  async fn test_inscribe_transfer_without_balance_aborts_block() {
    let explorer = explorer(StubSource::default());
    explorer.handle_block(&deploy_block()).await.unwrap();

    let result = explorer
      .handle_block(&block(
        101,
        vec![(2, vec![event("inscribeTransfer", "bc1qz", "bc1qz", &amount(5), "t0i0")])],
      ))
      .await;
    assert!(matches!(result, Err(Error::Internal)));
  }

  #[tokio::test]
  async fn test_failed_block_leaves_cache_untouched_on_retry() {
    let explorer = explorer(StubSource::default());
    explorer.handle_block(&deploy_block()).await.unwrap();

    let failing = block(
      101,
      vec![
        (2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")]),
        (3, vec![event("inscribeTransfer", "bc1qz", "bc1qz", &amount(5), "t0i0")]),
      ],
    );
    for _ in 0..2 {
      assert!(matches!(
        explorer.handle_block(&failing).await,
        Err(Error::Internal)
      ));
    }

    let ledger = explorer.ledger();
    let stats = ledger.get_stats(PROTOCOL_BRC20, "ordi").unwrap().unwrap();
    assert_eq!(stats.minted, Num::zero());
    assert_eq!(stats.tx_cnt, 1);
    assert!(ledger.get_balance(PROTOCOL_BRC20, "ordi", "bc1qa").unwrap().is_none());
    assert!(ledger.get_balance(PROTOCOL_BRC20, "ordi", "bc1qz").unwrap().is_none());
    assert!(ledger.utxos().unwrap().is_empty());

    explorer
      .handle_block(&block(
        101,
        vec![(2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")])],
      ))
      .await
      .unwrap();
    assert_eq!(cached(&explorer, "bc1qa"), (Num::from(1000u64), Num::from(1000u64)));
    let stats = ledger.get_stats(PROTOCOL_BRC20, "ordi").unwrap().unwrap();
    assert_eq!(stats.minted, Num::from(1000u64));
  }

  #[tokio::test]
  async fn test_prefetch_failure_aborts_block() {
    let source = StubSource {
      fail: true,
      ..Default::default()
    };
    let explorer = explorer(source);
    explorer.handle_block(&deploy_block()).await.unwrap();

    let result = explorer
      .handle_block(&block(
        101,
        vec![(2, vec![event("mint", "bc1qa", "bc1qa", &amount(1000), "m0i0")])],
      ))
      .await;
    assert!(matches!(result, Err(Error::Internal)));
  }

  #[tokio::test]
  async fn test_event_without_raw_tx_aborts_block() {
    let explorer = explorer(StubSource::default());
    let mut block = deploy_block();
    block.rpc_txs.clear();
    assert!(matches!(
      explorer.handle_block(&block).await,
      Err(Error::Internal)
    ));
  }

  #[tokio::test]
  async fn test_unprefetched_sender_reads_receiver_totals() {
    let source = StubSource {
      balances: HashMap::from([
        ("bc1qa".to_string(), (700, 700)),
        ("bc1qb".to_string(), (300, 300)),
      ]),
      ..Default::default()
    };
    let ledger = MemoryLedger::new();
    ledger
      .create_balance(PROTOCOL_BRC20, "ordi", "bc1qa", Num::from(1000u64), Num::from(1000u64))
      .unwrap();

    let block = block(102, vec![]);
    let event = event("transfer", "bc1qa", "bc1qb", &amount(300), "t0i0");
    let ctx = EventContext {
      chain: "btc",
      block: &block,
      position: 0,
      txid: "t0",
      event: &event,
      op: TxEvent::Transfer,
      tick: "ordi".to_string(),
      from: "bc1qa",
      to: "bc1qb",
      amount: Num::from(300u64),
      from_ok: true,
      to_ok: false,
    };
    let mut model = DbModelEvent::new(build_tx(&ctx));
    build_balance(&ctx, &ledger, &source, &RemoteBalances::new(), &mut model)
      .await
      .unwrap();

    assert_eq!(*source.queries.lock().unwrap(), vec!["bc1qb", "bc1qb"]);
    assert_eq!(model.balances.len(), 2);
    let sender = &model.balances[1];
    assert_eq!(sender.action, DbAction::Update);
    assert_eq!(sender.row.address, "bc1qa");
    assert_eq!(sender.row.balance, Num::from(300u64));
  }

  #[tokio::test]
  async fn test_invalid_and_addressless_events_are_skipped() {
    let explorer = explorer(StubSource::default());
    let mut invalid = event("mint", "bc1qa", "bc1qa", &amount(1), "m0i0");
    invalid.valid = false;
    let mut addressless = event("mint", "bc1qa", "bc1qa", &amount(1), "m1i0");
    addressless.to = ScriptPubkey::NonStandard("6a".into());

    let records = explorer
      .handle_block(&block(101, vec![(2, vec![invalid, addressless])]))
      .await
      .unwrap();
    assert!(records.is_empty());
    assert!(explorer.source.queries.lock().unwrap().is_empty());
  }
}

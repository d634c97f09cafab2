use crate::{
  chain::{AddressBalance, ChainSource, RpcBlock},
  client,
  model::TxEvent,
};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Semaphore;

/// Lower-cased tick and address.
pub(crate) type BalanceKey = (String, String);

pub(crate) type RemoteBalances = HashMap<BalanceKey, AddressBalance>;

pub(crate) fn balance_key(tick: &str, address: &str) -> BalanceKey {
  (tick.to_lowercase(), address.to_string())
}

/// Every (tick, address) pair a block's valid non-deploy events touch, in key order.
pub(crate) fn touched_pairs(block: &RpcBlock) -> BTreeSet<BalanceKey> {
  let mut pairs = BTreeSet::new();
  for event in block.txs.iter().flat_map(|tx| tx.events.iter()) {
    let (from, to) = (event.from.address(), event.to.address());
    if !event.valid || from.is_empty() || to.is_empty() {
      continue;
    }
    if TxEvent::from_operate(&event.event) == TxEvent::Deploy {
      continue;
    }
    pairs.insert(balance_key(&event.tick, from));
    pairs.insert(balance_key(&event.tick, to));
  }
  pairs
}

/// Fetches all pairs concurrently with at most `permits` requests in flight.
/// Every fetch is awaited; the first failure in key order is returned.
pub(crate) async fn prefetch<S: ChainSource + ?Sized>(
  source: &S,
  pairs: BTreeSet<BalanceKey>,
  permits: usize,
) -> Result<RemoteBalances, client::Error> {
  let semaphore = Semaphore::new(permits.max(1));

  let results = join_all(pairs.into_iter().map(|(tick, address)| {
    let semaphore = &semaphore;
    async move {
      let _permit = semaphore.acquire().await.ok();
      let balance = source.address_balance(&tick, &address).await.map_err(|e| {
        log::error!("get address balance tick[{tick}] address[{address}] err[{e}]");
        e
      })?;
      Ok::<_, client::Error>(((tick, address), balance))
    }
  }))
  .await;

  results.into_iter().collect()
}

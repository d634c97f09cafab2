use crate::{
  ledger::{HolderSource, InsStatsUpdate},
  model::PROTOCOL_BRC20,
};
use std::{sync::Arc, time::Duration};

pub const RECOUNT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Overwrites the holder figure of every cached tick with a fresh count of
/// addresses holding a positive overall balance. Returns how many ticks were updated.
pub fn recount_holders<L: HolderSource + ?Sized>(ledger: &L) -> usize {
  let ticks = match ledger.ticks(PROTOCOL_BRC20) {
    Ok(ticks) => ticks,
    Err(e) => {
      log::error!("list ticks for holder recount err[{e}]");
      return 0;
    }
  };

  let mut updated = 0;
  for tick in ticks {
    let holders = match ledger.holder_count(PROTOCOL_BRC20, &tick) {
      Ok(holders) => holders,
      Err(e) => {
        log::error!("count holders tick[{tick}] err[{e}]");
        continue;
      }
    };

    match ledger.get_stats(PROTOCOL_BRC20, &tick) {
      Ok(Some(_)) => {}
      Ok(None) => continue,
      Err(e) => {
        log::error!("get stats tick[{tick}] err[{e}]");
        continue;
      }
    }

    let update = InsStatsUpdate {
      holders: Some(holders),
      ..Default::default()
    };
    if let Err(e) = ledger.update_stats(PROTOCOL_BRC20, &tick, update) {
      log::error!("update holders tick[{tick}] err[{e}]");
      continue;
    }
    updated += 1;
  }
  updated
}

/// Runs [`recount_holders`] once at start and then every `interval` until the
/// task is dropped.
pub async fn run_holder_recount<L: HolderSource + ?Sized>(ledger: Arc<L>, interval: Duration) {
  let mut ticker = tokio::time::interval(interval);
  loop {
    ticker.tick().await;
    let updated = recount_holders(ledger.as_ref());
    log::info!("holder recount updated ticks[{updated}]");
  }
}

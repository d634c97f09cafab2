use super::{BalanceItem, HolderSource, InsStats, InsStatsUpdate, LedgerCache, TickInfo, UtxoEntry};
use crate::num::Num;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
  },
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("ledger {0} lock poisoned")]
  Poisoned(&'static str),
}

type TickKey = (String, String);
type BalanceKey = (String, String, String);

/// Prior value of one entry touched inside an open block.
#[derive(Debug)]
enum Undo {
  Balance(BalanceKey, Option<BalanceItem>),
  Stats(TickKey, Option<InsStats>),
  Inscription(TickKey, Option<TickInfo>),
  Utxos(usize),
}

fn tick_key(protocol: &str, tick: &str) -> TickKey {
  (protocol.to_string(), tick.to_lowercase())
}

fn balance_key(protocol: &str, tick: &str, address: &str) -> BalanceKey {
  (protocol.to_string(), tick.to_lowercase(), address.to_string())
}

/// In-process ledger cache. Each keyspace sits behind its own lock so reads of
/// one never wait on writes to another.
///
/// While a block is open the prior value of every touched entry is journaled,
/// and a rollback restores them in reverse order. Sids handed out inside a
/// rolled back block are not reused.
#[derive(Debug, Default)]
pub struct MemoryLedger {
  next_sid: AtomicU64,
  balances: RwLock<HashMap<BalanceKey, BalanceItem>>,
  stats: RwLock<HashMap<TickKey, InsStats>>,
  inscriptions: RwLock<HashMap<TickKey, TickInfo>>,
  utxos: RwLock<Vec<UtxoEntry>>,
  journal: Mutex<Option<Vec<Undo>>>,
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> Result<RwLockReadGuard<'a, T>, Error> {
  lock.read().map_err(|_| Error::Poisoned(name))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> Result<RwLockWriteGuard<'a, T>, Error> {
  lock.write().map_err(|_| Error::Poisoned(name))
}

impl MemoryLedger {
  pub fn new() -> Self {
    Self::default()
  }

  fn sid(&self) -> u64 {
    self.next_sid.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn record(&self, undo: impl FnOnce() -> Undo) -> Result<(), Error> {
    let mut journal = self.journal.lock().map_err(|_| Error::Poisoned("journal"))?;
    if let Some(entries) = journal.as_mut() {
      entries.push(undo());
    }
    Ok(())
  }

  fn take_journal(&self) -> Result<Vec<Undo>, Error> {
    let mut journal = self.journal.lock().map_err(|_| Error::Poisoned("journal"))?;
    Ok(journal.take().unwrap_or_default())
  }

  fn modify_stats(
    &self,
    protocol: &str,
    tick: &str,
    f: impl FnOnce(&mut InsStats),
  ) -> Result<(), Error> {
    let key = tick_key(protocol, tick);
    let mut stats = write(&self.stats, "stats")?;
    match stats.get_mut(&key) {
      Some(item) => {
        self.record(|| Undo::Stats(key, Some(item.clone())))?;
        f(item)
      }
      None => log::debug!("stats of tick[{tick}] protocol[{protocol}] not cached"),
    }
    Ok(())
  }

  pub fn utxos(&self) -> Result<Vec<UtxoEntry>, Error> {
    Ok(read(&self.utxos, "utxos")?.clone())
  }
}

impl LedgerCache for MemoryLedger {
  type Error = Error;

  fn begin_block(&self) -> Result<(), Self::Error> {
    let mut journal = self.journal.lock().map_err(|_| Error::Poisoned("journal"))?;
    if journal.replace(Vec::new()).is_some() {
      log::warn!("begin block with an open journal, previous block changes kept");
    }
    Ok(())
  }

  fn commit_block(&self) -> Result<(), Self::Error> {
    self.take_journal().map(|_| ())
  }

  fn rollback_block(&self) -> Result<(), Self::Error> {
    let journal = self.take_journal()?;
    log::debug!("rollback block entries[{}]", journal.len());
    for undo in journal.into_iter().rev() {
      match undo {
        Undo::Balance(key, prior) => {
          let mut balances = write(&self.balances, "balances")?;
          match prior {
            Some(item) => balances.insert(key, item),
            None => balances.remove(&key),
          };
        }
        Undo::Stats(key, prior) => {
          let mut stats = write(&self.stats, "stats")?;
          match prior {
            Some(item) => stats.insert(key, item),
            None => stats.remove(&key),
          };
        }
        Undo::Inscription(key, prior) => {
          let mut inscriptions = write(&self.inscriptions, "inscriptions")?;
          match prior {
            Some(item) => inscriptions.insert(key, item),
            None => inscriptions.remove(&key),
          };
        }
        Undo::Utxos(len) => write(&self.utxos, "utxos")?.truncate(len),
      }
    }
    Ok(())
  }

  fn get_balance(
    &self,
    protocol: &str,
    tick: &str,
    address: &str,
  ) -> Result<Option<BalanceItem>, Self::Error> {
    Ok(
      read(&self.balances, "balances")?
        .get(&balance_key(protocol, tick, address))
        .cloned(),
    )
  }

  fn create_balance(
    &self,
    protocol: &str,
    tick: &str,
    address: &str,
    available: Num,
    overall: Num,
  ) -> Result<BalanceItem, Self::Error> {
    let item = BalanceItem {
      sid: self.sid(),
      available,
      overall,
    };
    let key = balance_key(protocol, tick, address);
    let mut balances = write(&self.balances, "balances")?;
    let prior = balances.insert(key.clone(), item.clone());
    self.record(|| Undo::Balance(key, prior))?;
    Ok(item)
  }

  fn update_balance(
    &self,
    protocol: &str,
    tick: &str,
    address: &str,
    available: Num,
    overall: Num,
  ) -> Result<(), Self::Error> {
    let key = balance_key(protocol, tick, address);
    let mut balances = write(&self.balances, "balances")?;
    let prior = balances.get(&key).cloned();
    self.record(|| Undo::Balance(key.clone(), prior))?;
    match balances.get_mut(&key) {
      Some(item) => {
        item.available = available;
        item.overall = overall;
      }
      None => {
        let item = BalanceItem {
          sid: self.sid(),
          available,
          overall,
        };
        balances.insert(key, item);
      }
    }
    Ok(())
  }

  fn get_stats(&self, protocol: &str, tick: &str) -> Result<Option<InsStats>, Self::Error> {
    Ok(read(&self.stats, "stats")?.get(&tick_key(protocol, tick)).cloned())
  }

  fn create_stats(
    &self,
    protocol: &str,
    tick: &str,
    seed: InsStats,
  ) -> Result<InsStats, Self::Error> {
    let item = InsStats {
      sid: self.sid(),
      ..seed
    };
    let key = tick_key(protocol, tick);
    let prior = write(&self.stats, "stats")?.insert(key.clone(), item.clone());
    self.record(|| Undo::Stats(key, prior))?;
    Ok(item)
  }

  fn mint_stats(&self, protocol: &str, tick: &str, amount: &Num) -> Result<(), Self::Error> {
    self.modify_stats(protocol, tick, |stats| {
      stats.minted = &stats.minted + amount;
    })
  }

  fn add_tx_cnt(&self, protocol: &str, tick: &str, delta: u64) -> Result<(), Self::Error> {
    self.modify_stats(protocol, tick, |stats| {
      stats.tx_cnt = stats.tx_cnt.saturating_add(delta);
    })
  }

  fn add_holders(&self, protocol: &str, tick: &str, delta: i64) -> Result<(), Self::Error> {
    self.modify_stats(protocol, tick, |stats| stats.holders += delta)
  }

  fn update_stats(
    &self,
    protocol: &str,
    tick: &str,
    update: InsStatsUpdate,
  ) -> Result<(), Self::Error> {
    self.modify_stats(protocol, tick, |stats| {
      if let Some(minted) = update.minted {
        stats.minted = minted;
      }
      if let Some(holders) = update.holders {
        stats.holders = holders;
      }
      if let Some(tx_cnt) = update.tx_cnt {
        stats.tx_cnt = tx_cnt;
      }
    })
  }

  fn get_inscription(&self, protocol: &str, tick: &str) -> Result<Option<TickInfo>, Self::Error> {
    Ok(
      read(&self.inscriptions, "inscriptions")?
        .get(&tick_key(protocol, tick))
        .cloned(),
    )
  }

  fn create_inscription(
    &self,
    protocol: &str,
    tick: &str,
    info: TickInfo,
  ) -> Result<TickInfo, Self::Error> {
    let item = TickInfo {
      sid: self.sid(),
      ..info
    };
    let key = tick_key(protocol, tick);
    let prior = write(&self.inscriptions, "inscriptions")?.insert(key.clone(), item.clone());
    self.record(|| Undo::Inscription(key, prior))?;
    Ok(item)
  }

  fn add_utxo(&self, entry: UtxoEntry) -> Result<(), Self::Error> {
    let mut utxos = write(&self.utxos, "utxos")?;
    self.record(|| Undo::Utxos(utxos.len()))?;
    utxos.push(entry);
    Ok(())
  }
}

impl HolderSource for MemoryLedger {
  fn ticks(&self, protocol: &str) -> Result<Vec<String>, Self::Error> {
    let mut ticks = read(&self.stats, "stats")?
      .keys()
      .filter(|(p, _)| p == protocol)
      .map(|(_, tick)| tick.clone())
      .collect::<Vec<_>>();
    ticks.sort();
    Ok(ticks)
  }

  fn holder_count(&self, protocol: &str, tick: &str) -> Result<i64, Self::Error> {
    let tick = tick.to_lowercase();
    let count = read(&self.balances, "balances")?
      .iter()
      .filter(|((p, t, _), item)| p == protocol && *t == tick && item.overall.is_positive())
      .count();
    Ok(i64::try_from(count).unwrap_or(i64::MAX))
  }
}

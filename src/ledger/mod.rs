use crate::num::Num;
use serde::Serialize;
use std::fmt::{Debug, Display};

pub mod memory;

pub use self::memory::MemoryLedger;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BalanceItem {
  pub sid: u64,
  pub available: Num,
  pub overall: Num,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct InsStats {
  pub sid: u64,
  pub minted: Num,
  pub holders: i64,
  pub tx_cnt: u64,
}

/// Partial overwrite of [`InsStats`]; `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsStatsUpdate {
  pub minted: Option<Num>,
  pub holders: Option<i64>,
  pub tx_cnt: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TickInfo {
  pub sid: u64,
  pub limit_per_mint: Num,
  pub total_supply: Num,
  pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtxoEntry {
  pub protocol: String,
  pub tick: String,
  pub tx_hash: String,
  pub address: String,
  pub amount: Num,
  pub inscription_id: String,
}

/// Running token state the explorer mutates event by event. Ticks are
/// case-insensitive in every keyspace.
///
/// Mutations made between [`LedgerCache::begin_block`] and
/// [`LedgerCache::commit_block`] belong to one block and are discarded as a
/// whole by [`LedgerCache::rollback_block`].
pub trait LedgerCache: Send + Sync {
  type Error: Debug + Display + Send + Sync;

  // block scope
  fn begin_block(&self) -> Result<(), Self::Error>;
  fn commit_block(&self) -> Result<(), Self::Error>;
  fn rollback_block(&self) -> Result<(), Self::Error>;

  // balance
  fn get_balance(
    &self,
    protocol: &str,
    tick: &str,
    address: &str,
  ) -> Result<Option<BalanceItem>, Self::Error>;
  fn create_balance(
    &self,
    protocol: &str,
    tick: &str,
    address: &str,
    available: Num,
    overall: Num,
  ) -> Result<BalanceItem, Self::Error>;
  fn update_balance(
    &self,
    protocol: &str,
    tick: &str,
    address: &str,
    available: Num,
    overall: Num,
  ) -> Result<(), Self::Error>;

  // inscription stats
  fn get_stats(&self, protocol: &str, tick: &str) -> Result<Option<InsStats>, Self::Error>;
  fn create_stats(&self, protocol: &str, tick: &str, seed: InsStats)
    -> Result<InsStats, Self::Error>;
  fn mint_stats(&self, protocol: &str, tick: &str, amount: &Num) -> Result<(), Self::Error>;
  fn add_tx_cnt(&self, protocol: &str, tick: &str, delta: u64) -> Result<(), Self::Error>;
  fn add_holders(&self, protocol: &str, tick: &str, delta: i64) -> Result<(), Self::Error>;
  fn update_stats(
    &self,
    protocol: &str,
    tick: &str,
    update: InsStatsUpdate,
  ) -> Result<(), Self::Error>;

  // inscription
  fn get_inscription(&self, protocol: &str, tick: &str) -> Result<Option<TickInfo>, Self::Error>;
  fn create_inscription(
    &self,
    protocol: &str,
    tick: &str,
    info: TickInfo,
  ) -> Result<TickInfo, Self::Error>;

  // utxo
  fn add_utxo(&self, entry: UtxoEntry) -> Result<(), Self::Error>;
}

/// Read side used by the periodic holder recount.
pub trait HolderSource: LedgerCache {
  fn ticks(&self, protocol: &str) -> Result<Vec<String>, Self::Error>;
  fn holder_count(&self, protocol: &str, tick: &str) -> Result<i64, Self::Error>;
}

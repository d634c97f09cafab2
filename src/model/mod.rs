use crate::num::Num;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

pub const PROTOCOL_BRC20: &str = "brc-20";

pub fn timestamp(seconds: u64) -> DateTime<Utc> {
  Utc
    .timestamp_opt(i64::try_from(seconds).unwrap_or(i64::MAX), 0)
    .single()
    .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DbAction {
  Create,
  Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
  Unknown,
  Deploy,
  Mint,
  Transfer,
  List,
  Delist,
  Exchange,
  InscribeTransfer,
}

impl TxEvent {
  pub fn from_operate(op: &str) -> Self {
    match op {
      "deploy" => Self::Deploy,
      "mint" => Self::Mint,
      "transfer" => Self::Transfer,
      "list" => Self::List,
      "delist" => Self::Delist,
      "exchange" => Self::Exchange,
      "inscribeTransfer" => Self::InscribeTransfer,
      _ => Self::Unknown,
    }
  }

  pub fn code(self) -> i32 {
    match self {
      Self::Unknown => 0,
      Self::Deploy => 1,
      Self::Mint => 2,
      Self::Transfer => 3,
      Self::List => 4,
      Self::Delist => 5,
      Self::Exchange => 6,
      Self::InscribeTransfer => 7,
    }
  }
}

impl Serialize for TxEvent {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_i32(self.code())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UtxoStatus {
  Unspent,
  Spent,
}

/// A row paired with the write it requires downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tagged<T> {
  pub action: DbAction,
  #[serde(flatten)]
  pub row: T,
}

impl<T> Tagged<T> {
  pub fn new(action: DbAction, row: T) -> Self {
    Self { action, row }
  }

  pub fn create(row: T) -> Self {
    Self::new(DbAction::Create, row)
  }

  pub fn update(row: T) -> Self {
    Self::new(DbAction::Update, row)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
  pub chain: String,
  pub protocol: String,
  pub block_height: u64,
  pub position_in_block: usize,
  pub block_time: DateTime<Utc>,
  pub tx_hash: String,
  pub from: String,
  pub to: String,
  pub op: String,
  pub tick: String,
  pub amount: Num,
  pub gas: u64,
  pub gas_price: u64,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inscriptions {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub name: String,
  pub limit_per_mint: Num,
  pub total_supply: Num,
  pub deploy_by: String,
  pub deploy_hash: String,
  pub deploy_time: DateTime<Utc>,
  pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InscriptionsStats {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub minted: Num,
  pub holders: i64,
  pub tx_cnt: u64,
  pub mint_first_block: Option<u64>,
  pub mint_last_block: Option<u64>,
  pub mint_completed_time: Option<DateTime<Utc>>,
}

/// Audit trail of one balance change, carrying the cache's running totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceTxn {
  pub chain: String,
  pub protocol: String,
  pub event: TxEvent,
  pub address: String,
  pub tick: String,
  pub amount: Num,
  pub balance: Num,
  pub available: Num,
  pub tx_hash: String,
  pub created_at: DateTime<Utc>,
}

/// Snapshot of an address balance as reported by the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balances {
  pub sid: u64,
  pub chain: String,
  pub protocol: String,
  pub address: String,
  pub tick: String,
  pub balance: Num,
  pub available: Num,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressTxs {
  pub event: TxEvent,
  pub address: String,
  pub amount: Num,
  pub tx_hash: String,
  pub tick: String,
  pub protocol: String,
  pub operate: String,
  pub chain: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utxo {
  pub chain: String,
  pub protocol: String,
  pub tick: String,
  pub sn: String,
  pub status: UtxoStatus,
  pub root_hash: String,
  pub address: String,
  pub amount: Num,
}

/// Everything one token event asks the store to write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbModelEvent {
  pub tx: Transaction,
  pub inscription: Option<Tagged<Inscriptions>>,
  pub inscription_stats: Option<Tagged<InscriptionsStats>>,
  pub balance_txns: Vec<BalanceTxn>,
  pub balances: Vec<Tagged<Balances>>,
  pub address_txs: Vec<AddressTxs>,
  pub utxos: Vec<Tagged<Utxo>>,
}

impl DbModelEvent {
  pub fn new(tx: Transaction) -> Self {
    Self {
      tx,
      inscription: None,
      inscription_stats: None,
      balance_txns: Vec::new(),
      balances: Vec::new(),
      address_txs: Vec::new(),
      utxos: Vec::new(),
    }
  }

  /// Queues a balance snapshot. A second `Create` for the same
  /// (tick, address, protocol, chain) replaces the first instead of doubling the insert.
  pub fn set_balances(&mut self, action: DbAction, balance: Balances) {
    if action == DbAction::Create {
      if let Some(existing) = self.balances.iter_mut().find(|item| {
        item.action == DbAction::Create
          && item.row.tick == balance.tick
          && item.row.address == balance.address
          && item.row.protocol == balance.protocol
          && item.row.chain == balance.chain
      }) {
        existing.row = balance;
        return;
      }
    }
    self.balances.push(Tagged::new(action, balance));
  }
}

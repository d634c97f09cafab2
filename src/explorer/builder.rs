use super::{
  balance::{balance_key, RemoteBalances},
  BuildError,
};
use crate::{
  chain::{AddressBalance, ChainSource, RpcBlock},
  client::{self, ord::DeployInscription, types::BlockEvent},
  ledger::{BalanceItem, LedgerCache},
  model::{
    timestamp, AddressTxs, BalanceTxn, Balances, DbAction, DbModelEvent, Inscriptions,
    InscriptionsStats, Tagged, Transaction, TxEvent, Utxo, UtxoStatus, PROTOCOL_BRC20,
  },
  num::Num,
};
use chrono::{DateTime, Utc};

/// One token event plus the block context every row needs.
pub(crate) struct EventContext<'a> {
  pub(crate) chain: &'a str,
  pub(crate) block: &'a RpcBlock,
  pub(crate) position: usize,
  pub(crate) txid: &'a str,
  pub(crate) event: &'a BlockEvent,
  pub(crate) op: TxEvent,
  pub(crate) tick: String,
  pub(crate) from: &'a str,
  pub(crate) to: &'a str,
  pub(crate) amount: Num,
  /// Whether the sender had a cached balance before this event touched the cache.
  pub(crate) from_ok: bool,
  pub(crate) to_ok: bool,
}

impl<'a> EventContext<'a> {
  fn block_time(&self) -> DateTime<Utc> {
    timestamp(self.block.time)
  }

  fn balance_txn(&self, address: &str, amount: Num, balance: Num, available: Num) -> BalanceTxn {
    BalanceTxn {
      chain: self.chain.to_string(),
      protocol: PROTOCOL_BRC20.to_string(),
      event: self.op,
      address: address.to_string(),
      tick: self.tick.clone(),
      amount,
      balance,
      available,
      tx_hash: self.txid.to_string(),
      created_at: self.block_time(),
    }
  }

  fn balances(&self, address: &str, sid: u64, remote: AddressBalance) -> Balances {
    Balances {
      sid,
      chain: self.chain.to_string(),
      protocol: PROTOCOL_BRC20.to_string(),
      address: address.to_string(),
      tick: self.tick.clone(),
      balance: remote.overall,
      available: remote.available,
    }
  }
}

fn action(existed: bool) -> DbAction {
  if existed {
    DbAction::Update
  } else {
    DbAction::Create
  }
}

/// Address queried when the sender of a transfer was not prefetched. This is
/// the receiver's address, so the sender row then carries the receiver's totals.
/// Block handling prefetches every sender of a valid event, so only direct
/// callers of [`build_balance`] with a partial prefetch reach this.
fn sender_fallback_address<'a>(ctx: &EventContext<'a>) -> &'a str {
  ctx.to
}

async fn remote_balance<S: ChainSource + ?Sized>(
  source: &S,
  remote: &RemoteBalances,
  tick: &str,
  address: &str,
  fallback_address: &str,
) -> Result<AddressBalance, client::Error> {
  if let Some(balance) = remote.get(&balance_key(tick, address)) {
    return Ok(balance.clone());
  }
  log::info!("balance of tick[{tick}] address[{address}] not prefetched, query[{fallback_address}]");
  source.address_balance(tick, fallback_address).await
}

fn balance_or_seed<L: LedgerCache + ?Sized>(
  ledger: &L,
  tick: &str,
  address: &str,
  amount: &Num,
) -> Result<BalanceItem, L::Error> {
  match ledger.get_balance(PROTOCOL_BRC20, tick, address)? {
    Some(item) => Ok(item),
    None => ledger.create_balance(PROTOCOL_BRC20, tick, address, amount.clone(), amount.clone()),
  }
}

pub(crate) fn build_tx(ctx: &EventContext) -> Transaction {
  Transaction {
    chain: ctx.chain.to_string(),
    protocol: PROTOCOL_BRC20.to_string(),
    block_height: ctx.block.number,
    position_in_block: ctx.position,
    block_time: ctx.block_time(),
    tx_hash: ctx.txid.to_string(),
    from: ctx.from.to_string(),
    to: ctx.to.to_string(),
    op: ctx.event.event.clone(),
    tick: ctx.tick.clone(),
    amount: ctx.amount.clone(),
    gas: 0,
    gas_price: 0,
    created_at: ctx.block_time(),
  }
}

pub(crate) fn build_inscription<L: LedgerCache + ?Sized>(
  ctx: &EventContext,
  ledger: &L,
  deploy: Option<&DeployInscription>,
) -> Result<Option<Tagged<Inscriptions>>, BuildError<L::Error>> {
  if ctx.op != TxEvent::Deploy {
    return Ok(None);
  }
  let deploy =
    deploy.ok_or_else(|| BuildError::InscriptionNotFound(ctx.event.inscription_id.clone()))?;
  let info = ledger
    .get_inscription(PROTOCOL_BRC20, &ctx.tick)
    .map_err(BuildError::Ledger)?
    .ok_or_else(|| BuildError::TickNotCached(ctx.tick.clone()))?;

  Ok(Some(Tagged::create(Inscriptions {
    sid: info.sid,
    chain: ctx.chain.to_string(),
    protocol: PROTOCOL_BRC20.to_string(),
    tick: ctx.tick.clone(),
    name: deploy.tick.clone(),
    limit_per_mint: deploy.limit_per_mint.clone(),
    total_supply: deploy.total_supply.clone(),
    deploy_by: deploy.owner.clone(),
    deploy_hash: ctx.txid.to_string(),
    deploy_time: ctx.block_time(),
    decimals: deploy.decimals,
  })))
}

pub(crate) fn build_inscription_stats<L: LedgerCache + ?Sized>(
  ctx: &EventContext,
  ledger: &L,
) -> Result<Option<Tagged<InscriptionsStats>>, BuildError<L::Error>> {
  let Some(stats) = ledger
    .get_stats(PROTOCOL_BRC20, &ctx.tick)
    .map_err(BuildError::Ledger)?
  else {
    return Ok(None);
  };

  let mut row = InscriptionsStats {
    sid: stats.sid,
    chain: ctx.chain.to_string(),
    protocol: PROTOCOL_BRC20.to_string(),
    tick: ctx.tick.clone(),
    minted: stats.minted.clone(),
    holders: stats.holders,
    tx_cnt: stats.tx_cnt,
    mint_first_block: None,
    mint_last_block: None,
    mint_completed_time: None,
  };

  if ctx.op == TxEvent::Mint {
    if stats.minted == ctx.amount {
      row.mint_first_block = Some(ctx.block.number);
    }
    match ledger
      .get_inscription(PROTOCOL_BRC20, &ctx.tick)
      .map_err(BuildError::Ledger)?
    {
      Some(info) if info.total_supply <= stats.minted => {
        row.mint_last_block = Some(ctx.block.number);
        row.mint_completed_time = Some(ctx.block_time());
      }
      Some(_) => {}
      None => log::error!("inscription of tick[{}] not cached", ctx.tick),
    }
  }

  Ok(Some(Tagged::new(
    action(ctx.op != TxEvent::Deploy),
    row,
  )))
}

pub(crate) async fn build_balance<S, L>(
  ctx: &EventContext<'_>,
  ledger: &L,
  source: &S,
  remote: &RemoteBalances,
  model: &mut DbModelEvent,
) -> Result<(), BuildError<L::Error>>
where
  S: ChainSource + ?Sized,
  L: LedgerCache + ?Sized,
{
  let tick = ctx.tick.as_str();
  match ctx.op {
    TxEvent::Mint => {
      let item = balance_or_seed(ledger, tick, ctx.to, &ctx.amount).map_err(BuildError::Ledger)?;
      model.balance_txns.push(ctx.balance_txn(
        ctx.to,
        ctx.amount.clone(),
        item.overall,
        item.available,
      ));

      let balance = remote_balance(source, remote, tick, ctx.to, ctx.to).await?;
      model.set_balances(action(ctx.to_ok), ctx.balances(ctx.to, item.sid, balance));
    }
    TxEvent::Transfer => {
      let (receiver, seeded) = match ledger
        .get_balance(PROTOCOL_BRC20, tick, ctx.to)
        .map_err(BuildError::Ledger)?
      {
        Some(item) => (item, false),
        None => (
          ledger
            .create_balance(
              PROTOCOL_BRC20,
              tick,
              ctx.to,
              ctx.amount.clone(),
              ctx.amount.clone(),
            )
            .map_err(BuildError::Ledger)?,
          true,
        ),
      };
      let (overall, available) = if seeded {
        (Num::zero(), Num::zero())
      } else {
        (receiver.overall, receiver.available)
      };
      model
        .balance_txns
        .push(ctx.balance_txn(ctx.to, ctx.amount.clone(), overall, available));
      let balance = remote_balance(source, remote, tick, ctx.to, ctx.to).await?;
      model.set_balances(action(ctx.to_ok), ctx.balances(ctx.to, receiver.sid, balance));

      let sender =
        balance_or_seed(ledger, tick, ctx.from, &ctx.amount).map_err(BuildError::Ledger)?;
      model.balance_txns.push(ctx.balance_txn(
        ctx.from,
        -ctx.amount.clone(),
        sender.overall,
        sender.available,
      ));
      let balance =
        remote_balance(source, remote, tick, ctx.from, sender_fallback_address(ctx)).await?;
      model.set_balances(action(ctx.from_ok), ctx.balances(ctx.from, sender.sid, balance));
    }
    TxEvent::InscribeTransfer => {
      let abnormal = || BuildError::AbnormalBalance {
        address: ctx.to.to_string(),
        amount: ctx.amount.clone(),
      };
      if !ctx.to_ok {
        return Err(abnormal());
      }
      let item = ledger
        .get_balance(PROTOCOL_BRC20, tick, ctx.to)
        .map_err(BuildError::Ledger)?
        .ok_or_else(abnormal)?;
      model.balance_txns.push(ctx.balance_txn(
        ctx.to,
        ctx.amount.clone(),
        item.overall,
        item.available,
      ));

      let balance = remote_balance(source, remote, tick, ctx.to, ctx.to).await?;
      model.set_balances(action(ctx.to_ok), ctx.balances(ctx.to, item.sid, balance));
    }
    _ => {}
  }
  Ok(())
}

pub(crate) fn build_address_tx(ctx: &EventContext) -> Vec<AddressTxs> {
  let row = |address: &str| AddressTxs {
    event: ctx.op,
    address: address.to_string(),
    amount: ctx.amount.clone(),
    tx_hash: ctx.txid.to_string(),
    tick: ctx.tick.clone(),
    protocol: PROTOCOL_BRC20.to_string(),
    operate: ctx.event.event.clone(),
    chain: ctx.chain.to_string(),
    created_at: ctx.block_time(),
  };

  let mut rows = vec![row(ctx.to)];
  if !ctx.from.eq_ignore_ascii_case(ctx.to) {
    rows.push(row(ctx.from));
  }
  rows
}

pub(crate) fn build_utxo(ctx: &EventContext) -> Option<Tagged<Utxo>> {
  let utxo = |status: UtxoStatus, address: &str| Utxo {
    chain: ctx.chain.to_string(),
    protocol: PROTOCOL_BRC20.to_string(),
    tick: ctx.tick.clone(),
    sn: ctx.event.inscription_id.clone(),
    status,
    root_hash: ctx.block.tx_hash.clone(),
    address: address.to_string(),
    amount: ctx.amount.clone(),
  };

  match ctx.op {
    TxEvent::InscribeTransfer => Some(Tagged::create(utxo(UtxoStatus::Unspent, ctx.to))),
    TxEvent::Transfer => Some(Tagged::update(utxo(UtxoStatus::Spent, ctx.from))),
    _ => None,
  }
}

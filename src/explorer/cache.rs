use crate::{
  client::ord::DeployInscription,
  ledger::{InsStats, LedgerCache, TickInfo, UtxoEntry},
  model::PROTOCOL_BRC20,
  num::Num,
};

pub(crate) fn update_deploy<L: LedgerCache + ?Sized>(
  ledger: &L,
  tick: &str,
  deploy: &DeployInscription,
) -> Result<(), L::Error> {
  ledger.create_inscription(
    PROTOCOL_BRC20,
    tick,
    TickInfo {
      sid: 0,
      limit_per_mint: deploy.limit_per_mint.clone(),
      total_supply: deploy.total_supply.clone(),
      decimals: deploy.decimals,
    },
  )?;
  ledger.create_stats(
    PROTOCOL_BRC20,
    tick,
    InsStats {
      tx_cnt: 1,
      ..Default::default()
    },
  )?;
  Ok(())
}

pub(crate) fn update_mint<L: LedgerCache + ?Sized>(
  ledger: &L,
  tick: &str,
  to: &str,
  amount: &Num,
) -> Result<(), L::Error> {
  ledger.mint_stats(PROTOCOL_BRC20, tick, amount)?;
  ledger.add_tx_cnt(PROTOCOL_BRC20, tick, 1)?;

  match ledger.get_balance(PROTOCOL_BRC20, tick, to)? {
    None => {
      ledger.create_balance(PROTOCOL_BRC20, tick, to, amount.clone(), amount.clone())?;
      ledger.add_holders(PROTOCOL_BRC20, tick, 1)?;
    }
    Some(balance) => {
      if !balance.overall.is_positive() {
        ledger.add_holders(PROTOCOL_BRC20, tick, 1)?;
      }
      ledger.update_balance(
        PROTOCOL_BRC20,
        tick,
        to,
        &balance.available + amount,
        &balance.overall + amount,
      )?;
    }
  }
  Ok(())
}

/// Moves `amount` of overall balance from sender to receiver and returns the
/// holder delta the move implies. The delta is not written to the stats; the
/// periodic recount owns the holder figure.
pub(crate) fn update_transfer<L: LedgerCache + ?Sized>(
  ledger: &L,
  tick: &str,
  from: &str,
  to: &str,
  amount: &Num,
) -> Result<i64, L::Error> {
  ledger.add_tx_cnt(PROTOCOL_BRC20, tick, 1)?;

  let Some(sender) = ledger.get_balance(PROTOCOL_BRC20, tick, from)? else {
    log::error!("transfer from unknown balance tick[{tick}] address[{from}]");
    return Ok(0);
  };

  let mut delta = 0;
  let sender_overall = &sender.overall - amount;
  if !sender_overall.is_positive() {
    delta -= 1;
  }
  // available was already taken when the transfer was inscribed
  ledger.update_balance(PROTOCOL_BRC20, tick, from, sender.available, sender_overall)?;

  match ledger.get_balance(PROTOCOL_BRC20, tick, to)? {
    None => {
      ledger.create_balance(PROTOCOL_BRC20, tick, to, amount.clone(), amount.clone())?;
      delta += 1;
    }
    Some(receiver) => {
      if !receiver.overall.is_positive() {
        delta += 1;
      }
      ledger.update_balance(
        PROTOCOL_BRC20,
        tick,
        to,
        &receiver.available + amount,
        &receiver.overall + amount,
      )?;
    }
  }
  Ok(delta)
}

pub(crate) fn update_inscribe_transfer<L: LedgerCache + ?Sized>(
  ledger: &L,
  tick: &str,
  address: &str,
  tx_hash: &str,
  inscription_id: &str,
  amount: &Num,
) -> Result<(), L::Error> {
  let Some(balance) = ledger.get_balance(PROTOCOL_BRC20, tick, address)? else {
    ledger.create_balance(PROTOCOL_BRC20, tick, address, Num::zero(), amount.clone())?;
    return Ok(());
  };

  ledger.update_balance(
    PROTOCOL_BRC20,
    tick,
    address,
    &balance.available - amount,
    balance.overall,
  )?;
  ledger.add_utxo(UtxoEntry {
    protocol: PROTOCOL_BRC20.to_string(),
    tick: tick.to_string(),
    tx_hash: tx_hash.to_string(),
    address: address.to_string(),
    amount: amount.clone(),
    inscription_id: inscription_id.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ledger::{HolderSource, MemoryLedger};
  use pretty_assertions::assert_eq;

  fn deployed() -> MemoryLedger {
    let ledger = MemoryLedger::new();
    update_deploy(
      &ledger,
      "ordi",
      &DeployInscription {
        id: "aai0".into(),
        tick: "ordi".into(),
        limit_per_mint: Num::from(1000u64),
        total_supply: Num::from(21000000u64),
        decimals: 18,
        owner: "bc1qowner".into(),
      },
    )
    .unwrap();
    ledger
  }

  fn balance(ledger: &MemoryLedger, address: &str) -> (Num, Num) {
    let item = ledger
      .get_balance(PROTOCOL_BRC20, "ordi", address)
      .unwrap()
      .unwrap();
    (item.available, item.overall)
  }

  #[test]
  fn test_deploy_seeds_inscription_and_stats() {
    let ledger = deployed();
    let info = ledger.get_inscription(PROTOCOL_BRC20, "ordi").unwrap().unwrap();
    assert_eq!(info.total_supply, Num::from(21000000u64));
    let stats = ledger.get_stats(PROTOCOL_BRC20, "ordi").unwrap().unwrap();
    assert_eq!(stats.tx_cnt, 1);
    assert!(stats.minted.is_zero());
  }

  #[test]
  fn test_mint_counts_new_holder_once() {
    let ledger = deployed();
    update_mint(&ledger, "ordi", "bc1qa", &Num::from(1000u64)).unwrap();
    update_mint(&ledger, "ordi", "bc1qa", &Num::from(1000u64)).unwrap();

    assert_eq!(balance(&ledger, "bc1qa"), (Num::from(2000u64), Num::from(2000u64)));
    let stats = ledger.get_stats(PROTOCOL_BRC20, "ordi").unwrap().unwrap();
    assert_eq!(stats.minted, Num::from(2000u64));
    assert_eq!(stats.tx_cnt, 3);
    assert_eq!(stats.holders, 1);
  }

  #[test]
  fn test_transfer_preserves_total() {
    let ledger = deployed();
    update_mint(&ledger, "ordi", "bc1qa", &Num::from(1000u64)).unwrap();
    update_mint(&ledger, "ordi", "bc1qb", &Num::from(50u64)).unwrap();
    update_inscribe_transfer(&ledger, "ordi", "bc1qa", "tx1", "tx1i0", &Num::from(300u64)).unwrap();

    let before = &balance(&ledger, "bc1qa").1 + &balance(&ledger, "bc1qb").1;
    let delta = update_transfer(&ledger, "ordi", "bc1qa", "bc1qb", &Num::from(300u64)).unwrap();
    let after = &balance(&ledger, "bc1qa").1 + &balance(&ledger, "bc1qb").1;

    assert_eq!(before, after);
    assert_eq!(delta, 0);
    assert_eq!(balance(&ledger, "bc1qa"), (Num::from(700u64), Num::from(700u64)));
    assert_eq!(balance(&ledger, "bc1qb"), (Num::from(350u64), Num::from(350u64)));
  }

  #[test]
  fn test_transfer_holder_delta_is_not_applied() {
    let ledger = deployed();
    update_mint(&ledger, "ordi", "bc1qa", &Num::from(10u64)).unwrap();
    update_inscribe_transfer(&ledger, "ordi", "bc1qa", "tx1", "tx1i0", &Num::from(10u64)).unwrap();

    let delta = update_transfer(&ledger, "ordi", "bc1qa", "bc1qc", &Num::from(10u64)).unwrap();

    assert_eq!(delta, 0);
    let delta = update_transfer(&ledger, "ordi", "bc1qc", "bc1qd", &Num::from(4u64)).unwrap();
    assert_eq!(delta, 1);
    assert_eq!(
      ledger.get_stats(PROTOCOL_BRC20, "ordi").unwrap().unwrap().holders,
      1
    );
    assert_eq!(ledger.holder_count(PROTOCOL_BRC20, "ordi").unwrap(), 2);
  }

  #[test]
  fn test_transfer_from_unknown_sender_only_counts_tx() {
    let ledger = deployed();
    update_transfer(&ledger, "ordi", "bc1qx", "bc1qy", &Num::from(1u64)).unwrap();
    assert!(ledger
      .get_balance(PROTOCOL_BRC20, "ordi", "bc1qy")
      .unwrap()
      .is_none());
    assert_eq!(ledger.get_stats(PROTOCOL_BRC20, "ordi").unwrap().unwrap().tx_cnt, 2);
  }

  #[test]
  fn test_inscribe_transfer_locks_available() {
    let ledger = deployed();
    update_mint(&ledger, "ordi", "bc1qa", &Num::from(1000u64)).unwrap();
    update_inscribe_transfer(&ledger, "ordi", "bc1qa", "tx1", "tx1i0", &Num::from(400u64)).unwrap();

    assert_eq!(balance(&ledger, "bc1qa"), (Num::from(600u64), Num::from(1000u64)));
    let utxos = ledger.utxos().unwrap();
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].inscription_id, "tx1i0");
    assert_eq!(utxos[0].amount, Num::from(400u64));
  }

  #[test]
  fn test_inscribe_transfer_without_balance_records_no_utxo() {
    let ledger = deployed();
    update_inscribe_transfer(&ledger, "ordi", "bc1qz", "tx1", "tx1i0", &Num::from(5u64)).unwrap();
    assert_eq!(balance(&ledger, "bc1qz"), (Num::zero(), Num::from(5u64)));
    assert!(ledger.utxos().unwrap().is_empty());
  }
}

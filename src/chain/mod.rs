use crate::{
  client::{
    self,
    btc::BlockWithTxs,
    ord::DeployInscription,
    runes::{OrdTx, Rune, RuneBalances},
    types::TxEvents,
    BtcClient, OrdClient, RawTxFetcher, ReqwestTransport, RunesClient,
  },
  config::ChainConfig,
  num::Num,
};
use async_trait::async_trait;
use bitcoin::BlockHash;
use bitcoincore_rpc::json::{GetBlockResult, GetRawTransactionResult};
use serde::Serialize;
use std::{collections::HashMap, time::Duration};

pub mod height;

pub use self::height::{HeightReconciler, SETTLE_WINDOW};

/// Bitcoin Core answers `getblockhash` past the tip with this code.
const RPC_INVALID_PARAMETER: i64 = -8;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("get ord block height error: index height is zero")]
  ZeroHeight,

  #[error("block {0} not found")]
  BlockNotFound(u64),

  #[error(transparent)]
  Client(#[from] client::Error),
}

/// A full-node block merged with the token events the ord index found in it.
#[derive(Debug, Clone)]
pub struct RpcBlock {
  pub number: u64,
  pub hash: String,
  pub time: u64,
  pub parent_hash: String,
  pub tx_hash: String,
  pub rpc_txs: Vec<GetRawTransactionResult>,
  pub txs: Vec<TxEvents>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcHeader {
  pub parent_hash: String,
  pub number: u64,
  pub time: u64,
  pub tx_hash: String,
}

impl From<&RpcBlock> for RpcHeader {
  fn from(block: &RpcBlock) -> Self {
    Self {
      parent_hash: block.parent_hash.clone(),
      number: block.number,
      time: block.time,
      tx_hash: block.tx_hash.clone(),
    }
  }
}

/// Balance of one address for one tick as reported by the ord index, already scaled.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AddressBalance {
  pub address: String,
  pub tick: String,
  pub overall: Num,
  pub available: Num,
}

/// Remote reads the explorer needs while turning events into records.
#[async_trait]
pub trait ChainSource: Send + Sync {
  async fn address_balance(&self, tick: &str, address: &str)
    -> Result<AddressBalance, client::Error>;

  async fn deploy_inscription(
    &self,
    inscription_id: &str,
  ) -> Result<Option<DeployInscription>, client::Error>;
}

/// Combines the full node with the ord and runes indexes for one chain.
pub struct Chain {
  node: BtcClient,
  ord: OrdClient,
  runes: RunesClient,
  ord_height: HeightReconciler,
  runes_height: HeightReconciler,
}

impl Chain {
  pub fn new(config: &ChainConfig, timeout: Duration, settle_window: Duration) -> Result<Self, Error> {
    Ok(Self {
      node: BtcClient::new(
        &config.rpc,
        config.username.clone(),
        config.password.clone(),
        timeout,
      )?,
      ord: OrdClient::new(&config.ord_rpc, ReqwestTransport::new(timeout)?),
      runes: RunesClient::new(&config.ordinals_rpc, ReqwestTransport::new(timeout)?),
      ord_height: HeightReconciler::new(settle_window),
      runes_height: HeightReconciler::new(settle_window),
    })
  }

  /// Highest block both the full node and the settled ord index have.
  pub async fn block_number(&self) -> Result<u64, Error> {
    let node_height = self.node.block_count().await?;
    let reported = self.ord.ord_height().await?;
    let reconciled = self.ord_height.reconcile(reported);
    log::info!("ord height reported[{reported}] reconciled[{reconciled}] node[{node_height}]");
    compose_height(node_height, reconciled)
  }

  /// Settled height of the runes index.
  pub async fn runes_height(&self) -> Result<u64, Error> {
    let reported = self.runes.block_height().await?;
    Ok(u64::try_from(self.runes_height.reconcile(reported)).unwrap_or_default())
  }

  pub async fn block_by_number(&self, number: u64) -> Result<RpcBlock, Error> {
    let hash = match self.node.block_hash(number).await {
      Ok(hash) => hash,
      Err(client::Error::Rpc { code: RPC_INVALID_PARAMETER, .. }) => {
        return Err(Error::BlockNotFound(number))
      }
      Err(e) => return Err(e.into()),
    };
    self.block_by_hash(number, &hash).await
  }

  pub async fn block_by_hash(&self, number: u64, hash: &BlockHash) -> Result<RpcBlock, Error> {
    let block: BlockWithTxs = self.node.block_with_txs(hash).await.map_err(|e| {
      log::error!("scan call rpc block_by_number[{number}] err[{e}]");
      e
    })?;
    let events = self.ord.block_events(&hash.to_string()).await?;
    if !events.block.is_empty() {
      log::info!(
        "block[{number}] ord events txs[{}]",
        events.block.len()
      );
    }

    Ok(RpcBlock {
      number,
      hash: block.hash.to_string(),
      time: block.time,
      parent_hash: block
        .previousblockhash
        .map(|hash| hash.to_string())
        .unwrap_or_default(),
      tx_hash: block.merkleroot.to_string(),
      rpc_txs: block.tx,
      txs: events.block,
    })
  }

  pub async fn header_by_number(&self, number: u64) -> Result<RpcHeader, Error> {
    let block = self.block_by_number(number).await?;
    Ok(RpcHeader::from(&block))
  }

  pub async fn block_summary(&self, hash: &BlockHash) -> Result<GetBlockResult, Error> {
    Ok(self.node.block(hash).await?)
  }

  pub async fn raw_transaction(&self, txid: &str) -> Result<GetRawTransactionResult, Error> {
    Ok(self.node.raw_transaction(txid).await?)
  }

  pub async fn raw_transactions(
    &self,
    txids: &[String],
  ) -> Result<HashMap<String, GetRawTransactionResult>, Error> {
    Ok(RawTxFetcher::new(&self.node).fetch(txids).await?)
  }

  pub async fn rune(&self, name: &str) -> Result<Option<Rune>, Error> {
    Ok(self.runes.rune(name).await?)
  }

  pub async fn runes(&self) -> Result<Vec<Rune>, Error> {
    Ok(self.runes.runes().await?)
  }

  pub async fn rune_balances(&self) -> Result<RuneBalances, Error> {
    Ok(self.runes.rune_balances().await?)
  }

  pub async fn runes_tx_events(&self, txids: &[String]) -> Result<Vec<OrdTx>, Error> {
    Ok(self.runes.tx_events(txids).await?)
  }
}

#[async_trait]
impl ChainSource for Chain {
  async fn address_balance(
    &self,
    tick: &str,
    address: &str,
  ) -> Result<AddressBalance, client::Error> {
    let Some(balance) = self.ord.address_balance(tick, address).await? else {
      log::error!("address balance is empty address[{address}] tick[{tick}]");
      return Ok(AddressBalance {
        address: address.to_string(),
        tick: tick.to_string(),
        ..Default::default()
      });
    };

    let scale = |amount: &str| {
      Num::from_raw_amount(amount).map_err(|e| client::Error::Decode {
        url: format!("balance {tick} {address}"),
        msg: e.to_string(),
      })
    };

    Ok(AddressBalance {
      address: address.to_string(),
      tick: tick.to_string(),
      overall: scale(&balance.overall_balance)?,
      available: scale(&balance.available_balance)?,
    })
  }

  async fn deploy_inscription(
    &self,
    inscription_id: &str,
  ) -> Result<Option<DeployInscription>, client::Error> {
    self.ord.deploy_inscription(inscription_id).await
  }
}

/// The lower of the node height and the reconciled index height. A non-positive
/// index height means the index is not usable yet.
pub(crate) fn compose_height(node_height: u64, reconciled: i64) -> Result<u64, Error> {
  let reconciled = u64::try_from(reconciled).unwrap_or_default();
  if reconciled == 0 {
    return Err(Error::ZeroHeight);
  }
  Ok(node_height.min(reconciled))
}

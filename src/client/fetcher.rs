use super::{
  btc::{RpcRequest, RpcResponse},
  Error,
};
use async_trait::async_trait;
use bitcoin::Txid;
use bitcoincore_rpc::json::GetRawTransactionResult;
use serde_json::json;
use std::{
  collections::{HashMap, HashSet},
  str::FromStr,
};

/// Transaction ids looked up per batched round trip.
pub const BATCH_SIZE: usize = 100;

/// One JSON-RPC batch round trip.
#[async_trait]
pub trait BatchRpc: Send + Sync {
  async fn batch(&self, requests: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, Error>;
}

pub struct RawTxFetcher<'a, B: ?Sized> {
  rpc: &'a B,
}

impl<'a, B: BatchRpc + ?Sized> RawTxFetcher<'a, B> {
  pub fn new(rpc: &'a B) -> Self {
    Self { rpc }
  }

  /// Looks up verbose transactions. Duplicates are dropped, the rest goes out in
  /// sequential chunks of [`BATCH_SIZE`]. Any failed lookup fails the whole call.
  pub async fn fetch(
    &self,
    txids: &[String],
  ) -> Result<HashMap<String, GetRawTransactionResult>, Error> {
    let mut seen = HashSet::with_capacity(txids.len());
    let mut unique = Vec::with_capacity(txids.len());
    for txid in txids {
      Txid::from_str(txid).map_err(|e| Error::InvalidInput(format!("txid {txid}: {e}")))?;
      if seen.insert(txid.as_str()) {
        unique.push(txid.as_str());
      }
    }

    let mut txs = HashMap::with_capacity(unique.len());
    for chunk in unique.chunks(BATCH_SIZE) {
      self.fetch_chunk(chunk, &mut txs).await?;
    }
    Ok(txs)
  }

  async fn fetch_chunk(
    &self,
    chunk: &[&str],
    txs: &mut HashMap<String, GetRawTransactionResult>,
  ) -> Result<(), Error> {
    let requests = chunk
      .iter()
      .enumerate()
      .map(|(id, txid)| {
        RpcRequest::new(
          id as u64,
          "getrawtransaction",
          vec![json!(txid), json!(true)],
        )
      })
      .collect();

    let responses = self.rpc.batch(requests).await.map_err(|e| Error::Batch {
      id: chunk.first().map(|txid| txid.to_string()).unwrap_or_default(),
      msg: e.to_string(),
    })?;

    let mut by_id: HashMap<u64, RpcResponse> = responses
      .into_iter()
      .filter_map(|response| response.id.map(|id| (id, response)))
      .collect();

    for (id, txid) in chunk.iter().enumerate() {
      let batch_err = |msg: String| Error::Batch {
        id: txid.to_string(),
        msg,
      };
      let response = by_id
        .remove(&(id as u64))
        .ok_or_else(|| batch_err("missing response".into()))?;
      let tx = response.decode().map_err(|e| batch_err(e.to_string()))?;
      txs.insert(txid.to_string(), tx);
    }
    Ok(())
  }
}

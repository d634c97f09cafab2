use super::{fetcher::BatchRpc, Error};
use async_trait::async_trait;
use bitcoin::{hash_types::TxMerkleNode, BlockHash};
use bitcoincore_rpc::json::{GetBlockResult, GetRawTransactionResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
  sync::atomic::{AtomicU64, Ordering},
  time::{Duration, Instant},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
  pub jsonrpc: &'static str,
  pub id: u64,
  pub method: String,
  pub params: Vec<Value>,
}

impl RpcRequest {
  pub fn new(id: u64, method: &str, params: Vec<Value>) -> Self {
    Self {
      jsonrpc: "1.0",
      id,
      method: method.to_string(),
      params,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorBody {
  pub code: i64,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcResponse {
  #[serde(default)]
  pub id: Option<u64>,
  #[serde(default)]
  pub result: Option<Value>,
  #[serde(default)]
  pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
  pub fn decode<R: DeserializeOwned>(self) -> Result<R, Error> {
    if let Some(error) = self.error {
      return Err(Error::Rpc {
        code: error.code,
        message: error.message,
      });
    }
    serde_json::from_value(self.result.unwrap_or(Value::Null)).map_err(|e| Error::Decode {
      url: "rpc result".into(),
      msg: e.to_string(),
    })
  }
}

/// `getblock` with verbosity 2.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockWithTxs {
  pub hash: BlockHash,
  pub height: u64,
  pub time: u64,
  pub merkleroot: TxMerkleNode,
  #[serde(default)]
  pub previousblockhash: Option<BlockHash>,
  pub tx: Vec<GetRawTransactionResult>,
}

/// JSON-RPC client of the bitcoin full node.
pub struct BtcClient {
  url: String,
  username: Option<String>,
  password: Option<String>,
  client: reqwest::Client,
  next_id: AtomicU64,
}

impl BtcClient {
  pub fn new(
    url: &str,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
  ) -> Result<Self, Error> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::InvalidInput(format!("build rpc client: {e}")))?;

    Ok(Self {
      url: url.trim().to_string(),
      username,
      password,
      client,
      next_id: AtomicU64::new(0),
    })
  }

  async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, body: &B) -> Result<R, Error> {
    let transport_err = |e: reqwest::Error| Error::Transport {
      url: self.url.clone(),
      msg: e.to_string(),
    };

    let mut request = self.client.post(&self.url).json(body);
    if let Some(username) = &self.username {
      request = request.basic_auth(username, self.password.as_ref());
    }

    let response = request.send().await.map_err(transport_err)?;
    let status = response.status();
    let bytes = response.bytes().await.map_err(transport_err)?;

    serde_json::from_slice(&bytes).map_err(|e| {
      if status.is_success() {
        Error::Decode {
          url: self.url.clone(),
          msg: e.to_string(),
        }
      } else {
        Error::Status {
          status: status.as_u16(),
          url: self.url.clone(),
        }
      }
    })
  }

  pub async fn request<R: DeserializeOwned>(
    &self,
    method: &str,
    params: Vec<Value>,
  ) -> Result<R, Error> {
    let start = Instant::now();
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let response: RpcResponse = self.post(&RpcRequest::new(id, method, params)).await?;
    log::debug!("call rpc[{method}] cost[{:?}]", start.elapsed());
    response.decode()
  }

  pub async fn block_count(&self) -> Result<u64, Error> {
    self.request("getblockcount", vec![]).await
  }

  pub async fn block_hash(&self, height: u64) -> Result<BlockHash, Error> {
    self.request("getblockhash", vec![json!(height)]).await
  }

  pub async fn block(&self, hash: &BlockHash) -> Result<GetBlockResult, Error> {
    self.request("getblock", vec![json!(hash), json!(1)]).await
  }

  pub async fn block_with_txs(&self, hash: &BlockHash) -> Result<BlockWithTxs, Error> {
    self.request("getblock", vec![json!(hash), json!(2)]).await
  }

  pub async fn raw_transaction(&self, txid: &str) -> Result<GetRawTransactionResult, Error> {
    self
      .request("getrawtransaction", vec![json!(txid), json!(true)])
      .await
  }
}

#[async_trait]
impl BatchRpc for BtcClient {
  async fn batch(&self, requests: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, Error> {
    let start = Instant::now();
    let responses = self.post(&requests).await;
    log::debug!(
      "call rpc batch size[{}] cost[{:?}]",
      requests.len(),
      start.elapsed()
    );
    responses
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_serialize() {
    let request = RpcRequest::new(3, "getrawtransaction", vec![json!("aa"), json!(true)]);
    assert_eq!(
      serde_json::to_value(&request).unwrap(),
      json!({"jsonrpc": "1.0", "id": 3, "method": "getrawtransaction", "params": ["aa", true]})
    );
  }

  #[test]
  fn test_response_decode() {
    let response: RpcResponse =
      serde_json::from_str(r#"{"result":840000,"error":null,"id":1}"#).unwrap();
    assert_eq!(response.id, Some(1));
    assert_eq!(response.decode::<u64>().unwrap(), 840000);

    let response: RpcResponse = serde_json::from_str(
      r#"{"result":null,"error":{"code":-5,"message":"No such mempool or blockchain transaction"},"id":2}"#,
    )
    .unwrap();
    assert!(matches!(
      response.decode::<u64>(),
      Err(Error::Rpc { code: -5, .. })
    ));
  }

  #[test]
  fn test_block_with_txs_decode() {
    let root = format!("{:064x}", 9);
    let block: BlockWithTxs = serde_json::from_value(json!({
      "hash": format!("{:064x}", 7),
      "height": 840000,
      "time": 1700000000,
      "merkleroot": root,
      "tx": [crate::client::fetcher::tests::raw_tx_json(&format!("{:064x}", 1))],
    }))
    .unwrap();

    assert_eq!(block.merkleroot.to_string(), root);
    assert_eq!(block.tx.len(), 1);
    assert!(block.previousblockhash.is_none());
  }
}

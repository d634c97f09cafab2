pub mod btc;
pub mod fetcher;
pub mod http;
pub mod ord;
pub mod runes;
pub mod types;

pub use self::{
  btc::{BtcClient, RpcRequest, RpcResponse},
  fetcher::{BatchRpc, RawTxFetcher, BATCH_SIZE},
  http::{FromBody, HttpClient, Json, Reply, ReqwestTransport, Transport},
  ord::{DeployInscription, OrdClient},
  runes::RunesClient,
  types::{BlockEvent, ScriptPubkey, TxEvents},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("request to {url} failed: {msg}")]
  Transport { url: String, msg: String },

  #[error("unexpected status {status} from {url}")]
  Status { status: u16, url: String },

  #[error("decode response from {url} failed: {msg}")]
  Decode { url: String, msg: String },

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("rpc error {code}: {message}")]
  Rpc { code: i64, message: String },

  #[error("batch lookup of {id} failed: {msg}")]
  Batch { id: String, msg: String },
}

impl Error {
  /// Network and server-side failures worth another attempt.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Transport { .. } | Self::Status { .. })
  }
}

use serde::{Deserialize, Serialize};

/// Envelope wrapping every JSON answer of the ord index.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
  #[serde(default)]
  pub code: i32,
  #[serde(default)]
  pub msg: String,
  #[serde(default)]
  pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptPubkey {
  Address(String),
  NonStandard(String),
}

impl Default for ScriptPubkey {
  fn default() -> Self {
    ScriptPubkey::NonStandard(String::new())
  }
}

impl ScriptPubkey {
  /// The address, or an empty string for scripts without one.
  pub fn address(&self) -> &str {
    match self {
      Self::Address(address) => address,
      Self::NonStandard(_) => "",
    }
  }
}

impl From<&str> for ScriptPubkey {
  fn from(address: &str) -> Self {
    Self::Address(address.to_string())
  }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
  #[serde(default)]
  pub version: Option<String>,
  #[serde(default)]
  pub commit_hash: Option<String>,
  #[serde(default)]
  pub build_time: Option<String>,
  #[serde(default)]
  pub chain_info: Option<ChainInfo>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
  #[serde(default)]
  pub network: Option<String>,
  #[serde(default)]
  pub ord_height: Option<i64>,
  #[serde(default)]
  pub chain_height: HeightValue,
}

/// A height the index may report as a number, a numeric string or nothing.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeightValue {
  Number(i64),
  Text(String),
  #[default]
  Absent,
}

impl HeightValue {
  pub fn height(&self) -> Option<i64> {
    match self {
      Self::Number(height) => Some(*height),
      Self::Text(text) => text.trim().parse().ok(),
      Self::Absent => None,
    }
  }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
  #[serde(rename = "type")]
  pub event: String,
  #[serde(default)]
  pub tick: String,
  #[serde(default)]
  pub inscription_id: String,
  #[serde(default)]
  pub inscription_number: i64,
  #[serde(default)]
  pub old_satpoint: String,
  #[serde(default)]
  pub new_satpoint: String,
  #[serde(default)]
  pub amount: String,
  #[serde(default)]
  pub from: ScriptPubkey,
  #[serde(default)]
  pub to: ScriptPubkey,
  #[serde(default)]
  pub valid: bool,
  #[serde(default)]
  pub msg: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxEvents {
  pub txid: String,
  #[serde(default)]
  pub events: Vec<BlockEvent>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEvents {
  #[serde(default)]
  pub block: Vec<TxEvents>,
  #[serde(default)]
  pub height: i64,
  #[serde(default)]
  pub time: u64,
  #[serde(default)]
  pub hash: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdInscription {
  pub id: String,
  #[serde(default)]
  pub number: i64,
  #[serde(default)]
  pub content_type: Option<String>,
  #[serde(default)]
  pub content: Option<String>,
  #[serde(default)]
  pub owner: Option<ScriptPubkey>,
  #[serde(default)]
  pub genesis_height: u64,
  #[serde(default)]
  pub location: String,
}

/// Body of a brc-20 deploy inscription.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DeployContent {
  #[serde(default)]
  pub p: String,
  #[serde(default)]
  pub op: String,
  #[serde(default)]
  pub tick: String,
  #[serde(default)]
  pub max: String,
  #[serde(default)]
  pub lim: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceInfo {
  #[serde(default)]
  pub tick: String,
  #[serde(default)]
  pub available_balance: String,
  #[serde(default)]
  pub transferable_balance: String,
  #[serde(default)]
  pub overall_balance: String,
}

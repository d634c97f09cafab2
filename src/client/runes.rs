use super::{
  http::{HttpClient, Json, ReqwestTransport, Transport},
  Error,
};
use bitcoin::{OutPoint, Txid};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::{
  collections::BTreeMap,
  fmt::{self, Display, Formatter},
  str::FromStr,
};

/// Rune identifier, `block:tx` on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuneId {
  pub block: u64,
  pub tx: u32,
}

impl FromStr for RuneId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::InvalidInput(format!("rune id {s}"));
    let (block, tx) = s.split_once(':').ok_or_else(invalid)?;
    Ok(Self {
      block: block.parse().map_err(|_| invalid())?,
      tx: tx.parse().map_err(|_| invalid())?,
    })
  }
}

impl Display for RuneId {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    write!(f, "{}:{}", self.block, self.tx)
  }
}

impl Serialize for RuneId {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for RuneId {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    Self::from_str(&String::deserialize(deserializer)?)
      .map_err(|e| de::Error::custom(format!("deserialize rune id error: {}", e)))
  }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintTerms {
  #[serde(default)]
  pub deadline: Option<u64>,
  #[serde(default)]
  pub end: Option<u64>,
  #[serde(default)]
  pub limit: Option<u128>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuneEntry {
  #[serde(default)]
  pub burned: u128,
  #[serde(default)]
  pub divisibility: u8,
  #[serde(default)]
  pub etching: String,
  #[serde(default)]
  pub mint: Option<MintTerms>,
  #[serde(default)]
  pub mints: u64,
  #[serde(default)]
  pub number: u64,
  #[serde(default)]
  pub rune: String,
  #[serde(default)]
  pub spacers: u32,
  #[serde(default)]
  pub supply: u128,
  #[serde(default)]
  pub symbol: Option<String>,
  #[serde(default)]
  pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rune {
  pub id: RuneId,
  pub entry: RuneEntry,
}

#[derive(Debug, Default, Deserialize)]
struct RuneResponse {
  id: Option<RuneId>,
  entry: Option<RuneEntry>,
}

/// The `/runes` listing; entries are `[id, entry]` pairs decoded one by one.
#[derive(Debug, Default, Deserialize)]
struct RunesResponse {
  #[serde(default)]
  entries: Vec<Box<RawValue>>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuneTxInput {
  pub previous_output: String,
  #[serde(default)]
  pub script_sig: String,
  #[serde(default)]
  pub witness: Vec<String>,
  #[serde(default)]
  pub sequence: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuneTxOutput {
  #[serde(default)]
  pub value: u64,
  #[serde(default)]
  pub script_pubkey: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuneTx {
  #[serde(default)]
  pub version: i32,
  #[serde(default)]
  pub input: Vec<RuneTxInput>,
  #[serde(default)]
  pub output: Vec<RuneTxOutput>,
  #[serde(default)]
  pub lock_time: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxResponse {
  #[serde(default)]
  pub chain: String,
  #[serde(default)]
  pub etching: Option<String>,
  #[serde(default)]
  pub inscription_count: u64,
  #[serde(default)]
  pub transaction: Option<RuneTx>,
  #[serde(default)]
  pub txid: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputResponse {
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub indexed: bool,
  #[serde(default)]
  pub inscriptions: Vec<String>,
  #[serde(default)]
  pub runes: Vec<String>,
  #[serde(default)]
  pub script_pubkey: String,
  #[serde(default)]
  pub spent: bool,
  #[serde(default)]
  pub transaction: String,
  #[serde(default)]
  pub value: u64,
}

/// rune name -> outpoint -> amount
pub type RuneBalances = BTreeMap<String, BTreeMap<String, u128>>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdBlockEvent {
  #[serde(rename = "type")]
  pub event: String,
  pub tick: String,
  pub rune_id: String,
  pub amount: String,
  pub from: String,
  pub to: String,
  pub valid: bool,
  pub msg: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdTx {
  pub txid: String,
  pub events: Vec<OrdBlockEvent>,
}

/// Client of the plain ord (runes) index.
pub struct RunesClient<T = ReqwestTransport> {
  endpoint: String,
  client: HttpClient<T>,
}

impl<T: Transport> RunesClient<T> {
  pub fn new(endpoint: &str, transport: T) -> Self {
    Self {
      endpoint: endpoint.trim().trim_end_matches('/').to_string(),
      client: HttpClient::new(transport),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
  }

  pub async fn block_height(&self) -> Result<i64, Error> {
    let url = self.url("blockheight");
    let text: String = self.client.get(&url).await?;
    if text.trim().is_empty() {
      return Ok(0);
    }
    text.trim().parse().map_err(|e| Error::Decode {
      url,
      msg: format!("height {text:?}: {e}"),
    })
  }

  pub async fn transaction(&self, txid: &str) -> Result<TxResponse, Error> {
    Txid::from_str(txid).map_err(|e| Error::InvalidInput(format!("txid {txid}: {e}")))?;
    let Json(tx) = self.client.get(&self.url(&format!("tx/{txid}"))).await?;
    Ok(tx)
  }

  pub async fn output(&self, outpoint: &str) -> Result<OutputResponse, Error> {
    OutPoint::from_str(outpoint)
      .map_err(|e| Error::InvalidInput(format!("outpoint {outpoint}: {e}")))?;
    let Json(output) = self
      .client
      .get(&self.url(&format!("output/{outpoint}")))
      .await?;
    Ok(output)
  }

  pub async fn rune(&self, name: &str) -> Result<Option<Rune>, Error> {
    let Json(response): Json<RuneResponse> =
      self.client.get(&self.url(&format!("rune/{name}"))).await?;
    Ok(match (response.id, response.entry) {
      (Some(id), Some(entry)) => Some(Rune { id, entry }),
      _ => None,
    })
  }

  pub async fn runes(&self) -> Result<Vec<Rune>, Error> {
    let Json(response): Json<RunesResponse> = self.client.get(&self.url("runes")).await?;
    Ok(decode_rune_entries(response.entries))
  }

  pub async fn rune_balances(&self) -> Result<RuneBalances, Error> {
    let Json(balances) = self.client.get(&self.url("runes/balances")).await?;
    Ok(balances)
  }

  /// Builds one event per rune held by output 0 of each transaction. Transactions
  /// that cannot be resolved are logged and left out.
  pub async fn tx_events(&self, txids: &[String]) -> Result<Vec<OrdTx>, Error> {
    if txids.is_empty() {
      return Err(Error::InvalidInput("txids is empty".into()));
    }

    let mut txs = Vec::with_capacity(txids.len());
    for txid in txids {
      match self.tx_event(txid).await {
        Ok(Some(tx)) => txs.push(tx),
        Ok(None) => {}
        Err(err) => log::error!("runes tx events txid[{txid}] err[{err}]"),
      }
    }
    Ok(txs)
  }

  async fn tx_event(&self, txid: &str) -> Result<Option<OrdTx>, Error> {
    let response = self.transaction(txid).await?;
    let Some(input) = response
      .transaction
      .as_ref()
      .and_then(|tx| tx.input.first())
    else {
      return Ok(None);
    };

    let from = self.output(&input.previous_output).await?;
    let to = self.output(&format!("{txid}:0")).await?;

    let sender = from.address.unwrap_or_default();
    let receiver = to.address.unwrap_or_default();
    let events = to
      .runes
      .into_iter()
      .map(|rune_id| OrdBlockEvent {
        rune_id,
        from: sender.clone(),
        to: receiver.clone(),
        ..Default::default()
      })
      .collect();

    Ok(Some(OrdTx {
      txid: txid.to_string(),
      events,
    }))
  }
}

fn decode_rune_entries(entries: Vec<Box<RawValue>>) -> Vec<Rune> {
  entries
    .into_iter()
    .filter_map(
      |entry| match serde_json::from_str::<(RuneId, RuneEntry)>(entry.get()) {
        Ok((id, entry)) => Some(Rune { id, entry }),
        Err(err) => {
          log::error!("skip malformed rune entry err[{err}]");
          None
        }
      },
    )
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::http::tests::{reply, ScriptedTransport};
  use http::StatusCode;

  const TXID: &str = "2b2fa77ca54ad5a58d506d933dcaa2ed1efb41bf5d8b0ce82afbace399a014b1";
  const PREV: &str = "1111111111111111111111111111111111111111111111111111111111111111";

  #[test]
  fn test_rune_id_from_str() {
    assert_eq!(
      RuneId::from_str("840000:3").unwrap(),
      RuneId {
        block: 840000,
        tx: 3
      }
    );
    assert!(RuneId::from_str("840000").is_err());
    assert!(RuneId::from_str("a:1").is_err());
    assert_eq!(RuneId { block: 1, tx: 2 }.to_string(), "1:2");
  }

  #[test]
  fn test_decode_rune_entries_skips_malformed() {
    let response: RunesResponse = serde_json::from_str(
      r#"{"entries":[
        ["840000:1",{"burned":0,"divisibility":2,"etching":"aa","mint":{"deadline":null,"end":850000,"limit":1000},"mints":5,"number":0,"rune":"UNCOMMONGOODS","spacers":128,"supply":5000,"symbol":"⧉","timestamp":1713571767}],
        ["bogus",{"rune":"X"}],
        ["840001:7"],
        ["840002:0",{"rune":"Z","supply":340282366920938463463374607431768211455}]
      ]}"#,
    )
    .unwrap();

    let runes = decode_rune_entries(response.entries);
    assert_eq!(runes.len(), 2);
    assert_eq!(runes[0].id, RuneId { block: 840000, tx: 1 });
    assert_eq!(runes[0].entry.rune, "UNCOMMONGOODS");
    assert_eq!(runes[0].entry.mint.as_ref().unwrap().limit, Some(1000));
    assert_eq!(runes[1].entry.supply, u128::MAX);
  }

  #[tokio::test]
  async fn test_block_height_is_plain_text() {
    let client = RunesClient::new("http://runes.local/", ScriptedTransport::always(StatusCode::OK, "840123\n"));
    assert_eq!(client.block_height().await.unwrap(), 840123);

    let client = RunesClient::new("http://runes.local", ScriptedTransport::always(StatusCode::OK, "abc"));
    assert!(matches!(client.block_height().await, Err(Error::Decode { .. })));
  }

  #[tokio::test]
  async fn test_output_rejects_malformed_outpoint() {
    let transport = ScriptedTransport::always(StatusCode::OK, "{}");
    let client = RunesClient::new("http://runes.local", transport);
    assert!(matches!(client.output("nope").await, Err(Error::InvalidInput(_))));
    assert!(matches!(client.transaction("nope").await, Err(Error::InvalidInput(_))));
    assert_eq!(
      client
        .client
        .transport()
        .calls
        .load(std::sync::atomic::Ordering::SeqCst),
      0
    );
  }

  #[tokio::test]
  async fn test_tx_events() {
    let tx = format!(
      r#"{{"chain":"mainnet","inscription_count":0,"txid":"{TXID}","transaction":{{"version":2,"lock_time":0,"input":[{{"previous_output":"{PREV}:1","script_sig":"","witness":[],"sequence":4294967295}}],"output":[{{"value":546,"script_pubkey":"5120"}}]}}}}"#
    );
    let client = RunesClient::new(
      "http://runes.local",
      ScriptedTransport::new(vec![
        Ok(reply(StatusCode::OK, &tx)),
        Ok(reply(StatusCode::OK, r#"{"address":"bc1psender","runes":[]}"#)),
        Ok(reply(
          StatusCode::OK,
          r#"{"address":"bc1preceiver","runes":["UNCOMMONGOODS","DOGGOTOTHEMOON"]}"#,
        )),
      ]),
    );

    let txs = client.tx_events(&[TXID.to_string()]).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].txid, TXID);
    assert_eq!(txs[0].events.len(), 2);
    assert_eq!(txs[0].events[1].rune_id, "DOGGOTOTHEMOON");
    assert_eq!(txs[0].events[0].from, "bc1psender");
    assert_eq!(txs[0].events[0].to, "bc1preceiver");
    assert!(!txs[0].events[0].valid);

    let urls = client.client.transport().urls.lock().unwrap().clone();
    assert_eq!(
      urls,
      vec![
        format!("http://runes.local/tx/{TXID}"),
        format!("http://runes.local/output/{PREV}:1"),
        format!("http://runes.local/output/{TXID}:0"),
      ]
    );
  }

  #[tokio::test]
  async fn test_tx_events_skips_broken_tx() {
    let client = RunesClient::new(
      "http://runes.local",
      ScriptedTransport::always(StatusCode::OK, "{}"),
    );
    let txs = client.tx_events(&["bad".to_string()]).await.unwrap();
    assert!(txs.is_empty());
    assert!(client.tx_events(&[]).await.is_err());
  }
}

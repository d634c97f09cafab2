use super::{
  http::{HttpClient, Json, ReqwestTransport, Transport},
  types::{ApiResponse, BalanceInfo, BlockEvents, DeployContent, NodeInfo, OrdInscription},
  Error,
};
use crate::num::{Num, DEFAULT_TICK_DECIMALS};
use reqwest::Url;
use std::str::FromStr;

/// Tick metadata decoded from a deploy inscription.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployInscription {
  pub id: String,
  pub tick: String,
  pub limit_per_mint: Num,
  pub total_supply: Num,
  pub decimals: u8,
  pub owner: String,
}

/// Client of the brc-20 aware ord index.
pub struct OrdClient<T = ReqwestTransport> {
  endpoint: String,
  client: HttpClient<T>,
}

impl<T: Transport> OrdClient<T> {
  pub fn new(endpoint: &str, transport: T) -> Self {
    Self {
      endpoint: endpoint.trim().trim_end_matches('/').to_string(),
      client: HttpClient::new(transport),
    }
  }

  fn url(&self, segments: &[&str]) -> Result<String, Error> {
    let mut url = Url::parse(&self.endpoint)
      .map_err(|e| Error::InvalidInput(format!("ord endpoint {}: {e}", self.endpoint)))?;
    url
      .path_segments_mut()
      .map_err(|_| Error::InvalidInput(format!("ord endpoint {} cannot be a base", self.endpoint)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url.to_string())
  }

  async fn get<D>(&self, segments: &[&str]) -> Result<Option<D>, Error>
  where
    D: serde::de::DeserializeOwned + Default,
  {
    let url = self.url(segments)?;
    let Json(response) = self.client.get::<Json<ApiResponse<D>>>(&url).await?;
    Ok(response.data)
  }

  pub async fn node_info(&self) -> Result<Option<NodeInfo>, Error> {
    self.get(&["api", "v1", "node", "info"]).await
  }

  /// Height the index has processed, zero when the index does not report one.
  pub async fn ord_height(&self) -> Result<i64, Error> {
    let height = self
      .node_info()
      .await?
      .and_then(|info| info.chain_info)
      .and_then(|chain| chain.ord_height)
      .unwrap_or_default();
    log::debug!("ord index height[{height}]");
    Ok(height)
  }

  pub async fn block_events(&self, block_hash: &str) -> Result<BlockEvents, Error> {
    let mut events: BlockEvents = self
      .get(&["api", "v1", "brc20", "block", block_hash, "events"])
      .await?
      .unwrap_or_default();
    events.hash = block_hash.to_string();
    Ok(events)
  }

  pub async fn inscription(&self, inscription_id: &str) -> Result<Option<OrdInscription>, Error> {
    self
      .get(&["api", "v1", "ord", "id", inscription_id, "inscription"])
      .await
  }

  /// Fetches the inscription and decodes its hex-encoded deploy body.
  pub async fn deploy_inscription(
    &self,
    inscription_id: &str,
  ) -> Result<Option<DeployInscription>, Error> {
    let Some(inscription) = self.inscription(inscription_id).await? else {
      return Ok(None);
    };
    decode_deploy(inscription_id, &inscription).map(Some)
  }

  pub async fn address_balance(
    &self,
    tick: &str,
    address: &str,
  ) -> Result<Option<BalanceInfo>, Error> {
    self
      .get(&["api", "v1", "brc20", "tick", tick, "address", address, "balance"])
      .await
  }
}

fn decode_deploy(
  inscription_id: &str,
  inscription: &OrdInscription,
) -> Result<DeployInscription, Error> {
  let decode_err = |msg: String| Error::Decode {
    url: format!("inscription {inscription_id}"),
    msg,
  };

  let content = hex::decode(inscription.content.as_deref().unwrap_or_default())
    .map_err(|e| decode_err(format!("content is not hex: {e}")))?;
  let content: DeployContent =
    serde_json::from_slice(&content).map_err(|e| decode_err(format!("content is not json: {e}")))?;

  Ok(DeployInscription {
    id: inscription_id.to_string(),
    tick: content.tick,
    limit_per_mint: Num::from_str(&content.lim).unwrap_or_default(),
    total_supply: Num::from_str(&content.max).unwrap_or_default(),
    decimals: DEFAULT_TICK_DECIMALS,
    owner: inscription
      .owner
      .as_ref()
      .map(|owner| owner.address().to_string())
      .unwrap_or_default(),
  })
}

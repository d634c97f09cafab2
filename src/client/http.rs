use super::Error;
use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

pub const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Reply {
  pub status: StatusCode,
  pub body: Vec<u8>,
}

/// One outbound HTTP exchange. Implementations must not retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, method: Method, url: &str) -> Result<Reply, Error>;
}

pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self, Error> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
      reqwest::header::ACCEPT,
      reqwest::header::HeaderValue::from_static("application/json"),
    );

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .pool_max_idle_per_host(10)
      .pool_idle_timeout(Duration::from_secs(30))
      .timeout(timeout)
      .build()
      .map_err(|e| Error::InvalidInput(format!("build http client: {e}")))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, method: Method, url: &str) -> Result<Reply, Error> {
    let transport_err = |e: reqwest::Error| Error::Transport {
      url: url.to_string(),
      msg: e.to_string(),
    };

    let response = self
      .client
      .request(method, url)
      .send()
      .await
      .map_err(transport_err)?;
    let status = response.status();
    let body = response.bytes().await.map_err(transport_err)?;

    Ok(Reply {
      status,
      body: body.to_vec(),
    })
  }
}

/// Output shapes a response body can be decoded into. `Default` is the value
/// handed back for a 404 or an empty body.
pub trait FromBody: Default + Sized {
  fn from_body(body: Vec<u8>) -> Result<Self, String>;
}

impl FromBody for Vec<u8> {
  fn from_body(body: Vec<u8>) -> Result<Self, String> {
    Ok(body)
  }
}

impl FromBody for String {
  fn from_body(body: Vec<u8>) -> Result<Self, String> {
    String::from_utf8(body).map_err(|e| e.to_string())
  }
}

/// Marks a body that should be parsed as JSON.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned + Default> FromBody for Json<T> {
  fn from_body(body: Vec<u8>) -> Result<Self, String> {
    serde_json::from_slice(&body).map(Json).map_err(|e| {
      format!(
        "parse body[{}] err[{}]",
        String::from_utf8_lossy(&body),
        e
      )
    })
  }
}

pub struct HttpClient<T = ReqwestTransport> {
  transport: T,
}

impl<T: Transport> HttpClient<T> {
  pub fn new(transport: T) -> Self {
    Self { transport }
  }

  #[cfg(test)]
  pub(crate) fn transport(&self) -> &T {
    &self.transport
  }

  /// Issues the request, retrying transient failures with a linear backoff of
  /// 100ms times the attempt index. The backoff also follows the last failed
  /// attempt. Decode failures are returned immediately.
  pub async fn call<O: FromBody>(&self, method: Method, url: &str) -> Result<O, Error> {
    let mut attempt = 0;
    loop {
      match self.call_once::<O>(method.clone(), url).await {
        Ok(out) => return Ok(out),
        Err(err) if !err.is_transient() => return Err(err),
        Err(err) => {
          log::debug!("call api[{url}] attempt[{attempt}] err[{err}]");
          tokio::time::sleep(BACKOFF_STEP * attempt).await;
          attempt += 1;
          if attempt >= MAX_ATTEMPTS {
            return Err(err);
          }
        }
      }
    }
  }

  pub async fn get<O: FromBody>(&self, url: &str) -> Result<O, Error> {
    self.call(Method::GET, url).await
  }

  async fn call_once<O: FromBody>(&self, method: Method, url: &str) -> Result<O, Error> {
    let start = Instant::now();
    let reply = self.transport.send(method, url).await;
    log::debug!("call api[{}] cost[{:?}]", url, start.elapsed());
    let reply = reply?;

    if reply.status == StatusCode::NOT_FOUND {
      return Ok(O::default());
    }
    if !reply.status.is_success() {
      return Err(Error::Status {
        status: reply.status.as_u16(),
        url: url.to_string(),
      });
    }
    if reply.body.is_empty() {
      return Ok(O::default());
    }

    O::from_body(reply.body).map_err(|msg| Error::Decode {
      url: url.to_string(),
      msg,
    })
  }
}

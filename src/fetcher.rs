//! Fetcher contract consumed by the cache on a miss.
//!
//! The cache never constructs or retries requests itself; it hands the
//! original address to a `Fetcher` and takes exactly one outcome back.

use color_eyre::{eyre::eyre, Report};
use futures::future::BoxFuture;

/// Final result of one fetch, cached or not.
///
/// `Cancelled` is deliberately distinct from `Failure`: it means nothing
/// happened, not that something went wrong.
#[derive(Debug)]
pub enum FetchOutcome {
  /// The resource's content, from cache or network.
  Success(Vec<u8>),
  /// Transport or storage error; nothing was cached.
  Failure(Report),
  /// The underlying request was cancelled; nothing was cached.
  Cancelled,
}

impl FetchOutcome {
  /// Content bytes if the fetch succeeded.
  pub fn content(&self) -> Option<&[u8]> {
    match self {
      Self::Success(content) => Some(content),
      _ => None,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success(_))
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}

/// Capability to retrieve a resource by address, asynchronously, producing
/// exactly one outcome. Retry policy belongs to implementations or callers.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, address: &str) -> BoxFuture<'static, FetchOutcome>;
}

/// GET-over-HTTP fetcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> color_eyre::Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, address: &str) -> BoxFuture<'static, FetchOutcome> {
    let client = self.client.clone();
    let address = address.to_string();

    Box::pin(async move {
      let response = match client.get(&address).send().await {
        Ok(response) => response,
        Err(e) => return FetchOutcome::Failure(eyre!("Request to {} failed: {}", address, e)),
      };

      let response = match response.error_for_status() {
        Ok(response) => response,
        Err(e) => return FetchOutcome::Failure(eyre!("Request to {} failed: {}", address, e)),
      };

      match response.bytes().await {
        Ok(body) => FetchOutcome::Success(body.to_vec()),
        Err(e) => {
          FetchOutcome::Failure(eyre!("Failed to read response body from {}: {}", address, e))
        }
      }
    })
  }
}

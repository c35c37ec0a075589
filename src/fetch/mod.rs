//! HTTP retrieval of feed documents.
//!
//! [`HttpClient`] is the transport seam, [`FeedSource`] a single classified
//! attempt and [`FeedClient`] the bounded retry loop on top of it.

mod basic;
mod client;
pub(crate) mod retry;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use retry::{FeedClient, RetryPolicy};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::FeedAuth;
use auth::{ApiKey, UrlParam};

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("server error ({0})")]
    Server(StatusCode),
    #[error("client error ({0})")]
    Client(StatusCode),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection error: {0}")]
    Connect(String),
    #[error("unexpected fetch error: {0}")]
    Unexpected(String),
}

impl FetchError {
    /// Server, timeout and connection failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Server(_) | FetchError::Timeout(_) | FetchError::Connect(_)
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Unexpected(e.to_string())
        }
    }
}

/// Maps a response status onto the retry taxonomy.
///
/// Anything that is neither 2xx nor 5xx is a non-retriable client error.
pub fn classify_status(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() {
        Err(FetchError::Server(status))
    } else {
        Err(FetchError::Client(status))
    }
}

/// Performs one GET against `url` and returns the body of a 2xx response.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Vec<u8>, FetchError> {
    let url: reqwest::Url = url
        .parse()
        .map_err(|e| FetchError::Unexpected(format!("invalid URL {url}: {e}")))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    classify_status(resp.status())?;

    Ok(resp.bytes().await?.to_vec())
}

/// One attempt at retrieving a feed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`FeedSource`] backed by a real HTTP client.
pub struct HttpSource {
    client: Box<dyn HttpClient>,
}

impl HttpSource {
    pub fn new(client: impl HttpClient + 'static) -> Self {
        Self {
            client: Box::new(client),
        }
    }

    /// Builds a fresh session decorated for the configured authentication.
    pub fn for_auth(auth: &FeedAuth) -> anyhow::Result<Self> {
        let basic = BasicClient::new()?;
        let source = match auth {
            FeedAuth::None => Self::new(basic),
            FeedAuth::Header { header_name, key } => {
                let client = ApiKey::new(basic, header_name, key)
                    .context("cannot configure API key header")?;
                Self::new(client)
            }
            FeedAuth::UrlParam { param_name, key } => {
                Self::new(UrlParam::new(basic, param_name.as_str(), key.as_str()))
            }
        };
        Ok(source)
    }
}

#[async_trait]
impl FeedSource for HttpSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        fetch_bytes(self.client.as_ref(), url).await
    }
}

//! Authentication decorators for [`HttpClient`](super::HttpClient).

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::UrlParam;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid API key header name {0:?}")]
    HeaderName(String),
    #[error("API key is not a valid header value")]
    HeaderValue,
}

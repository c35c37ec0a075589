use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::Request;
use reqwest::header::{HeaderName, HeaderValue};

use super::AuthError;

/// An [`HttpClient`] wrapper that injects an API key as an HTTP header.
///
/// The header name and value are validated once at construction, so
/// `execute` never fails on a bad key.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    key: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self, AuthError> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|_| AuthError::HeaderName(header_name.to_string()))?;
        let mut key = HeaderValue::from_str(key).map_err(|_| AuthError::HeaderValue)?;
        key.set_sensitive(true);

        Ok(Self {
            inner,
            header_name,
            key,
        })
    }

    fn authorize(&self, req: &mut Request) {
        req.headers_mut()
            .insert(self.header_name.clone(), self.key.clone());
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: Request) -> reqwest::Result<reqwest::Response> {
        self.authorize(&mut req);
        self.inner.execute(req).await
    }
}

use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport seam under [`FeedSource`](super::FeedSource).
///
/// Decorators such as [`ApiKey`](super::auth::ApiKey) wrap another client
/// and adjust the request before sending it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `req` and returns the raw response, whatever its status.
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

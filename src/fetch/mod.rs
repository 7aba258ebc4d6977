// Network access behind a trait so the interceptor can run against a live
// upstream or a scripted one.

pub mod mock;
pub mod upstream;

use async_trait::async_trait;

use crate::{error::FetchError, http::response::BufferedResponse, request::ProxyRequest};

pub use mock::MockFetcher;
pub use upstream::UpstreamFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue the request. `Err` means the network call itself failed; any HTTP
    /// status, including 4xx/5xx, comes back as `Ok`.
    async fn fetch(&self, request: ProxyRequest) -> Result<BufferedResponse, FetchError>;
}

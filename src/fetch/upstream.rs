use std::time::Duration;

use async_trait::async_trait;
use http::{header, uri::PathAndQuery};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::{
    error::FetchError,
    fetch::Fetcher,
    http::response::{strip_hop_by_hop, BufferedResponse},
    request::ProxyRequest,
};

/// Forwards requests to the origin the proxy sits in front of.
pub struct UpstreamFetcher {
    base: Url,
    client: Client,
}

impl UpstreamFetcher {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Upstream URL for a request target. Only the path and query of the
    /// target are used, so the scheme, host and port always come from `base`.
    pub fn resolve(&self, target: &str) -> Result<Url, FetchError> {
        let invalid = || FetchError::InvalidTarget(target.to_string());

        let path_and_query: PathAndQuery = target.parse().map_err(|_| invalid())?;
        if !path_and_query.path().starts_with('/') {
            return Err(invalid());
        }

        let mut url = self.base.clone();
        url.set_path(path_and_query.path());
        url.set_query(path_and_query.query());
        Ok(url)
    }
}

#[async_trait]
impl Fetcher for UpstreamFetcher {
    async fn fetch(&self, request: ProxyRequest) -> Result<BufferedResponse, FetchError> {
        let url = self.resolve(&request.target)?;

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        debug!("{} {}", request.method, url);

        let response = self
            .client
            .request(request.method, url.clone())
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let body = response.bytes().await.map_err(FetchError::Body)?;

        debug!("{} answered {} ({} bytes)", url, status, body.len());

        Ok(BufferedResponse {
            status,
            headers,
            body,
        })
    }
}

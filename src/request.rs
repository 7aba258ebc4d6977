use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::{header, HeaderMap, Method, Request};

use crate::error::ProxyError;

/// Upper bound on a buffered request body.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// An owned, fully buffered request. `clone()` produces the duplicate that gets
/// sent upstream while the original stays usable.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path plus optional query, e.g. `/query?lang=hi`.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub async fn from_axum(request: Request<Body>) -> Result<Self, ProxyError> {
        Self::from_axum_limited(request, MAX_BODY_BYTES).await
    }

    /// Buffer the request, failing with `PayloadTooLarge` once the body passes
    /// `limit` bytes, whether or not a content-length was declared.
    pub async fn from_axum_limited(
        request: Request<Body>,
        limit: usize,
    ) -> Result<Self, ProxyError> {
        let (parts, body) = request.into_parts();

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit as u64) {
            return Err(ProxyError::PayloadTooLarge { limit });
        }

        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        let mut stream = body.into_data_stream();
        let mut buffered = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buffered.len() + chunk.len() > limit {
                return Err(ProxyError::PayloadTooLarge { limit });
            }
            buffered.extend_from_slice(&chunk);
        }
        let body = buffered.freeze();

        Ok(Self {
            method: parts.method,
            target,
            headers: parts.headers,
            body,
        })
    }

    /// Cache lookup key. Only GET and HEAD are cacheable; HEAD shares the GET entry.
    pub fn cache_key(&self) -> Option<String> {
        if self.method == Method::GET || self.method == Method::HEAD {
            Some(self.target.clone())
        } else {
            None
        }
    }
}

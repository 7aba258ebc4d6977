use std::error::Error;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failure of the network fetch itself. An HTTP error status is not a `FetchError`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error building HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("Invalid request target: {0}")]
    InvalidTarget(String),

    #[error("Error reading upstream response body")]
    Body(#[source] reqwest::Error),

    #[error("Simulated network failure: {0}")]
    Simulated(String),
}

impl FetchError {
    /// The request left the proxy and got no usable answer.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. } | FetchError::Body(_) | FetchError::Simulated(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Error fetching {path} for cache {cache}")]
    Fetch {
        cache: String,
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("Bad response status {status} fetching {path} for cache {cache}")]
    BadStatus {
        cache: String,
        path: String,
        status: StatusCode,
    },

    #[error("Cache name {0} cannot be used as a directory name")]
    InvalidName(String),

    #[error("I/O error on cache storage")]
    Io(#[from] std::io::Error),

    #[error("Error reading cache manifest {path}")]
    Manifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored entry {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Error populating cache during install")]
    Install(#[from] CacheError),

    #[error("Error deleting stale cache during activate")]
    Activate(#[source] CacheError),

    #[error("Cannot {operation} while interceptor is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid upstream url {0}")]
    Upstream(String, #[source] url::ParseError),

    #[error("Upstream url must use http or https, got {0}")]
    Scheme(String),

    #[error("Cache name must not be empty")]
    EmptyCacheName,

    #[error("Cache name {0} may only contain letters, digits, '.', '-' and '_'")]
    InvalidCacheName(String),

    #[error("Query route must not be empty")]
    EmptyQueryRoute,

    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream unreachable")]
    Fetch(#[from] FetchError),

    #[error("Error reading request body")]
    RequestBody(#[from] axum::Error),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        error!("{}: {:?}", self, self.source());

        let status = match self {
            ProxyError::Fetch(FetchError::InvalidTarget(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        };

        let payload = Json(json!({"message": self.to_string()}));

        (status, payload).into_response()
    }
}

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_maps_to_bad_gateway() {
        let response = ProxyError::from(FetchError::Simulated("offline".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_oversized_body_maps_to_payload_too_large() {
        let response = ProxyError::PayloadTooLarge { limit: 8 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_install_error_wraps_cache_error() {
        let err = LifecycleError::from(CacheError::BadStatus {
            cache: "krishisahay-v1".into(),
            path: "/index.html".into(),
            status: StatusCode::NOT_FOUND,
        });
        let source = err.source().map(ToString::to_string).unwrap();
        assert!(source.contains("/index.html"));
        assert!(source.contains("404"));
    }
}

use std::{path::PathBuf, time::Duration};

use smart_default::SmartDefault;
use url::Url;

use crate::{cache::is_valid_cache_name, error::ConfigError};

pub const DEFAULT_CACHE_NAME: &str = "krishisahay-v1";
pub const DEFAULT_STATIC_ASSETS: [&str; 2] = ["/", "/index.html"];
pub const DEFAULT_QUERY_ROUTE: &str = "/query";
pub const DEFAULT_UPSTREAM: &str = "http://127.0.0.1:8000";
pub const DEFAULT_CACHE_DIR: &str = "/tmp/krishisahay-cache";

#[derive(Debug, Clone, SmartDefault)]
pub struct ProxyConfig {
    /// Version tag of the cache generation kept after activation.
    #[default(DEFAULT_CACHE_NAME.to_string())]
    pub cache_name: String,

    /// Paths pre-fetched into the cache on install, in order.
    #[default(DEFAULT_STATIC_ASSETS.iter().map(|p| p.to_string()).collect())]
    pub static_assets: Vec<String>,

    /// Substring that marks a request as the query API route.
    #[default(DEFAULT_QUERY_ROUTE.to_string())]
    pub query_route: String,

    #[default(DEFAULT_UPSTREAM.to_string())]
    pub upstream: String,

    /// Root holding one directory per cache generation.
    #[default(PathBuf::from(DEFAULT_CACHE_DIR))]
    pub cache_dir: PathBuf,

    #[default(Duration::from_secs(30))]
    pub request_timeout: Duration,
}

impl ProxyConfig {
    /// Defaults overlaid with `KRISHISAHAY_*` environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(upstream) = std::env::var("KRISHISAHAY_UPSTREAM") {
            config.upstream = upstream;
        }
        if let Ok(cache_name) = std::env::var("KRISHISAHAY_CACHE_NAME") {
            config.cache_name = cache_name;
        }
        if let Ok(assets) = std::env::var("KRISHISAHAY_STATIC_ASSETS") {
            config.static_assets = parse_asset_list(&assets);
        }
        if let Ok(route) = std::env::var("KRISHISAHAY_QUERY_ROUTE") {
            config.query_route = route;
        }
        if let Ok(dir) = std::env::var("KRISHISAHAY_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::EmptyCacheName);
        }
        if !is_valid_cache_name(&self.cache_name) {
            return Err(ConfigError::InvalidCacheName(self.cache_name.clone()));
        }
        if self.query_route.is_empty() {
            return Err(ConfigError::EmptyQueryRoute);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.upstream_url()?;
        Ok(())
    }

    pub fn upstream_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.upstream)
            .map_err(|e| ConfigError::Upstream(self.upstream.clone(), e))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Scheme(other.to_string())),
        }
    }

    /// Whether a request target belongs to the query API route.
    pub fn is_query_route(&self, target: &str) -> bool {
        target.contains(&self.query_route)
    }
}

pub fn parse_asset_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_published_contract() {
        let config = ProxyConfig::default();
        assert_eq!(config.cache_name, "krishisahay-v1");
        assert_eq!(config.static_assets, vec!["/", "/index.html"]);
        assert_eq!(config.query_route, "/query");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_query_route_is_substring_match() {
        let config = ProxyConfig::default();
        assert!(config.is_query_route("/query"));
        assert!(config.is_query_route("/api/query?lang=hi"));
        assert!(config.is_query_route("/query/history"));
        assert!(!config.is_query_route("/index.html"));
        assert!(!config.is_query_route("/schemes"));
    }

    #[test]
    fn test_parse_asset_list() {
        assert_eq!(
            parse_asset_list(" /, /index.html ,,/app.js"),
            vec!["/", "/index.html", "/app.js"]
        );
    }

    #[test]
    fn test_upstream_scheme_validation() {
        let mut config = ProxyConfig::default();
        config.upstream = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(ConfigError::Scheme(_))));

        config.upstream = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::Upstream(..))));
    }

    #[test]
    fn test_empty_cache_name_rejected() {
        let config = ProxyConfig {
            cache_name: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyCacheName)));
    }

    #[test]
    fn test_cache_name_must_be_a_directory_name() {
        for name in ["../krishisahay", "a/b", "v 1"] {
            let config = ProxyConfig {
                cache_name: name.into(),
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidCacheName(_))
            ));
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ProxyConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }
}

pub mod fallback;
pub mod knowledge;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    cache::CacheStorage,
    config::ProxyConfig,
    error::{FetchError, LifecycleError},
    fetch::Fetcher,
    http::response::BufferedResponse,
    request::ProxyRequest,
};

pub use fallback::OfflineFallback;
pub use knowledge::{KnowledgeSnippet, OFFLINE_KNOWLEDGE};

/// Lifecycle of one interceptor instance. Runs forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Activated => "activated",
            Phase::Redundant => "redundant",
        }
    }
}

/// Serves static assets from the current cache generation and shields the
/// query route from network failures.
pub struct OfflineInterceptor {
    config: ProxyConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    fallback: OfflineFallback,
    phase: RwLock<Phase>,
}

impl OfflineInterceptor {
    pub fn new(config: ProxyConfig, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            storage,
            fetcher,
            fallback: OfflineFallback::default(),
            phase: RwLock::new(Phase::Parsed),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    /// Install then activate straight away, without waiting for an older
    /// instance to release its clients.
    pub async fn start(&self) -> Result<Vec<String>, LifecycleError> {
        self.install().await?;
        self.activate().await
    }

    /// Pre-populate the current cache generation with the static assets.
    /// Any failed asset fails the whole install and the instance becomes redundant.
    pub async fn install(&self) -> Result<(), LifecycleError> {
        self.transition("install", Phase::Parsed, Phase::Installing)
            .await?;

        info!(
            "installing cache {} with {} static assets",
            self.config.cache_name,
            self.config.static_assets.len()
        );

        let populated = async {
            let cache = self.storage.open(&self.config.cache_name).await?;
            cache
                .add_all(&self.config.static_assets, self.fetcher.as_ref())
                .await
        }
        .await;

        if let Err(e) = populated {
            *self.phase.write().await = Phase::Redundant;
            return Err(e.into());
        }

        *self.phase.write().await = Phase::Installed;
        info!("install complete, skipping wait for activation");
        Ok(())
    }

    /// Delete every cache generation other than the current one and take over
    /// all clients. Returns the names of the deleted generations.
    pub async fn activate(&self) -> Result<Vec<String>, LifecycleError> {
        self.transition("activate", Phase::Installed, Phase::Activating)
            .await?;

        let mut deleted = Vec::new();
        for name in self.storage.keys().await {
            if name == self.config.cache_name {
                continue;
            }
            if self
                .storage
                .delete(&name)
                .await
                .map_err(LifecycleError::Activate)?
            {
                info!("deleted stale cache {}", name);
                deleted.push(name);
            }
        }

        *self.phase.write().await = Phase::Activated;
        info!(
            "activated with cache {}, claiming clients",
            self.config.cache_name
        );
        Ok(deleted)
    }

    /// Answer one intercepted request. Requests are served in every phase,
    /// including while install is still filling the cache.
    pub async fn handle_fetch(
        &self,
        request: ProxyRequest,
    ) -> Result<BufferedResponse, FetchError> {
        if self.config.is_query_route(&request.target) {
            return match self.fetcher.fetch(request.clone()).await {
                Ok(response) => Ok(response),
                Err(e) if !e.is_network() => Err(e),
                Err(e) => {
                    warn!(
                        "query {} failed, serving offline answer: {}",
                        request.target, e
                    );
                    Ok(self.fallback.response())
                }
            };
        }

        if let Some(cached) = self.storage.match_request(&request).await {
            debug!("cache hit {} {}", request.method, request.target);
            return Ok(cached);
        }

        debug!("cache miss {} {}", request.method, request.target);
        self.fetcher.fetch(request).await
    }

    async fn transition(
        &self,
        operation: &'static str,
        from: Phase,
        to: Phase,
    ) -> Result<(), LifecycleError> {
        let mut phase = self.phase.write().await;
        if *phase != from {
            return Err(LifecycleError::InvalidPhase {
                operation,
                phase: phase.as_str(),
            });
        }
        *phase = to;
        Ok(())
    }
}

//! Named cache generations.
//!
//! A [`CacheStorage`] holds any number of [`Cache`]s keyed by name. Each name is
//! one generation of pre-fetched responses; the interceptor keeps exactly one
//! of them after activation. Entries are never evicted: a generation holds
//! everything put into it until the whole generation is deleted.

mod manifest;
mod storage;

pub use storage::CacheStorage;

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    error::CacheError, fetch::Fetcher, http::response::BufferedResponse, request::ProxyRequest,
};

use manifest::{Manifest, StoredEntry};

/// Cache names double as directory names on disk.
pub fn is_valid_cache_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// One cache generation. Clones share the same entries.
#[derive(Clone, Debug)]
pub struct Cache {
    name: String,
    dir: Option<PathBuf>,
    created_at: DateTime<Utc>,
    entries: Arc<RwLock<Vec<(String, BufferedResponse)>>>,
}

impl Cache {
    pub(crate) fn new(name: &str, dir: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            dir,
            created_at: Utc::now(),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub(crate) fn restore(name: &str, dir: PathBuf, manifest: Manifest) -> Result<Self, CacheError> {
        let entries = manifest
            .entries
            .into_iter()
            .map(StoredEntry::into_response)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            dir: Some(dir),
            created_at: manifest.created_at,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref()
    }

    /// Fetch every path and store the responses. All-or-nothing: a network
    /// failure or a non-2xx status on any path stores nothing.
    pub async fn add_all(&self, paths: &[String], fetcher: &dyn Fetcher) -> Result<(), CacheError> {
        let fetches = paths.iter().map(|path| async move {
            let request = ProxyRequest::get(path.as_str());
            let response = fetcher
                .fetch(request.clone())
                .await
                .map_err(|source| CacheError::Fetch {
                    cache: self.name.clone(),
                    path: path.clone(),
                    source,
                })?;

            if !response.is_success() {
                return Err(CacheError::BadStatus {
                    cache: self.name.clone(),
                    path: path.clone(),
                    status: response.status,
                });
            }

            Ok::<_, CacheError>((request, response))
        });

        let fetched = try_join_all(fetches).await?;

        let mut entries = self.entries.write().await;
        for (request, response) in fetched {
            if let Some(key) = request.cache_key() {
                upsert(&mut entries, key, response);
            }
        }
        self.persist(&entries).await?;

        debug!("cache {} populated with {} assets", self.name, paths.len());
        Ok(())
    }

    /// Store a response. Returns false for requests that cannot be cached.
    pub async fn put(
        &self,
        request: &ProxyRequest,
        response: BufferedResponse,
    ) -> Result<bool, CacheError> {
        let Some(key) = request.cache_key() else {
            return Ok(false);
        };

        let mut entries = self.entries.write().await;
        upsert(&mut entries, key, response);
        self.persist(&entries).await?;
        Ok(true)
    }

    pub async fn match_request(&self, request: &ProxyRequest) -> Option<BufferedResponse> {
        let key = request.cache_key()?;
        self.entries
            .read()
            .await
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, response)| response.clone())
    }

    /// Keys in insertion order.
    pub async fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the current entries to disk; a no-op for in-memory caches.
    pub(crate) async fn flush(&self) -> Result<(), CacheError> {
        let entries = self.entries.read().await;
        self.persist(&entries).await
    }

    async fn persist(&self, entries: &[(String, BufferedResponse)]) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let manifest = Manifest {
            name: self.name.clone(),
            created_at: self.created_at,
            entries: entries
                .iter()
                .map(|(key, response)| StoredEntry::from_response(key, response))
                .collect(),
        };
        manifest::write(dir, &manifest).await
    }
}

/// Re-putting a key replaces the response but keeps its original position.
fn upsert(entries: &mut Vec<(String, BufferedResponse)>, key: String, response: BufferedResponse) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = response,
        None => entries.push((key, response)),
    }
}

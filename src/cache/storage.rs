use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    cache::{is_valid_cache_name, manifest, Cache},
    error::CacheError,
    http::response::BufferedResponse,
    request::ProxyRequest,
};

/// All cache generations known to the proxy, in creation order. Backed by one
/// directory per generation when opened with [`CacheStorage::load`].
pub struct CacheStorage {
    root: Option<PathBuf>,
    caches: RwLock<Vec<Cache>>,
}

impl CacheStorage {
    /// Storage that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            caches: RwLock::new(Vec::new()),
        }
    }

    /// Open the storage under `root`, restoring every generation found there.
    /// Directories without a readable manifest are skipped.
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut caches = Vec::new();
        let mut dir = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            match manifest::read(&path).await {
                Ok(Some(manifest)) => match Cache::restore(&name, path, manifest) {
                    Ok(cache) => caches.push(cache),
                    Err(e) => warn!("skipping cache {}: {}", name, e),
                },
                Ok(None) => debug!("{} holds no cache manifest", path.display()),
                Err(e) => warn!("skipping cache {}: {}", name, e),
            }
        }

        caches.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.name().cmp(b.name()))
        });

        info!(
            "loaded {} cache generations from {}",
            caches.len(),
            root.display()
        );

        Ok(Self {
            root: Some(root),
            caches: RwLock::new(caches),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Open the named cache, creating it if absent.
    pub async fn open(&self, name: &str) -> Result<Cache, CacheError> {
        if let Some(cache) = self.find(name).await {
            return Ok(cache);
        }

        let mut caches = self.caches.write().await;
        // Another task may have created it between the read and the write lock.
        if let Some(cache) = caches.iter().find(|c| c.name() == name) {
            return Ok(cache.clone());
        }

        let dir = match &self.root {
            Some(root) => {
                if !is_valid_cache_name(name) {
                    return Err(CacheError::InvalidName(name.to_string()));
                }
                let dir = root.join(name);
                tokio::fs::create_dir_all(&dir).await?;
                Some(dir)
            }
            None => None,
        };

        debug!("creating cache {}", name);
        let cache = Cache::new(name, dir);
        cache.flush().await?;
        caches.push(cache.clone());
        Ok(cache)
    }

    pub async fn has(&self, name: &str) -> bool {
        self.find(name).await.is_some()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.caches
            .read()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Remove the named cache and its directory. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().await;
        let Some(index) = caches.iter().position(|c| c.name() == name) else {
            return Ok(false);
        };

        let cache = caches.remove(index);
        if let Some(dir) = cache.dir() {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    caches.insert(index, cache);
                    return Err(e.into());
                }
            }
        }

        debug!("deleted cache {}", name);
        Ok(true)
    }

    /// Look the request up in every generation, oldest first.
    pub async fn match_request(&self, request: &ProxyRequest) -> Option<BufferedResponse> {
        let caches = self.caches.read().await.clone();
        for cache in caches {
            if let Some(response) = cache.match_request(request).await {
                return Some(response);
            }
        }
        None
    }

    /// Whether any generation holds at least one entry.
    pub async fn has_entries(&self) -> bool {
        let caches = self.caches.read().await.clone();
        for cache in caches {
            if !cache.is_empty().await {
                return true;
            }
        }
        false
    }

    async fn find(&self, name: &str) -> Option<Cache> {
        self.caches
            .read()
            .await
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }
}

// On-disk layout of one cache generation: `<root>/<cache name>/manifest.json`.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{error::CacheError, http::response::BufferedResponse};

pub(crate) const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Base64 of the response body.
    pub body: String,
}

impl StoredEntry {
    pub fn from_response(key: &str, response: &BufferedResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            key: key.to_string(),
            status: response.status.as_u16(),
            headers,
            body: STANDARD.encode(&response.body),
        }
    }

    pub fn into_response(self) -> Result<(String, BufferedResponse), CacheError> {
        let corrupt = |reason: String| CacheError::Corrupt {
            key: self.key.clone(),
            reason,
        };

        let status = StatusCode::from_u16(self.status).map_err(|e| corrupt(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| corrupt(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| corrupt(e.to_string()))?;
            headers.append(name, value);
        }

        let body = STANDARD
            .decode(&self.body)
            .map_err(|e| corrupt(e.to_string()))?;

        Ok((
            self.key.clone(),
            BufferedResponse {
                status,
                headers,
                body: body.into(),
            },
        ))
    }
}

/// Replace the manifest in `dir`. Written to a temp file first so a crash never
/// leaves a half-written manifest behind.
pub(crate) async fn write(dir: &Path, manifest: &Manifest) -> Result<(), CacheError> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec(manifest).map_err(|source| CacheError::Manifest {
        path: path.display().to_string(),
        source,
    })?;

    let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

/// `None` when the directory holds no manifest.
pub(crate) async fn read(dir: &Path) -> Result<Option<Manifest>, CacheError> {
    let path = dir.join(MANIFEST_FILE);
    let json = match tokio::fs::read(&path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&json)
        .map(Some)
        .map_err(|source| CacheError::Manifest {
            path: path.display().to_string(),
            source,
        })
}

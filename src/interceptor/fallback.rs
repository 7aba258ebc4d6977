use serde::Serialize;

use crate::http::response::BufferedResponse;

pub const OFFLINE_ANSWER: &str =
    "You are offline. Please check your connection. For urgent help call 1800-180-1551.";

/// Payload substituted for a query the network could not answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfflineFallback {
    pub answer: String,
    pub method: String,
    pub sources: Vec<String>,
    pub related: Vec<String>,
}

impl Default for OfflineFallback {
    fn default() -> Self {
        Self {
            answer: OFFLINE_ANSWER.to_string(),
            method: "offline".to_string(),
            sources: Vec::new(),
            related: Vec::new(),
        }
    }
}

impl OfflineFallback {
    pub fn to_json(&self) -> String {
        // Plain strings and empty vectors cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn response(&self) -> BufferedResponse {
        BufferedResponse::json(self.to_json())
    }
}

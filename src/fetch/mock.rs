use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::FetchError, fetch::Fetcher, http::response::BufferedResponse, request::ProxyRequest,
};

#[derive(Debug, Clone)]
enum Reply {
    Respond(BufferedResponse),
    Fail,
}

/// Scripted fetcher keyed by request target. Unscripted targets fail like an
/// unreachable network. Every call is recorded.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<ProxyRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, target: &str, response: BufferedResponse) {
        self.replies
            .lock()
            .await
            .insert(target.to_string(), Reply::Respond(response));
    }

    pub async fn fail(&self, target: &str) {
        self.replies
            .lock()
            .await
            .insert(target.to_string(), Reply::Fail);
    }

    /// Fail every scripted target, as if the network went away.
    pub async fn go_offline(&self) {
        for reply in self.replies.lock().await.values_mut() {
            *reply = Reply::Fail;
        }
    }

    pub async fn calls(&self) -> Vec<ProxyRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, target: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|r| r.target == target)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: ProxyRequest) -> Result<BufferedResponse, FetchError> {
        let target = request.target.clone();
        self.calls.lock().await.push(request);

        match self.replies.lock().await.get(&target) {
            Some(Reply::Respond(response)) => Ok(response.clone()),
            Some(Reply::Fail) | None => Err(FetchError::Simulated(target)),
        }
    }
}

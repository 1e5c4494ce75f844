//! Client for the media server's control API.
//!
//! Only used for readiness polling and path statistics; any failure is
//! treated as "not ready".

use std::time::Duration;

use serde::Deserialize;

/// Per-path statistics as reported by `/v3/paths/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct PathStat {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, rename = "bytesReceived")]
    pub bytes_received: u64,
    #[serde(default)]
    pub source: Option<PathSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSource {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PathList {
    #[serde(default)]
    items: Vec<PathStat>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(api_port: u16) -> Self {
        Self {
            base: format!("http://127.0.0.1:{}", api_port),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .expect("reqwest client"),
        }
    }

    /// Whether the named path exists and reports ready.
    pub async fn path_ready(&self, name: &str) -> bool {
        let url = format!("{}/v3/paths/get/{}", self.base, name);
        let Ok(resp) = self.http.get(&url).send().await else {
            return false;
        };
        if !resp.status().is_success() {
            return false;
        }
        match resp.json::<serde_json::Value>().await {
            Ok(v) => v.get("ready").and_then(|r| r.as_bool()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// All active paths, or `None` when the API is unreachable.
    pub async fn list_paths(&self) -> Option<Vec<PathStat>> {
        let url = format!("{}/v3/paths/list", self.base);
        let resp = self.http.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<PathList>().await.ok().map(|l| l.items)
    }
}

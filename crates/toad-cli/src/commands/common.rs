use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toad_core::mirror::OfflineMirror;
use toad_core::store::JsonFileStore;
use toad_core::{ClaimError, ClaimRecord, SystemClock};

/// Offline mirror file inside the config directory.
pub const MIRROR_FILE: &str = "mirror.json";

/// Shared by every command: API location, bounded HTTP client, local mirror.
pub struct Context {
    pub api: String,
    pub client: reqwest::Client,
    pub mirror: OfflineMirror,
}

impl Context {
    pub fn new(
        api: &str,
        config_dir: &Path,
        timeout_secs: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            api: api.trim_end_matches('/').to_string(),
            client,
            mirror: open_mirror(config_dir),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api, path)
    }
}

pub fn open_mirror(config_dir: &Path) -> OfflineMirror {
    let store = JsonFileStore::new(config_dir.join(MIRROR_FILE));
    OfflineMirror::new(Arc::new(store), Arc::new(SystemClock))
}

/// Server record for `address`. Any transport or protocol failure is
/// reported as `NetworkUnavailable` so callers can fall back to the mirror.
pub async fn fetch_record(ctx: &Context, address: &str) -> Result<ClaimRecord, ClaimError> {
    let response = ctx
        .client
        .get(ctx.url("/claim"))
        .query(&[("address", address)])
        .send()
        .await
        .map_err(|e| ClaimError::NetworkUnavailable(e.to_string()))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ClaimError::NetworkUnavailable(format!("unreadable reply: {}", e)))?;

    if !status.is_success() || body["ok"] != Value::Bool(true) {
        return Err(ClaimError::NetworkUnavailable(format!(
            "HTTP {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        )));
    }

    serde_json::from_value(body)
        .map_err(|e| ClaimError::NetworkUnavailable(format!("unexpected record: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warp::Filter;

    #[tokio::test]
    async fn test_fetch_record_reads_server_reply() {
        let route = warp::path("claim")
            .and(warp::query::<std::collections::HashMap<String, String>>())
            .map(|q: std::collections::HashMap<String, String>| {
                assert_eq!(q.get("address").map(String::as_str), Some("0xabc"));
                warp::reply::json(
                    &serde_json::json!({"ok": true, "total": 300, "last": 42, "streak": 2}),
                )
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let dir = TempDir::new().unwrap();
        let ctx = Context::new(&format!("http://{}/", addr), dir.path(), 2).unwrap();
        let record = fetch_record(&ctx, "0xabc").await.unwrap();
        assert_eq!(
            record,
            ClaimRecord {
                total: 300,
                last: 42,
                streak: 2
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_record_unreachable() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("http://127.0.0.1:9", dir.path(), 1).unwrap();
        assert!(matches!(
            fetch_record(&ctx, "0xabc").await,
            Err(ClaimError::NetworkUnavailable(_))
        ));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("http://localhost:3030/", dir.path(), 10).unwrap();
        assert_eq!(ctx.url("/claim"), "http://localhost:3030/claim");
    }
}

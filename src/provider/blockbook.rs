use super::{BlockPage, BlockProvider, ProviderStatus, RawBalance, RawTransaction};
use crate::error::ApiError;
use anyhow::Result;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // 2 minutes timeout per request

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockbookSection {
    #[serde(default)]
    in_sync: bool,
    #[serde(default)]
    best_height: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSection {
    #[serde(default)]
    warnings: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    blockbook: Option<BlockbookSection>,
    #[serde(default)]
    backend: Option<BackendSection>,
}

impl StatusResponse {
    fn into_status(self) -> Result<ProviderStatus, ApiError> {
        let blockbook = self
            .blockbook
            .ok_or_else(|| ApiError::Status("Invalid info(empty blockbook)".into()))?;
        let backend = self
            .backend
            .ok_or_else(|| ApiError::Status("Invalid info(empty backend)".into()))?;
        let warnings = match backend.warnings {
            Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s],
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .map(|w| match w {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(ProviderStatus {
            synced: blockbook.in_sync,
            warnings,
            best_height: blockbook.best_height,
        })
    }
}

/// Blockbook REST client over a pool of backends. Failed or timed out requests
/// rotate to the next backend and are retried with exponential backoff.
#[derive(Clone)]
pub struct BlockbookClient {
    http: reqwest::Client,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl BlockbookClient {
    pub fn new(base_urls: &[String]) -> Result<Self> {
        if base_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one provider URL must be provided"));
        }

        let mut urls = Vec::new();
        for url in base_urls {
            let parsed = reqwest::Url::parse(url)
                .map_err(|_| anyhow::anyhow!("Invalid provider URL: {}", url))?;
            urls.push(parsed.as_str().trim_end_matches('/').to_string());
        }

        let http = reqwest::Client::builder()
            .user_agent("chain-recon")
            .build()?;

        Ok(BlockbookClient {
            http,
            urls,
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.urls.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.urls.len() > 1 {
            debug!("Rotating to provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error: &ApiError) {
        warn!(
            "Provider error on {}: {}, rotating provider",
            self.get_current_url(),
            error
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> ApiError {
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        ApiError::Timeout(REQUEST_TIMEOUT.as_secs())
    }

    /// GETs `path` and decodes the JSON body. A `null` body decodes to `None`.
    async fn request<T: DeserializeOwned>(&self, path: String) -> Result<Option<T>, ApiError> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let path = path.clone();
            async move {
                let url = format!("{}{}", client.get_current_url(), path);
                let send = async {
                    let response = client.http.get(&url).send().await?;
                    let response = response.error_for_status()?;
                    let body: Option<T> = response.json().await?;
                    Ok::<_, ApiError>(body)
                };

                match timeout(REQUEST_TIMEOUT, send).await {
                    Ok(Ok(body)) => Ok(body),
                    Ok(Err(e)) => {
                        client.handle_error(&e);
                        Err(e)
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }
}

impl BlockProvider for BlockbookClient {
    async fn get_status(&self) -> Result<ProviderStatus, ApiError> {
        let info: Option<StatusResponse> = self.request("/api/".to_string()).await?;
        info.ok_or(ApiError::EmptyResponse("get_info"))?
            .into_status()
    }

    async fn get_block(&self, height: u64, page: u32) -> Result<Option<BlockPage>, ApiError> {
        self.request(format!("/api/v2/block/{height}?page={page}"))
            .await
    }

    async fn get_tx(&self, hash: &str) -> Result<Option<RawTransaction>, ApiError> {
        self.request(format!("/api/v2/tx/{hash}")).await
    }

    async fn get_balance(
        &self,
        address: &str,
        details: &str,
    ) -> Result<Option<RawBalance>, ApiError> {
        // Extended public keys are served from a separate endpoint.
        let path = if address.len() == 111 {
            format!("/api/v2/xpub/{address}?details={details}")
        } else {
            format!("/api/v2/address/{address}?details={details}&pageSize=50")
        };
        self.request(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn status_maps_warnings_string() {
        let raw: StatusResponse = serde_json::from_value(json!({
            "blockbook": {"inSync": true, "bestHeight": 812345},
            "backend": {"warnings": "node is syncing"}
        }))
        .unwrap();
        let status = raw.into_status().unwrap();
        assert!(status.synced);
        assert_eq!(status.best_height, Some(812345));
        assert_eq!(status.warnings, vec!["node is syncing".to_string()]);
    }

    #[test]
    fn status_without_backend_is_rejected() {
        let raw: StatusResponse =
            serde_json::from_value(json!({"blockbook": {"inSync": true}})).unwrap();
        assert_matches!(raw.into_status(), Err(ApiError::Status(_)));
    }

    #[test]
    fn client_requires_urls() {
        assert!(BlockbookClient::new(&[]).is_err());
        assert!(BlockbookClient::new(&["not a url".to_string()]).is_err());
        let client =
            BlockbookClient::new(&["https://btc1.example.org/".to_string()]).unwrap();
        assert_eq!(client.get_current_url(), "https://btc1.example.org");
    }

    #[test]
    fn rotation_wraps_around() {
        let client = BlockbookClient::new(&[
            "https://a.example.org".to_string(),
            "https://b.example.org".to_string(),
        ])
        .unwrap();
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "https://b.example.org");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "https://a.example.org");
    }
}

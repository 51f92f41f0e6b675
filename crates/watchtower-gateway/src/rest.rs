//! Pooled REST client with round-robin endpoint rotation.

use crate::chaindata::BlockResponse;
use crate::error::{GatewayError, GatewayResult};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout for a single endpoint attempt.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Connect timeout for a single endpoint attempt.
const CONNECT_TIMEOUT_SECS: u64 = 3;

/// REST client for one network, hiding endpoint failover.
///
/// Endpoint selection is session-local: a failed request advances the
/// rotation cursor and retries on the next endpoint, and the request
/// aborts with a terminal error after one full rotation without success.
/// No persistent health state is kept.
#[derive(Debug)]
pub struct RestClient {
    client: reqwest::Client,
    endpoints: Vec<String>,
    cursor: AtomicUsize,
}

impl RestClient {
    /// Create a client over one or more base URLs.
    pub fn new(endpoints: Vec<String>) -> GatewayResult<Self> {
        if endpoints.is_empty() {
            return Err(GatewayError::NoEndpoints { kind: "REST" });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of configured endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Issue a GET and decode the JSON body, rotating endpoints on failure.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let n = self.endpoints.len();
        let start = self.cursor.load(Ordering::Relaxed);
        let mut last_error = String::new();

        for attempt in 0..n {
            let index = (start + attempt) % n;
            let url = join_url(&self.endpoints[index], path);

            match self.try_get::<T>(&url, query).await {
                Ok(value) => {
                    self.cursor.store(index, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        endpoint = %self.endpoints[index],
                        path,
                        error = %e,
                        "REST endpoint failed, rotating"
                    );
                    last_error = e.to_string();
                    self.cursor.store((index + 1) % n, Ordering::Relaxed);
                }
            }
        }

        Err(GatewayError::AllEndpointsFailed {
            path: path.to_string(),
            tried: n,
            last_error,
        })
    }

    async fn try_get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                path: url.to_string(),
            });
        }
        response.json::<T>().await.map_err(|e| GatewayError::Decode {
            path: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Latest chain height from the tendermint latest-block endpoint.
    pub async fn current_height(&self) -> GatewayResult<u64> {
        let response: BlockResponse = self
            .get("/cosmos/base/tendermint/v1beta1/blocks/latest", &[])
            .await?;
        Ok(response.block.header.height)
    }

    /// Probe node health via `/status`; succeeds on any 2xx.
    pub async fn check_health(&self) -> GatewayResult<()> {
        let _: serde_json::Value = self.get("/status", &[]).await?;
        debug!("node health probe succeeded");
        Ok(())
    }
}

/// Join a base URL and a path without doubling or dropping slashes.
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_slash_handling() {
        assert_eq!(join_url("http://n:1317", "/status"), "http://n:1317/status");
        assert_eq!(join_url("http://n:1317/", "/status"), "http://n:1317/status");
        assert_eq!(join_url("http://n:1317/", "status"), "http://n:1317/status");
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        let err = RestClient::new(Vec::new()).unwrap_err();
        assert!(matches!(err, GatewayError::NoEndpoints { kind: "REST" }));
    }

    #[tokio::test]
    async fn test_full_rotation_is_terminal() {
        // Unroutable addresses; every attempt fails and the rotation ends
        // in a terminal error that names the full endpoint count.
        let client = RestClient::new(vec![
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:2".to_string(),
        ])
        .unwrap();
        let err = client
            .get::<serde_json::Value>("/status", &[])
            .await
            .unwrap_err();
        match err {
            GatewayError::AllEndpointsFailed { tried, .. } => assert_eq!(tried, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! JSON-RPC WebSocket event subscription with backoff reconnect.

use crate::error::{GatewayError, GatewayResult};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Ring capacity of the raw event channel; on overflow the oldest frames
/// are dropped and lagging consumers observe the loss.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Base delay for exponential reconnect backoff.
const RECONNECT_BASE_DELAY_SECS: u64 = 2;

/// Backoff exponent cap: delay never exceeds `base * 2^10`.
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Reconnect attempts against one endpoint before rotating to the next.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// One stream subscription: an id and a tendermint event query.
#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    /// JSON-RPC request id, echoed in the subscription ack.
    pub id: String,
    /// Tendermint event query.
    pub query: String,
}

impl SubscriptionFilter {
    /// Subscription for every new block.
    pub fn new_block() -> Self {
        Self {
            id: "newBlock".to_string(),
            query: "tm.event='NewBlock'".to_string(),
        }
    }

    /// Subscription for checkpoint-sealed transactions.
    pub fn checkpoint_sealed() -> Self {
        Self {
            id: "checkpoint_for_bls".to_string(),
            query: "tm.event='Tx' AND babylon.checkpointing.v1.EventCheckpointSealed.checkpoint \
                    CONTAINS 'epoch_num'"
                .to_string(),
        }
    }
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    id: &'a str,
    params: [&'a str; 1],
}

/// Long-lived event stream over one of several WebSocket endpoints.
///
/// Frames are published into a broadcast ring in arrival order; the stream
/// never reorders or deduplicates. On disconnect the client reconnects
/// with exponential backoff (`base * 2^(attempt-1)`, exponent capped), and
/// after [`MAX_RECONNECT_ATTEMPTS`] failures it rotates to the next
/// endpoint and resets the attempt counter. Skipped heights are recovered
/// by the block pipeline's gap catch-up, not here.
#[derive(Debug)]
pub struct EventSubscription {
    endpoints: Vec<String>,
    filters: Vec<SubscriptionFilter>,
    events_tx: broadcast::Sender<serde_json::Value>,
}

impl EventSubscription {
    /// Create a subscription over one or more WebSocket URLs.
    pub fn new(endpoints: Vec<String>, filters: Vec<SubscriptionFilter>) -> GatewayResult<Self> {
        if endpoints.is_empty() {
            return Err(GatewayError::NoEndpoints { kind: "event stream" });
        }
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            endpoints,
            filters,
            events_tx,
        })
    }

    /// Obtain a receiver for raw event frames.
    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.events_tx.subscribe()
    }

    /// Drive the connection until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut endpoint_index = 0usize;
        let mut attempt = 0u32;

        loop {
            if *shutdown.borrow() {
                return;
            }
            let url = &self.endpoints[endpoint_index];

            match self.run_connection(url, &mut shutdown).await {
                Ok(()) => {
                    info!(endpoint = %url, "event stream closed on shutdown");
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    warn!(
                        endpoint = %url,
                        attempt,
                        error = %e,
                        "event stream disconnected"
                    );
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        endpoint_index = (endpoint_index + 1) % self.endpoints.len();
                        attempt = 0;
                        warn!(
                            endpoint = %self.endpoints[endpoint_index],
                            "rotating to next event endpoint"
                        );
                        continue;
                    }
                    let shift = (attempt.saturating_sub(1)).min(MAX_BACKOFF_SHIFT);
                    let delay = RECONNECT_BASE_DELAY_SECS * (1u64 << shift);
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_secs(delay)) => {}
                        _ = shutdown.changed() => return,
                    }
                }
            }
        }
    }

    /// Run one connection: subscribe to every filter, then pump frames.
    ///
    /// Returns `Ok(())` only when shutdown was requested; every other exit
    /// is an error that triggers the reconnect path.
    async fn run_connection(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GatewayResult<()> {
        let (ws_stream, _) = connect_async(url).await.map_err(|e| GatewayError::Stream {
            reason: format!("connect failed: {e}"),
        })?;
        info!(endpoint = %url, "event stream connected");

        let (mut write, mut read) = ws_stream.split();

        for filter in &self.filters {
            let request = SubscribeRequest {
                jsonrpc: "2.0",
                method: "subscribe",
                id: &filter.id,
                params: [&filter.query],
            };
            let text = serde_json::to_string(&request).map_err(|e| GatewayError::Stream {
                reason: format!("encode subscribe: {e}"),
            })?;
            write
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| GatewayError::Stream {
                    reason: format!("send subscribe: {e}"),
                })?;
            debug!(id = %filter.id, query = %filter.query, "subscription requested");
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<serde_json::Value>(&text) {
                                Ok(frame) => {
                                    // No receivers is fine during startup.
                                    let _ = self.events_tx.send(frame);
                                }
                                Err(e) => {
                                    let head: String = text.chars().take(256).collect();
                                    debug!(error = %e, payload = %head, "unparseable frame dropped");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(GatewayError::Stream {
                                reason: "connection closed by server".to_string(),
                            });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(GatewayError::Stream {
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
}

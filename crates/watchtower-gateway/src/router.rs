//! Stateless demultiplexer for raw stream frames.
//!
//! Routing depends only on the current frame: block events carry
//! `result.data.value.block.header.height`, checkpoint-sealed events carry
//! an events entry whose key names the sealed-checkpoint attribute and
//! whose value embeds an `epoch_num` figure. Subscription acks and unknown
//! shapes are discarded with debug logging only.

use crate::chaindata::Block;
use serde_json::Value;
use tracing::debug;

/// Events attribute key published by a sealed checkpoint.
const CHECKPOINT_SEALED_KEY: &str = "babylon.checkpointing.v1.EventCheckpointSealed.checkpoint";

/// A routed chain event.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A new block with its embedded commit.
    NewBlock(Block),
    /// A checkpoint was sealed for the given epoch.
    CheckpointSealed {
        /// Epoch parsed from the event attribute.
        epoch: u64,
    },
}

/// Classify one raw frame; `None` for acks and unknown shapes.
pub fn route_frame(frame: &Value) -> Option<ChainEvent> {
    let result = frame.get("result")?;

    // Subscription acks echo the request id with an empty or boolean result.
    if result.as_bool() == Some(true) || result.as_object().is_some_and(|o| o.is_empty()) {
        debug!(id = ?frame.get("id"), "subscription acknowledged");
        return None;
    }

    if let Some(block_value) = result
        .pointer("/data/value/block")
        .filter(|b| b.pointer("/header/height").is_some())
    {
        match serde_json::from_value::<Block>(block_value.clone()) {
            Ok(block) => return Some(ChainEvent::NewBlock(block)),
            Err(e) => {
                debug!(error = %e, "block event failed to decode, dropped");
                return None;
            }
        }
    }

    if let Some(events) = result.get("events").and_then(Value::as_object) {
        for (key, values) in events {
            if !key.contains(CHECKPOINT_SEALED_KEY) {
                continue;
            }
            let epoch = values
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .find_map(extract_epoch_num);
            if let Some(epoch) = epoch {
                return Some(ChainEvent::CheckpointSealed { epoch });
            }
            debug!("checkpoint-sealed event without parseable epoch, dropped");
            return None;
        }
    }

    debug!("unrecognized frame shape, dropped");
    None
}

/// Pull the first digit run following an `epoch_num` marker.
fn extract_epoch_num(text: &str) -> Option<u64> {
    let offset = text.find("epoch_num")? + "epoch_num".len();
    let rest = &text[offset..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_epoch_num_variants() {
        assert_eq!(extract_epoch_num(r#"{"epoch_num": "5"}"#), Some(5));
        assert_eq!(extract_epoch_num("epoch_num=42"), Some(42));
        assert_eq!(extract_epoch_num("epoch_num"), None);
        assert_eq!(extract_epoch_num("no marker here"), None);
    }

    #[test]
    fn test_ack_frames_are_discarded() {
        let empty_ack = json!({"jsonrpc": "2.0", "id": "newBlock", "result": {}});
        assert!(route_frame(&empty_ack).is_none());
        let bool_ack = json!({"jsonrpc": "2.0", "id": "newBlock", "result": true});
        assert!(route_frame(&bool_ack).is_none());
    }

    #[test]
    fn test_block_frame_routes_to_new_block() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": "newBlock",
            "result": {
                "data": {
                    "type": "tendermint/event/NewBlock",
                    "value": {
                        "block": {
                            "header": {"height": "123", "time": "2024-01-01T00:00:00Z"},
                            "last_commit": {
                                "round": 0,
                                "signatures": [{
                                    "block_id_flag": "BLOCK_ID_FLAG_COMMIT",
                                    "validator_address": "AA11",
                                    "signature": "c2ln"
                                }]
                            }
                        }
                    }
                }
            }
        });
        match route_frame(&frame) {
            Some(ChainEvent::NewBlock(block)) => {
                assert_eq!(block.header.height, 123);
                assert_eq!(block.signer_addresses().collect::<Vec<_>>(), vec!["AA11"]);
            }
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn test_checkpoint_frame_routes_with_epoch() {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": "checkpoint_for_bls",
            "result": {
                "data": {"type": "tendermint/event/Tx", "value": {}},
                "events": {
                    "babylon.checkpointing.v1.EventCheckpointSealed.checkpoint":
                        [r#"{"ckpt": {"epoch_num": "17", "bls_multi_sig": "..."}}"#]
                }
            }
        });
        match route_frame(&frame) {
            Some(ChainEvent::CheckpointSealed { epoch }) => assert_eq!(epoch, 17),
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_shapes_are_discarded() {
        assert!(route_frame(&json!({"jsonrpc": "2.0"})).is_none());
        assert!(route_frame(&json!({"result": {"events": {"other.key": ["x"]}}})).is_none());
    }
}

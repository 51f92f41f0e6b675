//! End-to-end participation scenarios through aggregators and governor.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{chain, T0};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use watchtower_directory::Directory;
    use watchtower_gateway::chaindata::InjectedCheckpoint;
    use watchtower_gateway::RestClient;
    use watchtower_pipeline::{
        BlockObservationHandler, BlockPipeline, BlockPipelineConfig, CheckpointObservationHandler,
        CheckpointPipeline, EpochTracker,
    };
    use watchtower_types::{AlertSeverity, BlsStatsRepository, Network, ValidatorStatsRepository};

    // =========================================================================
    // BASIC SIGNING
    // =========================================================================

    /// A validator signing every one of 100 blocks ends with a perfect
    /// record and no alerts.
    #[tokio::test]
    async fn test_steady_signer_has_perfect_stats() {
        let chain = chain().await;
        chain.with_validator("AA11", "alpha").await;

        for height in 100..200u64 {
            chain.feed_block(height, &["AA11"]).await;
        }

        let stats = ValidatorStatsRepository::get(
            chain.store.as_ref(),
            Network::Mainnet,
            "AA11",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stats.total_blocks_in_window, 100);
        assert_eq!(stats.total_signed_blocks, 100);
        assert_eq!(stats.signature_rate, 100.0);
        assert_eq!(stats.consecutive_signed, 100);
        assert_eq!(stats.consecutive_missed, 0);
        assert_eq!(stats.recent_blocks.len(), 100);
        assert!(chain.sink.is_empty());
    }

    // =========================================================================
    // DEGRADATION AND RECOVERY
    // =========================================================================

    /// 200 signed then 50 missed: the rate crosses the threshold once and
    /// the miss run crosses the consecutive threshold once.
    #[tokio::test]
    async fn test_degrading_signer_alerts_once_per_rule() {
        let chain = chain().await;
        chain.with_validator("BB22", "beta").await;

        for height in 0..200u64 {
            chain.feed_block(1000 + height, &["BB22"]).await;
        }
        for height in 200..250u64 {
            chain.feed_block(1000 + height, &[]).await;
        }

        let stats = ValidatorStatsRepository::get(
            chain.store.as_ref(),
            Network::Mainnet,
            "BB22",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stats.total_blocks_in_window, 250);
        assert_eq!(stats.total_signed_blocks, 200);
        assert_eq!(stats.signature_rate, 80.0);
        assert_eq!(stats.consecutive_missed, 50);
        assert_eq!(stats.consecutive_signed, 0);

        let titles = chain.alert_titles();
        assert_eq!(
            titles
                .iter()
                .filter(|t| *t == "Validator signature rate low")
                .count(),
            1
        );
        assert_eq!(
            titles
                .iter()
                .filter(|t| *t == "Validator missing consecutive blocks")
                .count(),
            1
        );
        assert_eq!(titles.len(), 2);
    }

    /// Continuing the degraded run with signed blocks: the critical flag
    /// clears on the first signed block and exactly one recovery fires
    /// when the rate climbs back over the threshold.
    #[tokio::test]
    async fn test_recovering_signer_fires_single_recovery() {
        let chain = chain().await;
        chain.with_validator("BB22", "beta").await;

        for height in 0..200u64 {
            chain.feed_block(1000 + height, &["BB22"]).await;
        }
        for height in 200..250u64 {
            chain.feed_block(1000 + height, &[]).await;
        }
        assert_eq!(chain.sink.len(), 2);

        // 50 signed: rate 250/300, still below threshold, no new alerts.
        for height in 250..300u64 {
            chain.feed_block(1000 + height, &["BB22"]).await;
        }
        let stats = ValidatorStatsRepository::get(
            chain.store.as_ref(),
            Network::Mainnet,
            "BB22",
        )
        .await
        .unwrap()
        .unwrap();
        assert!((stats.signature_rate - 83.33).abs() < 0.01);
        assert_eq!(stats.consecutive_signed, 50);
        assert_eq!(chain.sink.len(), 2);

        // 50 more: rate 300/350, still below threshold.
        for height in 300..350u64 {
            chain.feed_block(1000 + height, &["BB22"]).await;
        }
        assert_eq!(chain.sink.len(), 2);

        // 150 more: the rate reaches the threshold and one recovery fires.
        for height in 350..500u64 {
            chain.feed_block(1000 + height, &["BB22"]).await;
        }
        let stats = ValidatorStatsRepository::get(
            chain.store.as_ref(),
            Network::Mainnet,
            "BB22",
        )
        .await
        .unwrap()
        .unwrap();
        assert!(stats.signature_rate >= 90.0);

        let titles = chain.alert_titles();
        assert_eq!(
            titles
                .iter()
                .filter(|t| *t == "Validator signature rate recovered")
                .count(),
            1
        );
        assert_eq!(titles.len(), 3);
    }

    // =========================================================================
    // CHECKPOINT EXTRACTION
    // =========================================================================

    fn injected_checkpoint(epoch: u64) -> InjectedCheckpoint {
        serde_json::from_value(serde_json::json!({
            "ckpt": {"ckpt": {"epoch_num": epoch.to_string()}},
            "extended_commit_info": {
                "votes": [
                    {
                        "validator": {"address": "A", "power": "100"},
                        "block_id_flag": "BLOCK_ID_FLAG_COMMIT",
                        "extension_signature": "c2ln"
                    },
                    {
                        "validator": {"address": "B", "power": "200"},
                        "block_id_flag": "BLOCK_ID_FLAG_COMMIT",
                        "extension_signature": ""
                    },
                    {
                        "validator": {"address": "C", "power": "50"},
                        "block_id_flag": "BLOCK_ID_FLAG_COMMIT",
                        "extension_signature": "c2ln"
                    },
                    {
                        "validator": {"address": "D", "power": "50"},
                        "block_id_flag": "BLOCK_ID_FLAG_NIL",
                        "extension_signature": "c2ln"
                    }
                ]
            }
        }))
        .unwrap()
    }

    /// A four-vote checkpoint produces the expected power split, the
    /// persisted record, and per-validator plus aggregate alerts.
    #[tokio::test]
    async fn test_checkpoint_power_split_and_alerts() {
        let chain = chain().await;

        let rest = Arc::new(RestClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap());
        let (events_tx, _events_rx) = mpsc::channel(8);
        let directory = Arc::new(Directory::new(
            Network::Mainnet,
            rest.clone(),
            chain.store.clone(),
            events_tx,
            Duration::from_secs(3600),
        ));
        let bls_handler: Arc<dyn CheckpointObservationHandler> =
            Arc::new(watchtower_aggregate::BlsCheckpointAggregator::new(
                Network::Mainnet,
                Default::default(),
                chain.store.clone(),
                chain.governor.clone(),
                chain.clock.clone(),
            ));
        let pipeline = CheckpointPipeline::new(
            Network::Mainnet,
            rest,
            directory,
            Arc::new(EpochTracker::new()),
            vec![bls_handler],
        );

        pipeline.process_checkpoint(5, injected_checkpoint(5)).await;
        assert!(pipeline.is_processed(5));

        let stats = BlsStatsRepository::get(chain.store.as_ref(), Network::Mainnet, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.total_validators, 4);
        assert_eq!(stats.total_power, 400);
        assert_eq!(stats.signed_power, 150);
        assert_eq!(stats.unsigned_power, 250);
        assert_eq!(stats.participation_rate_by_power, "37.50%");
        assert_eq!(stats.participation_rate_by_count, "50.00%");
        assert_eq!(stats.timestamp, T0);

        // B (empty signature) and D (wrong flag) missed: two criticals,
        // then one aggregate warning at 37.5% of power.
        let alerts = chain.sink.alerts();
        let criticals = alerts
            .iter()
            .filter(|a| a.title == "Validator missed BLS checkpoint signature")
            .count();
        assert_eq!(criticals, 2);
        assert_eq!(
            alerts
                .iter()
                .filter(|a| a.title == "Low BLS checkpoint participation"
                    && a.severity == AlertSeverity::Warning)
                .count(),
            1
        );
    }

    // =========================================================================
    // FINALITY LAG ELIGIBILITY
    // =========================================================================

    fn stream_block(height: u64) -> watchtower_gateway::chaindata::Block {
        serde_json::from_value(serde_json::json!({
            "header": {"height": height.to_string(), "time": "2024-01-01T00:00:00Z"},
            "last_commit": {"round": 0, "signatures": []}
        }))
        .unwrap()
    }

    /// A streamed height becomes eligible only once the tip has moved the
    /// finality lag past it.
    #[tokio::test]
    async fn test_streamed_height_waits_for_finality_lag() {
        struct Heights(parking_lot::Mutex<Vec<u64>>);
        #[async_trait::async_trait]
        impl BlockObservationHandler for Heights {
            async fn handle_block(&self, observation: &watchtower_types::BlockObservation) {
                self.0.lock().push(observation.height);
            }
        }
        let seen = Arc::new(Heights(parking_lot::Mutex::new(Vec::new())));
        let rest = Arc::new(RestClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap());
        let pipeline = BlockPipeline::new(
            Network::Mainnet,
            BlockPipelineConfig::for_testing(),
            rest,
            Arc::new(EpochTracker::new()),
            vec![seen.clone()],
        );

        for height in [1101u64, 1102, 1103] {
            pipeline.ingest(stream_block(height)).await;
        }
        assert!(seen.0.lock().is_empty(), "tip too close, nothing eligible");

        pipeline.ingest(stream_block(1104)).await;
        assert_eq!(*seen.0.lock(), vec![1101]);
        assert_eq!(pipeline.watermark(), 1101);
    }
}

//! Alert-governor laws exercised across the full aggregation chain.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::chain;
    use watchtower_types::{FinalityProviderStatsRepository, Network, ValidatorStatsRepository};

    // =========================================================================
    // DETERMINISM AND DEDUPLICATION
    // =========================================================================

    /// Replaying one observation sequence from an empty store yields the
    /// same final record and the same alert sequence.
    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let mut final_stats = Vec::new();
        let mut final_titles = Vec::new();

        for _ in 0..2 {
            let chain = chain().await;
            chain.with_validator("CC33", "gamma").await;

            for height in 0..150u64 {
                let signed = height % 4 != 3;
                let signers: &[&str] = if signed { &["CC33"] } else { &[] };
                chain.feed_block(2000 + height, signers).await;
            }

            let stats = ValidatorStatsRepository::get(
                chain.store.as_ref(),
                Network::Mainnet,
                "CC33",
            )
            .await
            .unwrap()
            .unwrap();
            final_stats.push(stats);
            final_titles.push(chain.alert_titles());
        }

        assert_eq!(final_stats[0], final_stats[1]);
        assert_eq!(final_titles[0], final_titles[1]);
    }

    /// The block pipeline delivers each height to the aggregators exactly
    /// once, so re-sent stream events do not distort the window.
    #[tokio::test]
    async fn test_pipeline_dedup_protects_the_window() {
        use std::sync::Arc;
        use watchtower_gateway::RestClient;
        use watchtower_pipeline::{BlockPipeline, BlockPipelineConfig, EpochTracker};
        use watchtower_types::BlockObservation;

        struct Count(parking_lot::Mutex<Vec<u64>>);
        #[async_trait::async_trait]
        impl watchtower_pipeline::BlockObservationHandler for Count {
            async fn handle_block(&self, observation: &BlockObservation) {
                self.0.lock().push(observation.height);
            }
        }

        let seen = Arc::new(Count(parking_lot::Mutex::new(Vec::new())));
        let rest = Arc::new(RestClient::new(vec!["http://127.0.0.1:1".to_string()]).unwrap());
        let pipeline = BlockPipeline::new(
            Network::Mainnet,
            BlockPipelineConfig::for_testing(),
            rest,
            Arc::new(EpochTracker::new()),
            vec![seen.clone()],
        );

        let block = |height: u64| -> watchtower_gateway::chaindata::Block {
            serde_json::from_value(serde_json::json!({
                "header": {"height": height.to_string(), "time": "2024-01-01T00:00:00Z"},
                "last_commit": {"round": 0, "signatures": []}
            }))
            .unwrap()
        };

        // Every height delivered twice, interleaved.
        for height in 100..110u64 {
            pipeline.ingest(block(height)).await;
            pipeline.ingest(block(height)).await;
        }
        let processed = seen.0.lock().clone();
        assert_eq!(processed, (100..=106).collect::<Vec<u64>>());
    }

    // =========================================================================
    // FINALITY PROVIDER RULES THROUGH THE CHAIN
    // =========================================================================

    /// Three misses inside the recent window raise one critical; voting
    /// again through the window produces exactly one recovery.
    #[tokio::test]
    async fn test_provider_miss_burst_and_recovery() {
        let chain = chain().await;
        chain.with_provider("pk01", "fp-one").await;

        // A healthy run.
        for height in 100..110u64 {
            chain.feed_fp_block(height, &["pk01"]).await;
        }
        assert!(chain.sink.is_empty());

        // Misses at 110, 112, 114: three inside the last five heights.
        for height in 110..115u64 {
            let voters: &[&str] = if height % 2 == 1 { &["pk01"] } else { &[] };
            chain.feed_fp_block(height, voters).await;
        }
        let titles = chain.alert_titles();
        assert_eq!(
            titles
                .iter()
                .filter(|t| *t == "Finality provider missing recent blocks")
                .count(),
            1
        );

        // Five voted heights push every miss out of the window.
        for height in 115..120u64 {
            chain.feed_fp_block(height, &["pk01"]).await;
        }
        let titles = chain.alert_titles();
        assert_eq!(
            titles
                .iter()
                .filter(|t| *t == "Finality provider votes recovered")
                .count(),
            1
        );

        let stats = FinalityProviderStatsRepository::get(
            chain.store.as_ref(),
            Network::Mainnet,
            "pk01",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stats.total_blocks, 20);
        assert_eq!(stats.missed_blocks, 3);
        assert_eq!(stats.total_blocks, stats.signed_blocks + stats.missed_blocks);
        assert_eq!(stats.missed_block_heights, vec![110, 112, 114]);
    }

    /// A height whose vote set could not be fetched is skipped whole and
    /// never counted as a universal miss.
    #[tokio::test]
    async fn test_unavailable_vote_set_skips_height() {
        use std::collections::HashSet;
        use watchtower_types::BlockObservation;

        let chain = chain().await;
        chain.with_provider("pk02", "fp-two").await;

        chain.feed_fp_block(200, &["pk02"]).await;
        let unavailable = BlockObservation {
            height: 201,
            timestamp: 201_000,
            round: 0,
            signers: HashSet::new(),
            fp_signers: None,
        };
        chain.provider_agg.process(&unavailable).await;
        chain.feed_fp_block(202, &["pk02"]).await;

        let stats = FinalityProviderStatsRepository::get(
            chain.store.as_ref(),
            Network::Mainnet,
            "pk02",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stats.total_blocks, 2);
        assert_eq!(stats.missed_blocks, 0);
        assert_eq!(stats.signature_rate, 100.0);
    }

    // =========================================================================
    // COOLDOWN LAW
    // =========================================================================

    /// After a LOW alert, a further LOW needs both a deeper drop and the
    /// cooldown; after the cooldown plus a deep drop it fires again.
    #[tokio::test]
    async fn test_low_alert_cooldown_law() {
        let chain = chain().await;
        chain.with_validator("DD44", "delta").await;

        // 100 signed, then misses drive the rate down past the threshold.
        for height in 0..100u64 {
            chain.feed_block(3000 + height, &["DD44"]).await;
        }
        for height in 100..140u64 {
            chain.feed_block(3000 + height, &[]).await;
        }
        let low_count = |chain: &crate::integration::fixtures::Chain| {
            chain
                .alert_titles()
                .iter()
                .filter(|t| *t == "Validator signature rate low")
                .count()
        };
        assert_eq!(low_count(&chain), 1);

        // Keep missing: far deeper than the drop step, but inside the
        // cooldown, so no repeat fires.
        for height in 140..220u64 {
            chain.feed_block(3000 + height, &[]).await;
        }
        assert_eq!(low_count(&chain), 1);

        // Past the cooldown the deeper drop is allowed to re-alert.
        chain.clock.advance(21_600_001);
        chain.feed_block(3220, &[]).await;
        assert_eq!(low_count(&chain), 2);
    }
}

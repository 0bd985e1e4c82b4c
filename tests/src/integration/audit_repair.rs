//! Auditor scenarios across real components: injected data loss healed by
//! targeted backfill, and a stream outage degrading then recovering once
//! the batch pass catches the store up.

#[cfg(test)]
mod tests {
    use batch_producer::test_utils::MockWarehouse;
    use batch_producer::{BatchConfig, BatchProducer, Warehouse};
    use block_sink::test_utils::{sample_block, sample_range, sample_timestamp};
    use block_sink::{BlockSink, BlockStore, InMemoryBlockStore};
    use chrono::Duration;
    use gap_auditor::{AuditConfig, GapAuditor};
    use shared_bus::{AuditStatus, HealthBus, HealthEvent};
    use std::sync::Arc;
    use tokio::sync::watch;

    struct World {
        store: Arc<InMemoryBlockStore>,
        sink: Arc<BlockSink>,
        warehouse: Arc<MockWarehouse>,
        batch: Arc<BatchProducer>,
        auditor: GapAuditor,
        bus: Arc<HealthBus>,
        _shutdown_tx: watch::Sender<bool>,
    }

    fn world(warehouse_tip: u64) -> World {
        let store = Arc::new(InMemoryBlockStore::new());
        let sink = Arc::new(BlockSink::new(
            Arc::clone(&store) as Arc<dyn BlockStore>
        ));
        let warehouse = Arc::new(MockWarehouse::with_tip(warehouse_tip));
        let bus = Arc::new(HealthBus::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let batch = Arc::new(BatchProducer::new(
            BatchConfig {
                window_blocks: 600,
                ..BatchConfig::for_testing()
            },
            Arc::clone(&warehouse) as Arc<dyn Warehouse>,
            Arc::clone(&sink),
            Arc::clone(&bus),
            shutdown_rx,
        ));
        let auditor = GapAuditor::new(
            AuditConfig {
                scan_depth_blocks: 50_000,
                ..AuditConfig::default()
            },
            Arc::clone(&sink),
            Arc::clone(&batch),
            Arc::clone(&bus),
        );
        World {
            store,
            sink,
            warehouse,
            batch,
            auditor,
            bus,
            _shutdown_tx: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn test_injected_gap_is_found_repaired_and_confirmed() {
        let w = world(40_000);
        w.sink
            .upsert_blocks(sample_range(30_000, 40_001))
            .await
            .unwrap();
        // Inject data loss several days below the tip.
        w.store.remove(32_000);
        assert!(w.store.get(32_000).is_none());

        let now = sample_timestamp(40_000) + Duration::seconds(24);
        let report = w.auditor.run_pass(now).await.unwrap();

        assert_eq!(report.status, AuditStatus::Critical);
        assert_eq!(report.persistent_gaps, 1);
        assert_eq!(w.store.get(32_000).unwrap(), sample_block(32_000));

        // Follow-up pass: the store is whole and fresh again.
        let report = w
            .auditor
            .run_pass(now + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(report.status, AuditStatus::Healthy);
        assert_eq!(report.resolved_gaps, 1);
        assert!(w.sink.scan_gaps(30_000, 40_001).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_outage_degrades_then_batch_catches_up() {
        let w = world(40_100);
        // The stream died at 40_000; twenty minutes later the chain has
        // minted a hundred more blocks.
        w.sink
            .upsert_blocks(sample_range(39_000, 40_001))
            .await
            .unwrap();
        let mut events = w.bus.subscribe();

        // Twenty minutes after the stored tip: stale.
        let outage_now = sample_timestamp(40_000) + Duration::seconds(1_200);
        let report = w.auditor.run_pass(outage_now).await.unwrap();
        assert_eq!(report.status, AuditStatus::Degraded);
        assert!(report.tip_age_secs > 960);

        // The hourly batch pass lands the missing window.
        w.batch.scheduled_pass().await.unwrap();
        assert_eq!(w.sink.tip().await.unwrap().unwrap().0, 40_100);

        // Shortly after the new tip: healthy again, recovery noted.
        let healed_now = sample_timestamp(40_100) + Duration::seconds(24);
        let report = w.auditor.run_pass(healed_now).await.unwrap();
        assert_eq!(report.status, AuditStatus::Healthy);

        let mut saw_degraded = false;
        let mut saw_recovered = false;
        while let Some(event) = events.try_recv() {
            match event {
                HealthEvent::Degraded { .. } => saw_degraded = true,
                HealthEvent::Recovered => saw_recovered = true,
                _ => {}
            }
        }
        assert!(saw_degraded);
        assert!(saw_recovered);
    }

    #[tokio::test]
    async fn test_gap_beyond_warehouse_reach_raises_critical_alert() {
        let w = world(10_000);
        // Store data reaches past what the warehouse can serve; the gap
        // sits in the unreachable region.
        w.sink
            .upsert_blocks(sample_range(20_000, 30_001))
            .await
            .unwrap();
        w.store.remove(25_000);
        let mut events = w.bus.subscribe();

        let now = sample_timestamp(30_000) + Duration::seconds(24);
        let report = w.auditor.run_pass(now).await.unwrap();
        assert_eq!(report.status, AuditStatus::Critical);

        let mut saw_critical = false;
        while let Some(event) = events.try_recv() {
            if let HealthEvent::CriticalGap {
                first_missing,
                last_missing,
                ..
            } = event
            {
                assert_eq!((first_missing, last_missing), (25_000, 25_000));
                saw_critical = true;
            }
        }
        assert!(saw_critical);
        // The warehouse was asked, in vain.
        assert!(!w.warehouse.fetch_calls().is_empty());
    }
}

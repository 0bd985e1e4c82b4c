//! Live subscription scenarios against the fake upstream node: cold
//! start, reconnect catch-up, reorg re-announcement, and graceful
//! shutdown.

#[cfg(test)]
mod tests {
    use crate::support::fake_node::FakeNode;
    use crate::support::wait_until;
    use block_sink::test_utils::sample_block;
    use block_sink::{BlockSink, BlockStore, InMemoryBlockStore};
    use shared_bus::HealthBus;
    use std::sync::Arc;
    use std::time::Duration;
    use stream_producer::{StreamConfig, StreamProducer};
    use tokio::sync::watch;

    const BASE: u64 = 20_000_000;

    struct World {
        node: FakeNode,
        store: Arc<InMemoryBlockStore>,
        sink: Arc<BlockSink>,
        producer_task: tokio::task::JoinHandle<()>,
        shutdown_tx: watch::Sender<bool>,
    }

    async fn world(chain_tip: u64) -> World {
        let node = FakeNode::start(chain_tip).await;
        let store = Arc::new(InMemoryBlockStore::new());
        let sink = Arc::new(BlockSink::new(
            Arc::clone(&store) as Arc<dyn BlockStore>
        ));
        let bus = Arc::new(HealthBus::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let producer = StreamProducer::new(
            StreamConfig::for_testing(node.url()),
            Arc::clone(&sink),
            bus,
            shutdown_rx,
        );
        let producer_task = tokio::spawn(producer.run());
        World {
            node,
            store,
            sink,
            producer_task,
            shutdown_tx,
        }
    }

    async fn stored(store: &Arc<InMemoryBlockStore>, number: u64) -> bool {
        store.get(number).is_some()
    }

    #[tokio::test]
    async fn test_cold_start_streams_from_chain_tip() {
        let w = world(BASE).await;

        // Empty store: the producer starts at the chain tip rather than
        // replaying history.
        assert!(
            wait_until(Duration::from_secs(5), || stored(&w.store, BASE)).await,
            "tip block never arrived"
        );

        // Three announced heads flow straight through.
        for number in BASE + 1..=BASE + 3 {
            w.node.announce(number);
        }
        assert!(
            wait_until(Duration::from_secs(5), || stored(&w.store, BASE + 3)).await,
            "announced heads never arrived"
        );
        assert!(w.sink.scan_gaps(BASE, BASE + 4).await.unwrap().is_empty());

        let _ = w.shutdown_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), w.producer_task).await;
    }

    #[tokio::test]
    async fn test_missed_notifications_are_gap_filled() {
        let w = world(BASE).await;
        assert!(wait_until(Duration::from_secs(5), || stored(&w.store, BASE)).await);

        // The node skips straight from BASE to BASE+5; the producer must
        // synthesize fetches for the numbers in between.
        w.node.set_tip_silently(BASE + 4);
        w.node.announce(BASE + 5);

        assert!(
            wait_until(Duration::from_secs(5), || async {
                w.sink
                    .scan_gaps(BASE, BASE + 6)
                    .await
                    .map(|gaps| gaps.is_empty() && w.store.len() == 6)
                    .unwrap_or(false)
            })
            .await,
            "gap-fill never completed"
        );

        let _ = w.shutdown_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), w.producer_task).await;
    }

    #[tokio::test]
    async fn test_reconnect_catches_up_missed_range() {
        let w = world(BASE).await;
        assert!(wait_until(Duration::from_secs(5), || stored(&w.store, BASE)).await);

        // Sever the connection; the chain keeps moving while we're away.
        w.node.kick_connections();
        w.node.set_tip_silently(BASE + 7);

        // After reconnecting, the producer queries the stored tip and the
        // chain tip and fetches the span between them.
        assert!(
            wait_until(Duration::from_secs(15), || async {
                w.sink
                    .scan_gaps(BASE, BASE + 8)
                    .await
                    .map(|gaps| gaps.is_empty() && w.store.get(BASE + 7).is_some())
                    .unwrap_or(false)
            })
            .await,
            "reconnect catch-up never completed"
        );

        let _ = w.shutdown_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), w.producer_task).await;
    }

    #[tokio::test]
    async fn test_reorg_reannouncement_is_ingested_not_duplicated() {
        let w = world(BASE).await;
        assert!(wait_until(Duration::from_secs(5), || stored(&w.store, BASE)).await);

        w.node.announce(BASE + 1);
        assert!(wait_until(Duration::from_secs(5), || stored(&w.store, BASE + 1)).await);

        // A shallow reorg re-announces the same height.
        w.node.reannounce(BASE + 1);
        w.node.announce(BASE + 2);
        assert!(wait_until(Duration::from_secs(5), || stored(&w.store, BASE + 2)).await);

        // Still exactly one merged row per number.
        assert_eq!(w.store.len(), 3);
        assert_eq!(w.store.get(BASE + 1).unwrap(), sample_block(BASE + 1));

        let _ = w.shutdown_tx.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), w.producer_task).await;
    }

    #[tokio::test]
    async fn test_graceful_shutdown_exits_clean_and_gapless() {
        let w = world(BASE).await;
        assert!(wait_until(Duration::from_secs(5), || stored(&w.store, BASE)).await);

        for number in BASE + 1..=BASE + 10 {
            w.node.announce(number);
        }
        assert!(
            wait_until(Duration::from_secs(5), || stored(&w.store, BASE + 10)).await,
            "stream never caught the announced heads"
        );

        let _ = w.shutdown_tx.send(true);
        let exited = tokio::time::timeout(Duration::from_secs(10), w.producer_task).await;
        assert!(exited.is_ok(), "producer did not drain within the budget");

        assert!(w.sink.scan_gaps(BASE, BASE + 11).await.unwrap().is_empty());
        assert_eq!(w.store.len(), 11);
    }
}

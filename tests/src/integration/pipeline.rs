//! Write-path scenarios: concurrent duplicate submission, reorg
//! overwrites, and the contiguity property under shuffled batches.

#[cfg(test)]
mod tests {
    use block_sink::test_utils::{sample_block, sample_range};
    use block_sink::{BlockSink, BlockStore, InMemoryBlockStore};
    use rand::seq::SliceRandom;
    use std::sync::Arc;

    fn sink_fixture() -> (Arc<InMemoryBlockStore>, Arc<BlockSink>) {
        let store = Arc::new(InMemoryBlockStore::new());
        let sink = Arc::new(BlockSink::new(
            Arc::clone(&store) as Arc<dyn BlockStore>
        ));
        (store, sink)
    }

    #[tokio::test]
    async fn test_duplicate_submission_from_two_tasks_converges() {
        let (store, sink) = sink_fixture();

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move { sink.upsert_blocks(sample_range(100, 201)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Exactly one merged row per number, fields equal to the canonical
        // sample: both submissions carried identical content.
        assert_eq!(store.len(), 101);
        for number in 100..=200 {
            assert_eq!(store.get(number).unwrap(), sample_block(number));
        }
        assert!(sink.scan_gaps(100, 201).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reorg_resubmission_wins_merged_read() {
        let (store, sink) = sink_fixture();

        let mut original = sample_block(1_000_000);
        original.gas_used = 5_000_000;
        sink.upsert_blocks(vec![original]).await.unwrap();

        let mut corrected = sample_block(1_000_000);
        corrected.gas_used = 7_000_000;
        sink.upsert_blocks(vec![corrected]).await.unwrap();

        assert_eq!(store.get(1_000_000).unwrap().gas_used, 7_000_000);
        assert!(sink
            .scan_gaps(1_000_000, 1_000_001)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_contiguity_property_under_shuffled_interleaved_batches() {
        let (_, sink) = sink_fixture();
        let mut rows = sample_range(5_000, 6_000);
        rows.shuffle(&mut rand::thread_rng());

        // Interleave two writers over arbitrary slices of the same range.
        let halves: Vec<Vec<_>> = rows.chunks(100).map(|chunk| chunk.to_vec()).collect();
        let mut tasks = Vec::new();
        for batch in halves {
            let sink = Arc::clone(&sink);
            tasks.push(tokio::spawn(
                async move { sink.upsert_blocks(batch).await },
            ));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // The union of submitted numbers is the full interval, so the gap
        // scan must come back empty; any sub-interval scan likewise.
        assert!(sink.scan_gaps(5_000, 6_000).await.unwrap().is_empty());
        assert!(sink.scan_gaps(5_500, 5_600).await.unwrap().is_empty());

        // Remove the union property and the scan must flag exactly it.
        let (store, sink) = sink_fixture();
        let mut rows = sample_range(0, 100);
        rows.retain(|row| row.number != 42);
        sink.upsert_blocks(rows).await.unwrap();
        let gaps = sink.scan_gaps(0, 100).await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!((gaps[0].first_missing, gaps[0].last_missing), (42, 42));
        assert!(store.get(42).is_none());
    }

    #[tokio::test]
    async fn test_watermarks_track_min_and_max_across_producers() {
        let (_, sink) = sink_fixture();

        sink.upsert_blocks(sample_range(500, 510)).await.unwrap();
        sink.upsert_blocks(sample_range(480, 500)).await.unwrap();

        let marks = sink.watermarks().await.unwrap();
        assert_eq!(marks.min_number, Some(480));
        assert_eq!(marks.max_number, Some(509));
        assert_eq!(marks.block_count, 30);
    }
}

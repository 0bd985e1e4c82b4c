//! # Producer Tasks
//!
//! The reader task owns the connection lifecycle: connect with backoff,
//! subscribe, catch up from the stored tip, then stream heads with
//! gap-fill. The writer task drains the bounded queue into the sink in
//! micro-batches. Shutdown drains: the reader stops feeding, the writer
//! flushes what is queued, and the producer exits.

use crate::config::StreamConfig;
use crate::state::ProducerState;
use crate::ws::WsSession;
use block_sink::BlockSink;
use shared_bus::{HealthBus, HealthEvent};
use shared_types::{retry_with_backoff, BlockRecord, IngestError, RetryPolicy, ShutdownSignal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

/// Pause applied when the store answers with a quota rejection.
const QUOTA_PAUSE: Duration = Duration::from_secs(300);

/// Outcome of feeding one block (or one head) into the queue.
enum FeedOutcome {
    /// Keep streaming.
    Continue,
    /// Connection-level trouble; drop it and reconnect.
    Reconnect,
    /// Shutdown observed; stop feeding.
    Stop,
}

/// Live subscription producer; one per process.
pub struct StreamProducer {
    config: StreamConfig,
    sink: Arc<BlockSink>,
    bus: Arc<HealthBus>,
    shutdown: ShutdownSignal,
}

/// Publishes state transitions once, to the log and the health bus.
struct StateTracker {
    current: ProducerState,
    bus: Arc<HealthBus>,
}

impl StateTracker {
    fn new(bus: Arc<HealthBus>) -> Self {
        Self {
            current: ProducerState::Disconnected,
            bus,
        }
    }

    fn transition(&mut self, next: ProducerState) {
        if self.current == next {
            return;
        }
        if !self.current.can_transition_to(next) {
            warn!(
                "[stream] unexpected transition {} -> {}",
                self.current, next
            );
        }
        info!("[stream] {} -> {}", self.current, next);
        self.current = next;
        self.bus.publish(HealthEvent::StreamStateChanged {
            state: next.as_str().to_string(),
        });
    }

    fn current(&self) -> ProducerState {
        self.current
    }
}

/// Resolves once the signal flips to shutdown (or the sender is gone).
async fn shutdown_triggered(signal: &mut ShutdownSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

impl StreamProducer {
    /// Build a producer around the shared sink and bus.
    pub fn new(
        config: StreamConfig,
        sink: Arc<BlockSink>,
        bus: Arc<HealthBus>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            sink,
            bus,
            shutdown,
        }
    }

    /// Run until shutdown. Reconnects forever on connection loss; exits
    /// only once the shutdown signal fires and the queue is drained.
    pub async fn run(self) {
        let (tx, rx) = mpsc::channel::<BlockRecord>(self.config.queue_capacity);
        let writer = tokio::spawn(writer_loop(
            rx,
            Arc::clone(&self.sink),
            Arc::clone(&self.bus),
            self.config.clone(),
        ));
        let writer_abort = writer.abort_handle();

        self.reader_loop(tx).await;

        let drain_budget = Duration::from_secs(self.config.drain_timeout_secs);
        match timeout(drain_budget, writer).await {
            Ok(_) => info!("[stream] writer drained cleanly"),
            Err(_) => {
                warn!(
                    "[stream] drain exceeded {:?}, aborting writer",
                    drain_budget
                );
                writer_abort.abort();
            }
        }
    }

    async fn reader_loop(&self, tx: mpsc::Sender<BlockRecord>) {
        let mut shutdown = self.shutdown.clone();
        let mut state = StateTracker::new(Arc::clone(&self.bus));
        let reconnect = RetryPolicy::stream_reconnect();
        let mut reconnect_attempt = 0u32;
        let request_budget = Duration::from_secs(self.config.fetch_timeout_secs);

        'outer: while !*shutdown.borrow() {
            state.transition(ProducerState::Connecting);
            let mut session = match WsSession::connect(
                &self.config.ws_url,
                Duration::from_secs(self.config.ping_interval_secs),
                Duration::from_secs(self.config.pong_timeout_secs),
            )
            .await
            {
                Ok(session) => session,
                Err(e) => {
                    state.transition(ProducerState::Disconnected);
                    reconnect_attempt += 1;
                    let delay = reconnect.delay_for(reconnect_attempt);
                    warn!("[stream] connect failed: {}; retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = shutdown_triggered(&mut shutdown) => break,
                    }
                }
            };
            reconnect_attempt = 0;

            match timeout(request_budget, session.subscribe_new_heads()).await {
                Ok(Ok(_)) => state.transition(ProducerState::Subscribed),
                Ok(Err(e)) => {
                    warn!("[stream] subscribe failed: {}", e);
                    state.transition(ProducerState::Disconnected);
                    continue;
                }
                Err(_) => {
                    warn!("[stream] subscribe timed out");
                    state.transition(ProducerState::Disconnected);
                    continue;
                }
            }

            let mut last_seen = match self
                .catch_up(&mut session, &tx, &mut shutdown)
                .await
            {
                Ok(chain_tip) => chain_tip,
                Err(FeedOutcome::Stop) | Err(FeedOutcome::Continue) => {
                    state.transition(ProducerState::Draining);
                    session.close().await;
                    break 'outer;
                }
                Err(FeedOutcome::Reconnect) => {
                    state.transition(ProducerState::Disconnected);
                    continue;
                }
            };

            state.transition(ProducerState::Streaming);
            loop {
                tokio::select! {
                    _ = shutdown_triggered(&mut shutdown) => {
                        state.transition(ProducerState::Draining);
                        session.close().await;
                        break 'outer;
                    }
                    head = session.next_head() => {
                        let head = match head {
                            Ok(head) => head,
                            Err(e) => {
                                warn!("[stream] connection lost: {}", e);
                                state.transition(ProducerState::Disconnected);
                                break;
                            }
                        };
                        let number = match head.block_number() {
                            Ok(number) => number,
                            Err(e) => {
                                warn!("[stream] head dropped: {}", e);
                                continue;
                            }
                        };
                        match self
                            .feed_heads(&mut session, &tx, &mut shutdown, &mut last_seen, number)
                            .await
                        {
                            FeedOutcome::Continue => {}
                            FeedOutcome::Reconnect => {
                                state.transition(ProducerState::Disconnected);
                                break;
                            }
                            FeedOutcome::Stop => {
                                state.transition(ProducerState::Draining);
                                session.close().await;
                                break 'outer;
                            }
                        }
                    }
                }
            }
        }

        if state.current() != ProducerState::Draining {
            state.transition(ProducerState::Draining);
        }
    }

    /// After (re)connect: fetch everything between the stored tip and the
    /// current chain tip so missed notifications leave no hole.
    async fn catch_up(
        &self,
        session: &mut WsSession,
        tx: &mpsc::Sender<BlockRecord>,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Option<u64>, FeedOutcome> {
        let request_budget = Duration::from_secs(self.config.fetch_timeout_secs);
        let chain_tip = match timeout(request_budget, session.latest_block_number()).await {
            Ok(Ok(tip)) => tip,
            Ok(Err(e)) => {
                warn!("[stream] chain tip query failed: {}", e);
                return Err(FeedOutcome::Reconnect);
            }
            Err(_) => {
                warn!("[stream] chain tip query timed out");
                return Err(FeedOutcome::Reconnect);
            }
        };

        let start = match self.sink.tip().await {
            Ok(Some((stored_tip, _))) => stored_tip + 1,
            // Empty store: stream forward from the tip, history belongs to
            // the batch producer.
            Ok(None) => chain_tip,
            Err(e) => {
                warn!("[stream] stored tip unavailable ({}); streaming from chain tip", e);
                chain_tip
            }
        };

        if start <= chain_tip {
            info!("[stream] catch-up {}..={}", start, chain_tip);
            for number in start..=chain_tip {
                match self.fetch_and_enqueue(session, tx, shutdown, number).await {
                    FeedOutcome::Continue => {}
                    other => return Err(other),
                }
            }
        }
        Ok(Some(chain_tip))
    }

    /// Feed `number` plus any skipped numbers since the last head.
    async fn feed_heads(
        &self,
        session: &mut WsSession,
        tx: &mpsc::Sender<BlockRecord>,
        shutdown: &mut ShutdownSignal,
        last_seen: &mut Option<u64>,
        number: u64,
    ) -> FeedOutcome {
        // A reorged head can repeat or go backwards; fetch it alone and
        // let the sink's replacing merge settle the winner.
        let first = match *last_seen {
            Some(previous) if number > previous + 1 => previous + 1,
            _ => number,
        };
        for n in first..=number {
            match self.fetch_and_enqueue(session, tx, shutdown, n).await {
                FeedOutcome::Continue => {}
                other => return other,
            }
        }
        *last_seen = Some(last_seen.map_or(number, |previous| previous.max(number)));
        FeedOutcome::Continue
    }

    /// Fetch one block (bounded attempts) and push it into the queue.
    async fn fetch_and_enqueue(
        &self,
        session: &mut WsSession,
        tx: &mpsc::Sender<BlockRecord>,
        shutdown: &mut ShutdownSignal,
        number: u64,
    ) -> FeedOutcome {
        let policy = RetryPolicy::upstream_fetch();
        let budget = Duration::from_secs(self.config.fetch_timeout_secs);
        let mut attempt = 0u32;

        let record = loop {
            if *shutdown.borrow() {
                return FeedOutcome::Stop;
            }
            attempt += 1;
            match timeout(budget, session.fetch_block(number)).await {
                Ok(Ok(record)) => break record,
                Ok(Err(e)) if !e.is_retryable() => {
                    error!("[stream] block {} failed validation: {}", number, e);
                    self.bus.publish(HealthEvent::ProducerFault {
                        component: "stream-producer".to_string(),
                        detail: format!("block {number}: {e}"),
                    });
                    // Leave the hole to the auditor; the warehouse has the
                    // canonical row.
                    return FeedOutcome::Continue;
                }
                Ok(Err(e)) => {
                    if attempt >= policy.max_attempts.unwrap_or(u32::MAX) {
                        warn!("[stream] block {} fetch failed: {}", number, e);
                        return FeedOutcome::Reconnect;
                    }
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
                Err(_) => {
                    if attempt >= policy.max_attempts.unwrap_or(u32::MAX) {
                        warn!("[stream] block {} fetch timed out", number);
                        return FeedOutcome::Reconnect;
                    }
                }
            }
        };

        let stall = Duration::from_secs(self.config.enqueue_stall_secs);
        tokio::select! {
            sent = tx.send(record) => match sent {
                Ok(()) => FeedOutcome::Continue,
                // Writer is gone; nothing more to feed.
                Err(_) => FeedOutcome::Stop,
            },
            _ = tokio::time::sleep(stall) => {
                warn!(
                    "[stream] queue full for {:?}; dropping connection to shed load",
                    stall
                );
                FeedOutcome::Reconnect
            }
            _ = shutdown_triggered(shutdown) => FeedOutcome::Stop,
        }
    }
}

/// Drain the queue into the sink in micro-batches. Runs until the channel
/// closes, then flushes the tail and exits; that is the drain path.
async fn writer_loop(
    rx: mpsc::Receiver<BlockRecord>,
    sink: Arc<BlockSink>,
    bus: Arc<HealthBus>,
    config: StreamConfig,
) {
    // The writer never cancels a write mid-flight; the drain budget in
    // `run` bounds how long it may keep going after shutdown.
    let (_drain_tx, drain_rx) = watch::channel(false);

    let stream = ReceiverStream::new(rx).chunks_timeout(
        config.micro_batch_max,
        Duration::from_millis(config.micro_batch_window_ms),
    );
    tokio::pin!(stream);

    while let Some(batch) = stream.next().await {
        let newest = batch
            .iter()
            .max_by_key(|record| record.number)
            .map(|record| (record.number, record.timestamp));

        if write_batch(&sink, &bus, &drain_rx, batch).await {
            if let Some((number, timestamp)) = newest {
                bus.publish(HealthEvent::StreamTick { number, timestamp });
            }
        }
    }
    info!("[stream] writer queue closed");
}

/// Write one micro-batch, pausing on quota. Returns whether it committed.
async fn write_batch(
    sink: &BlockSink,
    bus: &HealthBus,
    drain_rx: &watch::Receiver<bool>,
    batch: Vec<BlockRecord>,
) -> bool {
    loop {
        let template = batch.clone();
        let result = retry_with_backoff(
            RetryPolicy::sink_transport(),
            drain_rx.clone(),
            "stream sink upsert",
            move || {
                let rows = template.clone();
                async move { sink.upsert_blocks(rows).await.map(|_| ()) }
            },
        )
        .await;

        match result {
            Ok(()) => return true,
            Err(IngestError::Quota(reason)) => {
                warn!("[stream] store quota hit ({}); pausing {:?}", reason, QUOTA_PAUSE);
                tokio::time::sleep(QUOTA_PAUSE).await;
            }
            Err(e) => {
                error!("[stream] micro-batch of {} dropped: {}", batch.len(), e);
                bus.publish(HealthEvent::ProducerFault {
                    component: "stream-producer".to_string(),
                    detail: format!("micro-batch write failed: {e}"),
                });
                return false;
            }
        }
    }
}

//! # Supervisor
//!
//! Spawns the long-lived tasks, watches for termination signals, and
//! shepherds the drain: broadcast shutdown, give everything the grace
//! budget, abort whatever is left. A task that panics is reported as a
//! fault and restarted; panics never take the process down silently.

use crate::config::AppConfig;
use crate::container::{self, Subsystems};
use crate::health::{route_events, HealthReporter, LivenessCounters};
use crate::scheduler::run_on_schedule;
use anyhow::Result;
use chrono::Utc;
use shared_bus::{HealthBus, HealthEvent};
use shared_types::ShutdownSignal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Delay before restarting a panicked task.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Run the daemon until a termination signal, then drain. Returns cleanly
/// so the process exits 0 after a graceful shutdown.
pub async fn run(config: AppConfig) -> Result<()> {
    let subsystems = container::build(&config).await?;
    let handles = spawn_all(&config, &subsystems);

    wait_for_signal().await;
    info!("[ingestd] termination signal received; draining");
    let _ = subsystems.shutdown_tx.send(true);

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    drain(handles, grace).await;
    info!("[ingestd] shutdown complete");
    Ok(())
}

fn spawn_all(
    config: &AppConfig,
    subsystems: &Subsystems,
) -> Vec<(&'static str, JoinHandle<()>)> {
    let mut handles = Vec::new();

    // Health router first so nothing published at startup is lost.
    let counters = Arc::new(LivenessCounters::default());
    let reporter = HealthReporter::new(
        config.heartbeat_url.clone(),
        config.alert_url.clone(),
        config.alert_token.clone(),
        counters,
    );
    let subscription = subsystems.bus.subscribe();
    handles.push((
        "health-router",
        tokio::spawn(route_events(subscription, reporter)),
    ));

    // Stream producer, restarted on panic.
    {
        let subsystems_sink = Arc::clone(&subsystems.sink);
        let subsystems_bus = Arc::clone(&subsystems.bus);
        let shutdown = subsystems.shutdown_rx.clone();
        let stream_config = config.stream.clone();
        handles.push((
            "stream-producer",
            spawn_supervised(
                "stream-producer",
                Arc::clone(&subsystems.bus),
                subsystems.shutdown_rx.clone(),
                move || {
                    let producer = stream_producer::StreamProducer::new(
                        stream_config.clone(),
                        Arc::clone(&subsystems_sink),
                        Arc::clone(&subsystems_bus),
                        shutdown.clone(),
                    );
                    producer.run()
                },
            ),
        ));
    }

    // Hourly batch pass.
    {
        let batch = Arc::clone(&subsystems.batch);
        let schedule = config.batch_schedule.clone();
        let shutdown = subsystems.shutdown_rx.clone();
        handles.push((
            "batch-schedule",
            tokio::spawn(async move {
                run_on_schedule("batch", schedule, shutdown, move || {
                    let batch = Arc::clone(&batch);
                    async move {
                        if let Err(e) = batch.scheduled_pass().await {
                            warn!("[ingestd] scheduled batch pass failed: {}", e);
                        }
                    }
                })
                .await;
            }),
        ));
    }

    // Three-hourly audit pass.
    {
        let auditor = Arc::clone(&subsystems.auditor);
        let schedule = config.audit_schedule.clone();
        let shutdown = subsystems.shutdown_rx.clone();
        handles.push((
            "audit-schedule",
            tokio::spawn(async move {
                run_on_schedule("audit", schedule, shutdown, move || {
                    let auditor = Arc::clone(&auditor);
                    async move {
                        if let Err(e) = auditor.run_pass(Utc::now()).await {
                            warn!("[ingestd] audit pass failed: {}", e);
                        }
                    }
                })
                .await;
            }),
        ));
    }

    handles
}

/// Spawn a task that is rebuilt and restarted if it panics, until
/// shutdown. Panics surface as fault events, not as silent task death.
fn spawn_supervised<F, Fut>(
    name: &'static str,
    bus: Arc<HealthBus>,
    shutdown: ShutdownSignal,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let attempt = tokio::spawn(factory());
            match attempt.await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    error!("[ingestd] task {} panicked; restarting", name);
                    bus.publish(HealthEvent::ProducerFault {
                        component: name.to_string(),
                        detail: "task panicked and was restarted".to_string(),
                    });
                    if *shutdown.borrow() {
                        return;
                    }
                    tokio::time::sleep(RESTART_DELAY).await;
                }
                Err(_) => return,
            }
        }
    })
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Join every task within the grace budget; abort stragglers.
async fn drain(handles: Vec<(&'static str, JoinHandle<()>)>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    for (name, handle) in handles {
        let abort = handle.abort_handle();
        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(())) => info!("[ingestd] {} stopped", name),
            Ok(Err(e)) if e.is_cancelled() => info!("[ingestd] {} cancelled", name),
            Ok(Err(e)) => warn!("[ingestd] {} ended abnormally: {}", name, e),
            Err(_) => {
                warn!("[ingestd] {} missed the drain deadline; aborting", name);
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_supervised_task_restarts_after_panic() {
        let bus = Arc::new(HealthBus::new());
        let mut events = bus.subscribe();
        let (tx, rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(0u32);

        let handle = spawn_supervised("test-task", Arc::clone(&bus), rx, move || {
            let done_tx = done_tx.clone();
            async move {
                let attempt = *done_tx.borrow() + 1;
                let _ = done_tx.send(attempt);
                if attempt == 1 {
                    panic!("first attempt dies");
                }
                // Second attempt exits cleanly.
            }
        });

        handle.await.unwrap();
        assert_eq!(*done_rx.borrow(), 2);
        assert!(matches!(
            events.try_recv(),
            Some(HealthEvent::ProducerFault { .. })
        ));
        drop(tx);
    }

    #[tokio::test]
    async fn test_drain_aborts_stuck_tasks() {
        let stuck = tokio::spawn(async {
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
        drain(vec![("stuck", stuck)], Duration::from_millis(50)).await;
        // Returning at all is the assertion; the stuck task was aborted.
    }
}

//! # Cron Scheduling
//!
//! The batch and audit ticks originate here. Each loop sleeps until the
//! schedule's next fire time and runs its task to completion; a tick that
//! overruns simply delays the next one (the schedules are hours apart, the
//! passes take seconds to minutes).

use chrono::Utc;
use cron::Schedule;
use shared_types::ShutdownSignal;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

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

/// Run `task` at every fire time of `schedule` until shutdown.
pub async fn run_on_schedule<F, Fut>(
    name: &'static str,
    schedule: Schedule,
    mut shutdown: ShutdownSignal,
    task: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("[ingestd] schedule for {} has no upcoming fire time", name);
            return;
        };
        let wait = (next - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        info!("[ingestd] next {} tick at {} ({:?} away)", name, next, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                info!("[ingestd] {} tick", name);
                task().await;
            }
            _ = shutdown_triggered(&mut shutdown) => {
                info!("[ingestd] {} schedule stopped", name);
                return;
            }
        }
    }
}

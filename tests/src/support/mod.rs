//! Test support: the fake upstream node and small async helpers.

pub mod fake_node;

use std::future::Future;
use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `deadline` passes.
pub async fn wait_until<F, Fut>(deadline: Duration, condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

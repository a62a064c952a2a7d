//! Periodic background balance refresh
//!
//! Optional: the request path keeps balances honest on its own (probe on
//! rotation, refresh after every cost record). The periodic task keeps the
//! status endpoint close to billing reality for idle accounts too.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::pool::Pool;

/// Spawn a task that probes every account each `interval`, then persists.
///
/// Returns a `JoinHandle`; abort it to stop the task.
pub fn spawn_refresh_task(pool: Arc<Pool>, interval: Duration) -> tokio::task::JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "starting periodic balance refresh");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, balances were just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!("periodic balance refresh cycle");
            pool.refresh_all().await;
        }
    })
}

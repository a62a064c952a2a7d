//! Shared handler state and process counters

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use freeplay_client::ChainStore;
use freeplay_pool::Pool;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::upstream::Upstream;

/// How long in-flight requests get to finish after a shutdown signal
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State accessible from every route
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool>,
    pub upstream: Upstream,
    /// Same store the pool persists through; reports where accounts came from
    pub store: Arc<ChainStore>,
    /// Port the listener bound after env and document overrides
    pub port: u16,
    /// Balance reset-disabled assigns when the request omits one
    pub default_balance: f64,
    pub metrics: ServiceMetrics,
    pub prometheus: PrometheusHandle,
}

/// Runtime counters reported by the health endpoint
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Chat requests currently being served; logged when the drain times out
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Count a request as started; the guard decrements on drop.
    pub fn begin(&self) -> InFlightGuard {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

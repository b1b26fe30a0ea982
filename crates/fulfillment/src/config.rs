//! Fulfillment configuration loaded from environment variables.

use std::time::Duration;

/// Worker pool and sweep configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `FULFILLMENT_WORKERS` - worker task count (default: `4`, must be positive)
/// - `FULFILLMENT_QUEUE_CAPACITY` - bounded queue size (default: `64`)
/// - `FULFILLMENT_SWEEP_INTERVAL_SECS` - sweep period (default: `60`)
/// - `FULFILLMENT_PENDING_THRESHOLD_SECS` - how long an order may sit
///   `Pending` before the sweep resubmits it (default: `300`)
/// - `FULFILLMENT_PROCESSING_DELAY_MS` - simulated external fulfillment
///   step duration (default: `250`)
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub sweep_interval: Duration,
    pub pending_threshold: chrono::Duration,
    pub processing_delay: Duration,
}

impl FulfillmentConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_count: read_env("FULFILLMENT_WORKERS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.worker_count),
            queue_capacity: read_env("FULFILLMENT_QUEUE_CAPACITY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.queue_capacity),
            sweep_interval: read_env("FULFILLMENT_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            pending_threshold: read_env("FULFILLMENT_PENDING_THRESHOLD_SECS")
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.pending_threshold),
            processing_delay: read_env("FULFILLMENT_PROCESSING_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.processing_delay),
        }
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 64,
            sweep_interval: Duration::from_secs(60),
            pending_threshold: chrono::Duration::seconds(300),
            processing_delay: Duration::from_millis(250),
        }
    }
}

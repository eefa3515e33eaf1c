use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Process-wide relay counters.
///
/// Shared as `Arc<RelayMetrics>` between the listener, every connection
/// task and the reporter; never a global. `bytes_relayed` is the transfer
/// counter: monotonic, updated once per relayed chunk, never reset.
#[derive(Debug)]
pub struct RelayMetrics {
    pub bytes_relayed: AtomicU64,
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connection_errors: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            bytes_relayed: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
        }
    }

    /// Adds one chunk's worth of relayed bytes and returns the new total.
    ///
    /// The add and the read are one atomic step, so concurrent relays
    /// each observe a consistent running total for their chunk events.
    pub fn add_transferred(&self, bytes: u64) -> u64 {
        self.bytes_relayed.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    pub fn transferred(&self) -> u64 {
        self.bytes_relayed.load(Ordering::Relaxed)
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        if self.connections_active.load(Ordering::Relaxed) > 0 {
            self.connections_active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn connection_failed(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub bytes_relayed: u64,
    pub connections_total: u64,
    pub connections_active: u64,
    pub connection_errors: u64,
    pub timestamp: u64,
}

/// Logs a transfer summary line every `interval_secs`. 0 disables.
pub fn spawn_reporter(
    metrics: Arc<RelayMetrics>,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = metrics.summary();
            log::info!(
                "Relayed {} bytes total | connections: {} served, {} active, {} failed",
                s.bytes_relayed,
                s.connections_total,
                s.connections_active,
                s.connection_errors
            );
        }
    }))
}

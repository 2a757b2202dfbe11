use std::time::Duration;

/// Cumulative counters of a single driver connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionCounters {
    pub endpoint: String,
    pub txs: u64,
    pub bytes: u64,
    pub errors: u64,
}

/// Minimal run statistics for a load-test run.
///
/// TODO: latency quantiles once broadcast responses are timed per connection.
#[derive(Clone, Debug, PartialEq)]
pub struct RunStatistics {
    pub connections: usize,
    pub total_txs: u64,
    pub total_bytes: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl RunStatistics {
    pub fn from_counters(counters: &[ConnectionCounters], elapsed: Duration) -> Self {
        Self {
            connections: counters.len(),
            total_txs: counters.iter().map(|c| c.txs).sum(),
            total_bytes: counters.iter().map(|c| c.bytes).sum(),
            errors: counters.iter().map(|c| c.errors).sum(),
            elapsed,
        }
    }

    pub fn mean_tps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0. {
            self.total_txs as f64 / secs
        } else {
            0.
        }
    }
}

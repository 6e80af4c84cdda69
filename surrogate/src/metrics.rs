//! Runtime metrics: a small snapshot of outcome counts, exposed by the
//! surrogate for observability.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    executed: AtomicU64,
    errored: AtomicU64,
    killed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub executed: u64,
    pub errored: u64,
    pub killed: u64,
    pub timed_out: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_killed(&self) {
        self.killed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executed: self.executed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            killed: self.killed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_outcomes() {
        let metrics = RuntimeMetrics::new();
        metrics.record_success();
        metrics.record_success();
        metrics.record_error();
        metrics.record_killed();
        metrics.record_timeout();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.executed, 2);
        assert_eq!(snapshot.errored, 1);
        assert_eq!(snapshot.killed, 1);
        assert_eq!(snapshot.timed_out, 1);
    }
}

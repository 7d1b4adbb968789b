use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide tool counters shared by every exchange. Only ever increase.
#[derive(Debug, Default)]
pub struct ToolStats {
    opened: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ToolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ToolStatsSnapshot {
        ToolStatsSnapshot {
            opened: self.opened.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolStatsSnapshot {
    pub opened: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl ToolStatsSnapshot {
    /// Fraction of opened invocations that succeeded, `None` before the first.
    pub fn success_rate(&self) -> Option<f64> {
        if self.opened == 0 {
            None
        } else {
            Some(self.succeeded as f64 / self.opened as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ToolStats::new();
        assert_eq!(stats.snapshot().success_rate(), None);

        stats.record_open();
        stats.record_open();
        stats.record_close(true);
        stats.record_close(false);

        let snap = stats.snapshot();
        assert_eq!(
            snap,
            ToolStatsSnapshot {
                opened: 2,
                succeeded: 1,
                failed: 1
            }
        );
        assert_eq!(snap.success_rate(), Some(0.5));
    }
}

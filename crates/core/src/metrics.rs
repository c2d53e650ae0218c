use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ActionOutcome;

/// Process-lifetime action counters.
#[derive(Default)]
pub struct ActionMetrics {
    actions_started: AtomicU64,
    actions_succeeded: AtomicU64,
    actions_failed: AtomicU64,
    permission_denials: AtomicU64,
    unsupported: AtomicU64,
}

impl ActionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_started(&self) {
        self.actions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: &ActionOutcome) {
        let counter = match outcome {
            ActionOutcome::Succeeded => &self.actions_succeeded,
            ActionOutcome::Failed(_) => &self.actions_failed,
            ActionOutcome::PermissionDenied => &self.permission_denials,
            ActionOutcome::Unsupported(_) => &self.unsupported,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            actions_started: self.actions_started.load(Ordering::Relaxed),
            actions_succeeded: self.actions_succeeded.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            permission_denials: self.permission_denials.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub actions_started: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub permission_denials: u64,
    pub unsupported: u64,
}

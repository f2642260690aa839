//! Global metrics, the process-wide half of C6.
//!
//! Separate from `QuotaManager` because these counters are read under the
//! system lock as a single consistent snapshot by `get_stats`, whereas
//! quota state is per-service and checked on the hot path without needing
//! a cross-service view.

use abi::Priority;

#[derive(Copy, Clone, Debug, Default)]
pub struct QueueDepth {
    pub current: usize,
    pub max: usize,
}

#[derive(Clone, Debug, Default)]
pub struct GlobalMetrics {
    pub total_events_processed: u64,
    pub low_priority_drops: u64,
    pub queue_full_rejections: u64,
    pub handler_timeouts: u64,
    pub watchdog_timeouts: u64,
    pub version_mismatches: u64,
    pub restart_failures: u64,
    pub depth: [QueueDepth; 3],
}

impl GlobalMetrics {
    fn tier_index(priority: Priority) -> Option<usize> {
        match priority {
            Priority::High => Some(0),
            Priority::Normal => Some(1),
            Priority::Low => Some(2),
            Priority::Critical => None,
        }
    }

    pub fn note_enqueued(&mut self, priority: Priority, depth_after: usize) {
        if let Some(i) = Self::tier_index(priority) {
            self.depth[i].current = depth_after;
            self.depth[i].max = self.depth[i].max.max(depth_after);
        }
    }

    pub fn note_dequeued(&mut self, priority: Priority, depth_after: usize) {
        if let Some(i) = Self::tier_index(priority) {
            self.depth[i].current = depth_after;
        }
    }
}

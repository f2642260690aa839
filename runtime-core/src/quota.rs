//! Quota & Metrics, the per-service half (C6).
//!
//! Tracks live usage against each service's configured limits and rejects
//! the operation that would breach them. A violation is always enforced,
//! never fatal to the service.

use std::collections::HashMap;

use abi::{CoreError, CoreResult, QuotaLimits, ServiceId};

#[derive(Copy, Clone, Debug, Default)]
pub struct ServiceUsage {
    pub events_in_window: u32,
    pub window_start_ms: u64,
    pub memory_bytes: usize,
    pub violations: u64,
}

struct Entry {
    limits: QuotaLimits,
    usage: ServiceUsage,
}

pub struct QuotaManager {
    entries: HashMap<u16, Entry>,
}

impl QuotaManager {
    pub fn new() -> Self {
        QuotaManager {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, service: ServiceId, limits: QuotaLimits) {
        self.entries.insert(
            service.0,
            Entry {
                limits,
                usage: ServiceUsage::default(),
            },
        );
    }

    pub fn release(&mut self, service: ServiceId) {
        self.entries.remove(&service.0);
    }

    pub fn set_limits(&mut self, service: ServiceId, limits: QuotaLimits) -> CoreResult<()> {
        self.entries
            .get_mut(&service.0)
            .map(|e| e.limits = limits)
            .ok_or(CoreError::NotFound)
    }

    pub fn limits(&self, service: ServiceId) -> CoreResult<QuotaLimits> {
        self.entries.get(&service.0).map(|e| e.limits).ok_or(CoreError::NotFound)
    }

    pub fn usage(&self, service: ServiceId) -> CoreResult<ServiceUsage> {
        self.entries.get(&service.0).map(|e| e.usage).ok_or(CoreError::NotFound)
    }

    /// Rolling 1-second event-rate check. Returns `EventsExceeded` once the
    /// (k+1)-th post lands in the same window,
    /// property 8.
    pub fn check_and_record_event(&mut self, service: ServiceId, now_ms: u64) -> CoreResult<()> {
        let entry = self.entries.get_mut(&service.0).ok_or(CoreError::NotFound)?;
        if now_ms.saturating_sub(entry.usage.window_start_ms) >= 1000 {
            entry.usage.window_start_ms = now_ms;
            entry.usage.events_in_window = 0;
        }
        if entry.usage.events_in_window >= entry.limits.max_events_per_sec {
            entry.usage.violations += 1;
            return Err(CoreError::EventsExceeded);
        }
        entry.usage.events_in_window += 1;
        Ok(())
    }

    pub fn check_subscription_slot(&mut self, service: ServiceId, current_count: usize) -> CoreResult<()> {
        let entry = self.entries.get_mut(&service.0).ok_or(CoreError::NotFound)?;
        if current_count >= entry.limits.max_subscriptions {
            entry.usage.violations += 1;
            return Err(CoreError::SubscriptionsExceeded);
        }
        Ok(())
    }

    pub fn check_data_size(&mut self, service: ServiceId, size: usize) -> CoreResult<()> {
        let entry = self.entries.get_mut(&service.0).ok_or(CoreError::NotFound)?;
        if size > entry.limits.max_event_data_size {
            entry.usage.violations += 1;
            return Err(CoreError::DataSizeExceeded);
        }
        Ok(())
    }

    pub fn check_and_record_memory(&mut self, service: ServiceId, delta_bytes: i64) -> CoreResult<()> {
        let entry = self.entries.get_mut(&service.0).ok_or(CoreError::NotFound)?;
        let next = (entry.usage.memory_bytes as i64 + delta_bytes).max(0) as usize;
        if next > entry.limits.max_memory_bytes {
            entry.usage.violations += 1;
            return Err(CoreError::MemoryExceeded);
        }
        entry.usage.memory_bytes = next;
        Ok(())
    }
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kth_plus_one_event_in_window_rejected() {
        let mut q = QuotaManager::new();
        let svc = ServiceId(0);
        q.register(
            svc,
            QuotaLimits {
                max_events_per_sec: 3,
                ..Default::default()
            },
        );
        for _ in 0..3 {
            q.check_and_record_event(svc, 0).unwrap();
        }
        assert_eq!(
            q.check_and_record_event(svc, 0).unwrap_err(),
            CoreError::EventsExceeded
        );
    }

    #[test]
    fn window_resets_after_one_second() {
        let mut q = QuotaManager::new();
        let svc = ServiceId(0);
        q.register(
            svc,
            QuotaLimits {
                max_events_per_sec: 1,
                ..Default::default()
            },
        );
        q.check_and_record_event(svc, 0).unwrap();
        assert!(q.check_and_record_event(svc, 500).is_err());
        q.check_and_record_event(svc, 1000).unwrap();
    }
}

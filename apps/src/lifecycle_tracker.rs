//! App Lifecycle Tracker (C12).
//!
//! Per service-id, a bounded list of the event-types that service has
//! subscribed to through the capability table. Exists so `stop_app` can
//! unsubscribe everything before firing `exit`, since an app-local handler
//! pointer becomes invalid the moment the app is unloaded.

use std::collections::HashMap;

use abi::{EventTypeId, ServiceId};

const MAX_TRACKED_PER_SERVICE: usize = 64;

pub struct AppLifecycleTracker {
    tracked: HashMap<u16, Vec<u16>>,
}

impl AppLifecycleTracker {
    pub fn new() -> Self {
        AppLifecycleTracker {
            tracked: HashMap::new(),
        }
    }

    pub fn track(&mut self, service: ServiceId, event_type: EventTypeId) {
        let list = self.tracked.entry(service.0).or_default();
        if list.len() >= MAX_TRACKED_PER_SERVICE {
            return;
        }
        if !list.contains(&event_type.0) {
            list.push(event_type.0);
        }
    }

    pub fn untrack(&mut self, service: ServiceId, event_type: EventTypeId) {
        if let Some(list) = self.tracked.get_mut(&service.0) {
            list.retain(|&t| t != event_type.0);
        }
    }

    pub fn unsubscribe_all(&mut self, service: ServiceId) -> Vec<EventTypeId> {
        self.tracked
            .remove(&service.0)
            .unwrap_or_default()
            .into_iter()
            .map(EventTypeId)
            .collect()
    }

    pub fn count(&self, service: ServiceId) -> usize {
        self.tracked.get(&service.0).map(Vec::len).unwrap_or(0)
    }
}

impl Default for AppLifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribe_all_clears_and_returns_types() {
        let mut t = AppLifecycleTracker::new();
        let svc = ServiceId(0);
        t.track(svc, EventTypeId(0));
        t.track(svc, EventTypeId(1));
        t.track(svc, EventTypeId(2));
        assert_eq!(t.count(svc), 3);

        let mut types: Vec<u16> = t.unsubscribe_all(svc).into_iter().map(|e| e.0).collect();
        types.sort_unstable();
        assert_eq!(types, vec![0, 1, 2]);
        assert_eq!(t.count(svc), 0);
    }

    #[test]
    fn tracking_is_idempotent() {
        let mut t = AppLifecycleTracker::new();
        let svc = ServiceId(0);
        t.track(svc, EventTypeId(0));
        t.track(svc, EventTypeId(0));
        assert_eq!(t.count(svc), 1);
    }
}

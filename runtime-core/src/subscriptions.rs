//! Subscription Table (C4).
//!
//! Maps (service, event-type) pairs to a handler + user-data. A given pair
//! appears at most once; re-subscribing replaces the prior entry in place
//! so that a service re-running its init logic doesn't need to unsubscribe
//! first. Iteration order for a given event-type is insertion order, which
//! makes dispatch deterministic.

use std::collections::HashMap;

use abi::{CoreError, CoreResult, EventTypeId, ServiceId};

use crate::event::{Handler, UserData};

#[derive(Clone)]
pub struct Subscription {
    pub service: ServiceId,
    pub event_type: EventTypeId,
    pub handler: Handler,
    pub user_data: UserData,
}

pub struct SubscriptionTable {
    max_subscribers: usize,
    entries: HashMap<(u16, u16), Subscription>,
    /// Insertion-order subscriber list per event type.
    by_type: HashMap<u16, Vec<ServiceId>>,
}

impl SubscriptionTable {
    pub fn new(max_subscribers: usize) -> Self {
        SubscriptionTable {
            max_subscribers,
            entries: HashMap::new(),
            by_type: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_for_service(&self, service: ServiceId) -> usize {
        self.entries.keys().filter(|(s, _)| *s == service.0).count()
    }

    pub fn subscribe(
        &mut self,
        service: ServiceId,
        event_type: EventTypeId,
        handler: Handler,
        user_data: UserData,
    ) -> CoreResult<()> {
        let key = (service.0, event_type.0);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_subscribers {
            return Err(CoreError::SubscriptionFull);
        }
        let replaced = self.entries.insert(
            key,
            Subscription {
                service,
                event_type,
                handler,
                user_data,
            },
        );
        if replaced.is_none() {
            self.by_type.entry(event_type.0).or_default().push(service);
        }
        Ok(())
    }

    /// Returns whether an entry was actually removed, so callers that need
    /// to distinguish "removed" from "wasn't subscribed" can (`SystemCore`
    /// turns a `false` into `SubscriptionNotFound`); bulk cleanup callers
    /// that don't care can ignore the bool.
    pub fn unsubscribe(&mut self, service: ServiceId, event_type: EventTypeId) -> CoreResult<bool> {
        let key = (service.0, event_type.0);
        let removed = self.entries.remove(&key).is_some();
        if removed {
            if let Some(list) = self.by_type.get_mut(&event_type.0) {
                list.retain(|&s| s != service);
            }
        }
        Ok(removed)
    }

    pub fn unsubscribe_all_for_service(&mut self, service: ServiceId) {
        let keys: Vec<_> = self
            .entries
            .keys()
            .filter(|(s, _)| *s == service.0)
            .copied()
            .collect();
        for key in keys {
            self.entries.remove(&key);
            if let Some(list) = self.by_type.get_mut(&key.1) {
                list.retain(|&s| s != service);
            }
        }
    }

    /// Snapshot of subscribers for `event_type`, in insertion order. Cloning
    /// is cheap (an `Arc` bump per entry); callers use this to release the
    /// system lock before invoking handlers.
    pub fn subscribers_for(&self, event_type: EventTypeId) -> Vec<Subscription> {
        match self.by_type.get(&event_type.0) {
            Some(services) => services
                .iter()
                .filter_map(|s| self.entries.get(&(s.0, event_type.0)).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn noop_handler() -> Handler {
        Arc::new(|_, _| {})
    }

    #[test]
    fn resubscribe_replaces_in_place() {
        let mut table = SubscriptionTable::new(8);
        let svc = ServiceId(1);
        let ty = EventTypeId(0);
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let h1: Handler = Arc::new(move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        table.subscribe(svc, ty, h1, Arc::new(())).unwrap();
        assert_eq!(table.len(), 1);
        let h2: Handler = Arc::new(move |_, _| {
            calls2.fetch_add(100, Ordering::SeqCst);
        });
        table.subscribe(svc, ty, h2, Arc::new(())).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.subscribers_for(ty).len(), 1);
    }

    #[test]
    fn unsubscribe_reports_whether_it_removed_anything() {
        let mut table = SubscriptionTable::new(8);
        let svc = ServiceId(1);
        let ty = EventTypeId(0);
        assert_eq!(table.unsubscribe(svc, ty).unwrap(), false);
        table.subscribe(svc, ty, noop_handler(), Arc::new(())).unwrap();
        assert_eq!(table.unsubscribe(svc, ty).unwrap(), true);
        assert_eq!(table.unsubscribe(svc, ty).unwrap(), false);
        assert!(table.is_empty());
    }

    #[test]
    fn iteration_is_insertion_order() {
        let mut table = SubscriptionTable::new(8);
        let ty = EventTypeId(0);
        for i in 0..5u16 {
            table
                .subscribe(ServiceId(i), ty, noop_handler(), Arc::new(()))
                .unwrap();
        }
        let order: Vec<_> = table.subscribers_for(ty).into_iter().map(|s| s.service.0).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn global_cap_enforced() {
        let mut table = SubscriptionTable::new(1);
        table
            .subscribe(ServiceId(0), EventTypeId(0), noop_handler(), Arc::new(()))
            .unwrap();
        assert_eq!(
            table
                .subscribe(ServiceId(1), EventTypeId(1), noop_handler(), Arc::new(()))
                .unwrap_err(),
            CoreError::SubscriptionFull
        );
    }
}

//! Ergonomic facade over `runtime_core::SystemCore`.
//!
//! `runtime-core` exposes raw ids and requires the caller to carry the
//! capability key around by hand; this crate wraps that into a couple of
//! handles so application code reads the way `userlib::hl` reads on top of
//! raw IPC syscalls -- the mechanics don't change, only the ergonomics.

use std::sync::Arc;

use abi::{
    CapabilityKey, CoreResult, EventTypeId, Priority, QuotaLimits, ServiceId, ServiceState,
    WatchdogConfig,
};
use runtime_core::{Context, EventView, Handler, Stats, SystemCore, UserData};

/// Owns the capability key returned by `init`, so callers never have to
/// thread it through their own state.
pub struct Client {
    core: Arc<SystemCore>,
    key: CapabilityKey,
}

impl Client {
    /// Builds, initializes, and starts a `SystemCore` in one call -- the
    /// common case for a process that hosts exactly one runtime instance.
    pub fn start(limits: abi::Limits) -> CoreResult<Self> {
        let core = SystemCore::new(limits);
        let key = core.init()?;
        core.start(key)?;
        Ok(Client { core, key })
    }

    pub fn stop(&self) -> CoreResult<()> {
        self.core.stop(self.key)
    }

    pub fn deinit(&self) -> CoreResult<()> {
        self.core.deinit(self.key)
    }

    pub fn get_stats(&self) -> CoreResult<Stats> {
        self.core.get_stats(self.key)
    }

    pub fn register_type(&self, name: &str) -> CoreResult<EventTypeId> {
        self.core.register_type(name)
    }

    pub fn get_type_name(&self, id: EventTypeId) -> CoreResult<String> {
        self.core.get_type_name(id)
    }

    /// Registers a service and hands back a handle scoped to it. The
    /// handle clones the `Arc<SystemCore>`, so it outlives the `Client`
    /// that created it.
    pub fn register(&self, name: &str, context: Context, quota: QuotaLimits) -> CoreResult<ServiceHandle> {
        let id = self.core.register(name, context, quota)?;
        Ok(ServiceHandle {
            core: self.core.clone(),
            id,
        })
    }

    pub fn add_dependency(&self, service: ServiceId, depends_on: ServiceId) -> CoreResult<()> {
        self.core.add_dependency(service, depends_on)
    }

    pub fn get_init_order(&self) -> Vec<ServiceId> {
        self.core.get_init_order()
    }

    pub fn core(&self) -> &Arc<SystemCore> {
        &self.core
    }
}

/// A registered service's view of the runtime. Carries no capability key
/// -- every method here is in the non-admin surface.
#[derive(Clone)]
pub struct ServiceHandle {
    core: Arc<SystemCore>,
    id: ServiceId,
}

impl ServiceHandle {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn set_state(&self, state: ServiceState) -> CoreResult<()> {
        self.core.set_state(self.id, state)
    }

    pub fn get_state(&self) -> CoreResult<ServiceState> {
        self.core.get_state(self.id)
    }

    pub fn heartbeat(&self) -> CoreResult<()> {
        self.core.heartbeat(self.id)
    }

    pub fn set_critical(&self, critical: bool) -> CoreResult<()> {
        self.core.set_critical(self.id, critical)
    }

    pub fn configure_watchdog(&self, config: WatchdogConfig) {
        self.core.configure_watchdog(self.id, config);
    }

    pub fn subscribe(&self, event_type: EventTypeId, handler: Handler, user_data: UserData) -> CoreResult<()> {
        self.core.subscribe(self.id, event_type, handler, user_data)
    }

    pub fn unsubscribe(&self, event_type: EventTypeId) -> CoreResult<()> {
        self.core.unsubscribe(self.id, event_type)
    }

    pub fn post(&self, event_type: EventTypeId, payload: &[u8], priority: Priority) -> CoreResult<()> {
        self.core.post(self.id, event_type, payload, priority)
    }

    pub fn post_async(&self, event_type: EventTypeId, payload: &[u8], priority: Priority) -> CoreResult<()> {
        self.core.post_async(self.id, event_type, payload, priority)
    }

    pub fn unregister(self) -> CoreResult<()> {
        self.core.unregister(self.id)
    }
}

pub use runtime_core::registry::ServiceInfo;

/// Re-exported so downstream crates don't also need a direct
/// `runtime-core` dependency for the event view type.
pub type Event<'a> = EventView<'a>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn register_subscribe_post_round_trip() {
        let client = Client::start(abi::Limits::default()).unwrap();
        let producer = client.register("producer", Arc::new(()), QuotaLimits::default()).unwrap();
        let consumer = client.register("consumer", Arc::new(()), QuotaLimits::default()).unwrap();
        let ty = client.register_type("temp").unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        let handler: Handler = Arc::new(move |view: &Event<'_>, _| {
            received2.lock().unwrap().extend_from_slice(view.payload);
        });
        consumer.subscribe(ty, handler, Arc::new(())).unwrap();

        producer.post(ty, &[1, 2, 3], Priority::Normal).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);

        client.stop().unwrap();
    }

    #[test]
    fn unregister_drops_handle_subscriptions() {
        let client = Client::start(abi::Limits::default()).unwrap();
        let svc = client.register("svc", Arc::new(()), QuotaLimits::default()).unwrap();
        let ty = client.register_type("t").unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        svc.subscribe(ty, Arc::new(move |_: &Event<'_>, _| { count2.fetch_add(1, Ordering::SeqCst); }), Arc::new(()))
            .unwrap();
        svc.unregister().unwrap();
        assert_eq!(client.get_stats().unwrap().active_subscription_count, 0);
        client.stop().unwrap();
    }
}

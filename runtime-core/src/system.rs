//! System Core (C1).
//!
//! The process-wide singleton: owns the capability key, the registries
//! under one system mutex, the event queues, and the dispatcher thread.
//! Exposed as a constructible value (`SystemCore::new`) rather than an
//! ambient global -- callers decide where the one instance they create
//! lives; nothing here reaches for a `static`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rand::RngCore;

use abi::{
    CapabilityKey, CoreError, CoreResult, EventTypeId, Limits, PayloadHeader, Priority,
    QuotaLimits, ServiceId, ServiceState, WatchdogConfig, MAX_SLOT_BYTES,
};

use crate::bus::{EnqueueOutcome, EventQueues, EventSlot};
use crate::deps::DependencyGraph;
use crate::event::{EventView, Handler, UserData};
use crate::event_types::EventTypeRegistry;
use crate::metrics::GlobalMetrics;
use crate::monitor::HandlerMonitor;
use crate::quota::QuotaManager;
use crate::registry::{Context, ServiceInfo, ServiceRegistry};
use crate::subscriptions::SubscriptionTable;
use crate::watchdog::{RestartHook, Watchdog, WatchdogAction};

/// Everything guarded by the system mutex. Lock order is always system
/// mutex before queue lock (see `bus::EventQueues`), never the reverse.
struct Inner {
    registry: ServiceRegistry,
    event_types: EventTypeRegistry,
    subscriptions: SubscriptionTable,
    quota: QuotaManager,
    metrics: GlobalMetrics,
    monitor: HandlerMonitor,
    watchdog: Watchdog,
    deps: DependencyGraph,
}

/// Consistent snapshot returned by `get_stats`.
#[derive(Clone, Debug)]
pub struct Stats {
    pub service_count: usize,
    pub total_events_processed: u64,
    pub active_subscription_count: usize,
    pub low_priority_drops: u64,
    pub queue_full_rejections: u64,
    pub handler_timeouts: u64,
    pub watchdog_timeouts: u64,
    pub version_mismatches: u64,
    pub restart_failures: u64,
    pub uptime_secs: u64,
}

enum Lifecycle {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

/// Name of the reserved event type used to escalate a critical service's
/// watchdog expiry. Registered eagerly so
/// `watchdog_sweep` never has to handle a missing-type error.
const WATCHDOG_TIMEOUT_EVENT: &str = "system.watchdog_timeout";

pub struct SystemCore {
    limits: Limits,
    key: Mutex<Option<u32>>,
    lifecycle: Mutex<Lifecycle>,
    inner: Mutex<Inner>,
    queues: EventQueues,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    watchdog_thread: Mutex<Option<JoinHandle<()>>>,
    dispatching: AtomicBool,
    events_processed: AtomicU64,
    watchdog_event_type: EventTypeId,
}

impl SystemCore {
    /// Creates the singleton, uninitialized. Separate from `init` so a
    /// caller can hold the value (e.g. in an `Arc`) before minting the key.
    pub fn new(limits: Limits) -> Arc<Self> {
        let mut event_types = EventTypeRegistry::new(limits.max_event_types);
        let watchdog_event_type = event_types
            .register(WATCHDOG_TIMEOUT_EVENT)
            .expect("reserved event type must fit under max_event_types");
        Arc::new(SystemCore {
            queues: EventQueues::new(limits.queue_slots_per_tier),
            inner: Mutex::new(Inner {
                registry: ServiceRegistry::new(limits.max_services),
                event_types,
                subscriptions: SubscriptionTable::new(limits.max_subscribers),
                quota: QuotaManager::new(),
                metrics: GlobalMetrics::default(),
                monitor: HandlerMonitor::new(limits.handler_warn_threshold_ms, limits.handler_timeout_ms),
                watchdog: Watchdog::new(),
                deps: DependencyGraph::new(),
            }),
            limits,
            key: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            dispatcher: Mutex::new(None),
            watchdog_thread: Mutex::new(None),
            dispatching: AtomicBool::new(false),
            events_processed: AtomicU64::new(0),
            watchdog_event_type,
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_key(&self, key: CapabilityKey) -> CoreResult<()> {
        match *self.key.lock().unwrap_or_else(|e| e.into_inner()) {
            None => Err(CoreError::NotInitialized),
            Some(k) if k == key.0 => Ok(()),
            Some(_) => Err(CoreError::InvalidKey),
        }
    }

    // ---- C1: lifecycle -------------------------------------------------

    /// Mints a non-zero pseudo-random capability key and clears every
    /// registry. Fails with `ALREADY_INITIALIZED` on a second call.
    pub fn init(&self) -> CoreResult<CapabilityKey> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*lifecycle, Lifecycle::Uninitialized) {
            return Err(CoreError::AlreadyInitialized);
        }
        let mut key_guard = self.key.lock().unwrap_or_else(|e| e.into_inner());
        let mut rng = rand::thread_rng();
        let mut k = rng.next_u32();
        while k == 0 {
            k = rng.next_u32();
        }
        *key_guard = Some(k);
        *lifecycle = Lifecycle::Initialized;
        Ok(CapabilityKey(k))
    }

    pub fn start(self: &Arc<Self>, key: CapabilityKey) -> CoreResult<()> {
        self.check_key(key)?;
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        match *lifecycle {
            Lifecycle::Initialized | Lifecycle::Stopped => {}
            Lifecycle::Started => return Err(CoreError::AlreadyStarted),
            Lifecycle::Uninitialized => return Err(CoreError::NotInitialized),
        }
        self.dispatching.store(true, Ordering::SeqCst);
        let dispatch_core = Arc::clone(self);
        let handle = std::thread::spawn(move || dispatch_core.dispatch_loop());
        *self.dispatcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        let watchdog_core = Arc::clone(self);
        let watchdog_handle = std::thread::spawn(move || watchdog_core.watchdog_loop());
        *self.watchdog_thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(watchdog_handle);

        *lifecycle = Lifecycle::Started;
        Ok(())
    }

    /// Signals the dispatcher and watchdog threads to drain and joins both.
    /// Registries are left intact so a subsequent `start` can resume.
    pub fn stop(&self, key: CapabilityKey) -> CoreResult<()> {
        self.check_key(key)?;
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(*lifecycle, Lifecycle::Started) {
            return Err(CoreError::NotStarted);
        }
        self.dispatching.store(false, Ordering::SeqCst);
        self.queues.shutdown();
        if let Some(handle) = self.dispatcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog_thread.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        *lifecycle = Lifecycle::Stopped;
        Ok(())
    }

    /// Requires `stop` already done; invalidates the key.
    pub fn deinit(&self, key: CapabilityKey) -> CoreResult<()> {
        self.check_key(key)?;
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*lifecycle, Lifecycle::Started) {
            return Err(CoreError::NotStarted);
        }
        *self.key.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *lifecycle = Lifecycle::Uninitialized;
        Ok(())
    }

    pub fn get_stats(&self, key: CapabilityKey) -> CoreResult<Stats> {
        self.check_key(key)?;
        let inner = self.lock_inner();
        Ok(Stats {
            service_count: inner.registry.count(),
            total_events_processed: self.events_processed.load(Ordering::SeqCst),
            active_subscription_count: inner.subscriptions.len(),
            low_priority_drops: inner.metrics.low_priority_drops,
            queue_full_rejections: inner.metrics.queue_full_rejections,
            handler_timeouts: inner.metrics.handler_timeouts,
            watchdog_timeouts: inner.metrics.watchdog_timeouts,
            version_mismatches: inner.metrics.version_mismatches,
            restart_failures: inner.metrics.restart_failures,
            uptime_secs: inner.registry.uptime().as_secs(),
        })
    }

    /// Milliseconds since `init`. Exposed for the app capability table's
    /// `ticks` entry.
    pub fn now_ms(&self) -> u64 {
        self.lock_inner().registry.now_ms()
    }

    // ---- C2: services ----------------------------------------------------

    pub fn register(&self, name: &str, context: Context, quota: QuotaLimits) -> CoreResult<ServiceId> {
        let mut inner = self.lock_inner();
        let id = inner.registry.register(name, context)?;
        inner.quota.register(id, quota);
        Ok(id)
    }

    /// Drops every subscription (C4/C12), releases the quota slot (C6), the
    /// watchdog entry (C8), and the handler-monitor stats (C7) before
    /// removing the record -- `unregister` is the one place all of a
    /// service's owned state is torn down together.
    pub fn unregister(&self, id: ServiceId) -> CoreResult<()> {
        let mut inner = self.lock_inner();
        inner.subscriptions.unsubscribe_all_for_service(id);
        inner.quota.release(id);
        inner.watchdog.release(id);
        inner.monitor.release(id);
        inner.registry.unregister(id)?;
        Ok(())
    }

    pub fn set_state(&self, id: ServiceId, state: ServiceState) -> CoreResult<()> {
        self.lock_inner().registry.set_state(id, state)
    }

    pub fn get_state(&self, id: ServiceId) -> CoreResult<ServiceState> {
        self.lock_inner().registry.get_state(id)
    }

    pub fn heartbeat(&self, id: ServiceId) -> CoreResult<()> {
        self.lock_inner().registry.heartbeat(id)
    }

    pub fn get_info(&self, id: ServiceId) -> CoreResult<ServiceInfo> {
        self.lock_inner().registry.get_info(id)
    }

    pub fn list_all(&self) -> Vec<ServiceInfo> {
        self.lock_inner().registry.list_all()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ServiceId> {
        self.lock_inner().registry.lookup_by_name(name)
    }

    pub fn set_critical(&self, id: ServiceId, critical: bool) -> CoreResult<()> {
        self.lock_inner().registry.set_critical(id, critical)
    }

    pub fn set_log_level(&self, id: ServiceId, level: log::LevelFilter) -> CoreResult<()> {
        self.lock_inner().registry.set_log_level(id, level)
    }

    pub fn get_log_level(&self, id: ServiceId) -> CoreResult<log::LevelFilter> {
        self.lock_inner().registry.get_log_level(id)
    }

    pub fn configure_watchdog(&self, id: ServiceId, config: WatchdogConfig) {
        self.lock_inner().watchdog.configure(id, config);
    }

    /// Registers the restart hook `watchdog_sweep` invokes on expiry when
    /// `auto_restart` is set. Call `configure_watchdog` first so the hook
    /// has somewhere to attach.
    pub fn set_restart_hook(&self, id: ServiceId, hook: RestartHook) {
        self.lock_inner().watchdog.set_restart_hook(id, hook);
    }

    // ---- C3: event types ---------------------------------------------

    pub fn register_type(&self, name: &str) -> CoreResult<EventTypeId> {
        self.lock_inner().event_types.register(name)
    }

    pub fn get_type_name(&self, id: EventTypeId) -> CoreResult<String> {
        self.lock_inner().event_types.get_name(id).map(|s| s.to_string())
    }

    // ---- C4: subscriptions ---------------------------------------------

    pub fn subscribe(
        &self,
        service: ServiceId,
        event_type: EventTypeId,
        handler: Handler,
        user_data: UserData,
    ) -> CoreResult<()> {
        let mut inner = self.lock_inner();
        if inner.registry.get_info(service).is_err() {
            return Err(CoreError::InvalidArg);
        }
        if !inner.event_types.is_registered(event_type) {
            return Err(CoreError::InvalidArg);
        }
        let current = inner.subscriptions.count_for_service(service);
        inner.quota.check_subscription_slot(service, current)?;
        inner.subscriptions.subscribe(service, event_type, handler, user_data)
    }

    pub fn unsubscribe(&self, service: ServiceId, event_type: EventTypeId) -> CoreResult<()> {
        if self.lock_inner().subscriptions.unsubscribe(service, event_type)? {
            Ok(())
        } else {
            Err(CoreError::SubscriptionNotFound)
        }
    }

    // ---- C5: event bus ---------------------------------------------------

    /// Validates the type and quota, then either dispatches synchronously
    /// (CRITICAL) or enqueues into the matching tier.
    pub fn post(&self, sender: ServiceId, event_type: EventTypeId, payload: &[u8], priority: Priority) -> CoreResult<()> {
        if payload.len() > self.limits.max_event_data_bytes || payload.len() > MAX_SLOT_BYTES {
            return Err(CoreError::DataTooLarge);
        }

        // Validation and quota accounting happen under the system mutex
        // regardless of priority; only the dispatch step differs.
        let mut inner = self.lock_inner();
        if !inner.event_types.is_registered(event_type) {
            return Err(CoreError::TypeNotFound);
        }
        let now_ms = inner.registry.now_ms();
        // Check the data-size quota before consuming a slot in the
        // rate-limit window, so a too-large payload doesn't also count
        // against the service's event rate.
        inner.quota.check_data_size(sender, payload.len())?;
        inner.quota.check_and_record_event(sender, now_ms)?;

        if let Some(h) = PayloadHeader::parse(payload) {
            if h.total_size as usize != payload.len() {
                inner.metrics.version_mismatches += 1;
                log::warn!(
                    "payload header mismatch: service={} event_type={} header_version={} header_total_size={} actual_len={}",
                    sender.0,
                    event_type.0,
                    h.version,
                    h.total_size,
                    payload.len()
                );
            }
        }

        let sequence = self.queues.next_sequence();

        if priority == Priority::Critical {
            let subs = inner.subscriptions.subscribers_for(event_type);
            drop(inner);
            let view = EventView {
                event_type,
                priority,
                sender,
                sequence,
                timestamp_ms: now_ms,
                payload,
            };
            for sub in &subs {
                self.invoke_handler(sub, &view);
            }
            self.events_processed.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        drop(inner);

        let mut slot = EventSlot {
            event_type,
            priority,
            sender,
            sequence,
            timestamp_ms: now_ms,
            len: payload.len(),
            data: [0u8; MAX_SLOT_BYTES],
        };
        slot.data[..payload.len()].copy_from_slice(payload);

        match self.queues.enqueue(slot) {
            EnqueueOutcome::Enqueued => {
                let (h, n, l) = self.queues.depths();
                let mut inner = self.lock_inner();
                inner.metrics.note_enqueued(priority, match priority {
                    Priority::High => h,
                    Priority::Normal => n,
                    Priority::Low => l,
                    Priority::Critical => unreachable!(),
                });
                Ok(())
            }
            EnqueueOutcome::DroppedLowPriority => {
                self.lock_inner().metrics.low_priority_drops += 1;
                Ok(())
            }
            EnqueueOutcome::QueueFull => {
                self.lock_inner().metrics.queue_full_rejections += 1;
                Err(CoreError::QueueFull)
            }
        }
    }

    /// Semantically identical to the queued path of `post`; kept as a
    /// distinct name only.
    pub fn post_async(&self, sender: ServiceId, event_type: EventTypeId, payload: &[u8], priority: Priority) -> CoreResult<()> {
        if priority == Priority::Critical {
            return Err(CoreError::InvalidArg);
        }
        self.post(sender, event_type, payload, priority)
    }

    /// Runs the handler with no lock held, so a handler that calls back
    /// into this `SystemCore` (post, subscribe, heartbeat, ...) on the
    /// same thread doesn't deadlock on the non-reentrant system mutex.
    /// Timing and stats bookkeeping happen in a separate, short-lived
    /// critical section before and after the call.
    fn invoke_handler(&self, sub: &crate::subscriptions::Subscription, view: &EventView<'_>) {
        let handler = sub.handler.clone();
        let user_data = sub.user_data.clone();
        let start = std::time::Instant::now();
        (handler)(view, &user_data);
        let elapsed = start.elapsed();

        let mut inner = self.lock_inner();
        let timed_out = inner.monitor.record(sub.service, sub.event_type, elapsed);
        if timed_out {
            inner.metrics.handler_timeouts += 1;
        }
    }

    fn dispatch_loop(self: Arc<Self>) {
        while self.dispatching.load(Ordering::SeqCst) {
            let Some(slot) = self.queues.dequeue_blocking() else {
                break;
            };
            let (h, n, l) = self.queues.depths();
            let subs = {
                let mut inner = self.lock_inner();
                inner.metrics.note_dequeued(slot.priority, match slot.priority {
                    Priority::High => h,
                    Priority::Normal => n,
                    Priority::Low => l,
                    Priority::Critical => unreachable!(),
                });
                inner.subscriptions.subscribers_for(slot.event_type)
            };
            let view = EventView {
                event_type: slot.event_type,
                priority: slot.priority,
                sender: slot.sender,
                sequence: slot.sequence,
                timestamp_ms: slot.timestamp_ms,
                payload: slot.payload(),
            };
            for sub in &subs {
                self.invoke_handler(sub, &view);
            }
            self.events_processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ---- C8: watchdog sweep --------------------------------------------

    /// Runs `watchdog_sweep` on a fixed cadence for as long as the system
    /// is started. A separate thread from the dispatcher, since a sweep
    /// must happen even while the queues are idle.
    fn watchdog_loop(self: Arc<Self>) {
        let period = std::time::Duration::from_millis(self.limits.lock_wait_timeout_ms.max(10));
        while self.dispatching.load(Ordering::SeqCst) {
            self.watchdog_sweep();
            std::thread::sleep(period);
        }
    }

    /// Scans RUNNING services for expired heartbeats and drives the state
    /// transition. Called periodically by `watchdog_loop`; exposed so a
    /// caller can also drive it from their own scheduler.
    pub fn watchdog_sweep(&self) {
        let now_ms = self.now_ms();
        let running: Vec<ServiceId> = self
            .list_all()
            .into_iter()
            .filter(|s| s.state == ServiceState::Running)
            .map(|s| s.id)
            .collect();

        for id in running {
            let mut inner = self.lock_inner();
            let Some(timeout_ms) = inner.watchdog.timeout_ms(id) else {
                continue;
            };
            let Some(age) = inner.registry.heartbeat_age_ms(id, now_ms) else {
                continue;
            };
            if age < timeout_ms {
                continue;
            }
            let restart_count = inner.registry.force_error(id).unwrap_or(0);
            let action = inner.watchdog.check(id, age, restart_count);
            if let WatchdogAction::Expired { is_critical, restart_result } = action {
                inner.metrics.watchdog_timeouts += 1;
                match restart_result {
                    Some(Ok(())) => {
                        // Recovered: ERROR -> REGISTERED, per the watchdog
                        // auto-restart edge in the service state diagram.
                        let _ = inner.registry.set_state(id, ServiceState::Registered);
                    }
                    Some(Err(_)) => {
                        inner.metrics.restart_failures += 1;
                        log::error!("service {:?} failed to restart: {:?}", id, CoreError::RestartFailed);
                    }
                    None => {}
                }
                if is_critical {
                    drop(inner);
                    let _ = self.post(id, self.watchdog_event_type, &[], Priority::Critical);
                }
            }
        }
    }

    // ---- C9: dependency graph --------------------------------------------

    pub fn add_dependency(&self, service: ServiceId, depends_on: ServiceId) -> CoreResult<()> {
        self.lock_inner().deps.add(service, depends_on)
    }

    pub fn add_dependencies(&self, edges: &[(ServiceId, ServiceId)]) -> CoreResult<()> {
        self.lock_inner().deps.add_multiple(edges)
    }

    pub fn get_init_order(&self) -> Vec<ServiceId> {
        self.lock_inner().deps.get_init_order()
    }

    /// OK iff every dependency is currently in state RUNNING or PAUSED.
    /// `DependencyGraph::check_ready` only tracks which services were ever
    /// marked initialized; a dependency that has since stopped or errored
    /// must still fail readiness, so that part is checked here against the
    /// registry's live state.
    pub fn check_ready(&self, service: ServiceId) -> bool {
        let inner = self.lock_inner();
        if !inner.deps.check_ready(service) {
            return false;
        }
        inner.deps.dependencies_of(service).iter().all(|&dep| {
            matches!(
                inner.registry.get_state(dep),
                Ok(ServiceState::Running) | Ok(ServiceState::Paused)
            )
        })
    }

    pub fn mark_initialized(&self, service: ServiceId) {
        self.lock_inner().deps.mark_initialized(service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc as StdArc;

    fn ctx() -> Context {
        StdArc::new(())
    }

    #[test]
    fn key_gating_blocks_admin_calls() {
        let core = SystemCore::new(Limits::default());
        let key = core.init().unwrap();
        assert_eq!(core.start(CapabilityKey(key.0 + 1)).unwrap_err(), CoreError::InvalidKey);
        core.start(key).unwrap();
        assert_eq!(core.stop(CapabilityKey(key.0 + 1)).unwrap_err(), CoreError::InvalidKey);
        core.stop(key).unwrap();
    }

    #[test]
    fn basic_pub_sub() {
        let core = SystemCore::new(Limits::default());
        let key = core.init().unwrap();
        core.start(key).unwrap();

        let producer = core.register("producer", ctx(), QuotaLimits::default()).unwrap();
        let consumer = core.register("consumer", ctx(), QuotaLimits::default()).unwrap();
        let temp = core.register_type("temp").unwrap();

        let received: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        let handler: Handler = Arc::new(move |view, _| {
            received2.lock().unwrap().extend_from_slice(view.payload);
        });
        core.subscribe(consumer, temp, handler, StdArc::new(())).unwrap();

        core.post(producer, temp, &[0x41, 0x42], Priority::Normal).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(*received.lock().unwrap(), vec![0x41, 0x42]);

        core.stop(key).unwrap();
    }

    #[test]
    fn critical_post_is_synchronous() {
        let core = SystemCore::new(Limits::default());
        let key = core.init().unwrap();
        core.start(key).unwrap();

        let producer = core.register("producer", ctx(), QuotaLimits::default()).unwrap();
        let consumer = core.register("consumer", ctx(), QuotaLimits::default()).unwrap();
        let alert = core.register_type("alert").unwrap();

        let called = Arc::new(AtomicU32::new(0));
        let called2 = called.clone();
        let handler: Handler = Arc::new(move |_, _| {
            called2.fetch_add(1, Ordering::SeqCst);
        });
        core.subscribe(consumer, alert, handler, StdArc::new(())).unwrap();

        core.post(producer, alert, &[], Priority::Critical).unwrap();
        assert_eq!(called.load(Ordering::SeqCst), 1);

        core.stop(key).unwrap();
    }

    #[test]
    fn queue_full_for_normal_low_silently_drops() {
        let mut limits = Limits::default();
        limits.queue_slots_per_tier = 2;
        let core = SystemCore::new(limits);
        let key = core.init().unwrap();
        // Dispatcher not started: queue never drains.

        let producer = core.register("producer", ctx(), QuotaLimits::default()).unwrap();
        let ty = core.register_type("t").unwrap();

        core.post(producer, ty, &[], Priority::Normal).unwrap();
        core.post(producer, ty, &[], Priority::Normal).unwrap();
        assert_eq!(core.post(producer, ty, &[], Priority::Normal).unwrap_err(), CoreError::QueueFull);

        core.post(producer, ty, &[], Priority::Low).unwrap();
        core.post(producer, ty, &[], Priority::Low).unwrap();
        core.post(producer, ty, &[], Priority::Low).unwrap();
        let stats = core.get_stats(key).unwrap();
        assert_eq!(stats.low_priority_drops, 1);
    }

    #[test]
    fn unregister_clears_subscriptions() {
        let core = SystemCore::new(Limits::default());
        let key = core.init().unwrap();
        core.start(key).unwrap();

        let app = core.register("app", ctx(), QuotaLimits::default()).unwrap();
        let t0 = core.register_type("t0").unwrap();
        core.subscribe(app, t0, Arc::new(|_, _| {}), StdArc::new(())).unwrap();
        assert_eq!(core.get_stats(key).unwrap().active_subscription_count, 1);

        core.unregister(app).unwrap();
        assert_eq!(core.get_stats(key).unwrap().active_subscription_count, 0);

        core.stop(key).unwrap();
    }
}

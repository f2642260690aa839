//! App Capability Table (C11).
//!
//! A versioned, append-only table of operations handed to every loaded
//! app's entry/exit functions. The literal spec calls for a struct of
//! function pointers shared across independently-built binaries; this
//! runtime never actually dynamically loads foreign code (apps are Rust
//! closures registered in-process), so the table is the "opaque record
//! with safe wrappers" variant allowed for a
//! memory-safe target -- the methods below are the wrappers, `version`
//! is the only field a real ABI consumer would need to check.

use std::sync::{Arc, Mutex};

use abi::{CoreError, CoreResult, EventTypeId, Priority, ServiceId, ServiceState};
use runtime_core::{Handler, SystemCore, UserData};

use crate::lifecycle_tracker::AppLifecycleTracker;

/// Bumped only when a new field is appended to the end of the table.
pub const CAPABILITY_TABLE_VERSION: u32 = 1;

/// External memory pool apps allocate from, collapsed to a single
/// allocator per the open-question resolution in DESIGN.md: this runtime
/// does not implement a SRAM/external-RAM split, so `alloc`/`free` here
/// are the only allocation path apps get.
pub struct ExternalPool {
    capacity: usize,
    used: usize,
}

impl ExternalPool {
    pub fn new(capacity: usize) -> Self {
        ExternalPool { capacity, used: 0 }
    }

    fn reserve(&mut self, size: usize) -> CoreResult<()> {
        let needed = self.used.checked_add(size).ok_or(CoreError::PoolExhausted)?;
        if needed > self.capacity {
            return Err(CoreError::PoolExhausted);
        }
        self.used += size;
        Ok(())
    }

    fn release(&mut self, size: usize) {
        self.used = self.used.saturating_sub(size);
    }

    /// Adjusts an existing `old_size` reservation to `new_size` in place.
    /// Growing only reserves the delta, so a failure here leaves the
    /// original reservation untouched instead of freeing it first and
    /// potentially losing it to a concurrent `alloc`.
    fn resize(&mut self, old_size: usize, new_size: usize) -> CoreResult<()> {
        if new_size <= old_size {
            self.release(old_size - new_size);
            Ok(())
        } else {
            self.reserve(new_size - old_size)
        }
    }
}

pub struct AppCapabilityTable {
    pub version: u32,
    core: Arc<SystemCore>,
    tracker: Arc<Mutex<AppLifecycleTracker>>,
    pool: Mutex<ExternalPool>,
}

/// Bundles an app's own service-id with the table it was loaded against,
/// passed to `entry`/`exit`. Apps look up their own id to call back into
/// the table (`register_service` excepted, since that's how the id is
/// created in the first place).
pub struct AppContext {
    pub service_id: ServiceId,
    pub table: Arc<AppCapabilityTable>,
}

impl AppCapabilityTable {
    pub fn new(core: Arc<SystemCore>, tracker: Arc<Mutex<AppLifecycleTracker>>, pool_capacity: usize) -> Arc<Self> {
        Arc::new(AppCapabilityTable {
            version: CAPABILITY_TABLE_VERSION,
            core,
            tracker,
            pool: Mutex::new(ExternalPool::new(pool_capacity)),
        })
    }

    // -- service management ------------------------------------------------

    pub fn register_service(&self, name: &str, context: UserData, quota: abi::QuotaLimits) -> CoreResult<ServiceId> {
        self.core.register(name, context, quota)
    }

    pub fn unregister_service(&self, id: ServiceId) -> CoreResult<()> {
        self.core.unregister(id)
    }

    pub fn set_state(&self, id: ServiceId, state: ServiceState) -> CoreResult<()> {
        self.core.set_state(id, state)
    }

    pub fn heartbeat(&self, id: ServiceId) -> CoreResult<()> {
        self.core.heartbeat(id)
    }

    // -- event bus ------------------------------------------------------

    pub fn post_event(&self, sender: ServiceId, event_type: EventTypeId, payload: &[u8], priority: Priority) -> CoreResult<()> {
        self.core.post(sender, event_type, payload, priority)
    }

    pub fn subscribe_event(&self, service: ServiceId, event_type: EventTypeId, handler: Handler, user_data: UserData) -> CoreResult<()> {
        self.core.subscribe(service, event_type, handler, user_data)?;
        self.tracker.lock().unwrap_or_else(|e| e.into_inner()).track(service, event_type);
        Ok(())
    }

    pub fn unsubscribe_event(&self, service: ServiceId, event_type: EventTypeId) -> CoreResult<()> {
        self.core.unsubscribe(service, event_type)?;
        self.tracker.lock().unwrap_or_else(|e| e.into_inner()).untrack(service, event_type);
        Ok(())
    }

    pub fn register_event_type(&self, name: &str) -> CoreResult<EventTypeId> {
        self.core.register_type(name)
    }

    // -- allocation -------------------------------------------------------

    pub fn alloc(&self, size: usize) -> CoreResult<usize> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).reserve(size)?;
        Ok(size)
    }

    pub fn free(&self, size: usize) {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).release(size);
    }

    pub fn calloc(&self, count: usize, size: usize) -> CoreResult<usize> {
        let total = count.checked_mul(size).ok_or(CoreError::InvalidArg)?;
        self.alloc(total)
    }

    pub fn realloc(&self, old_size: usize, new_size: usize) -> CoreResult<usize> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).resize(old_size, new_size)?;
        Ok(new_size)
    }

    // -- diagnostics and time ----------------------------------------------

    /// Single string-plus-args entry point, per the variadic-logger design
    /// note: the ABI carries a formatted string, never
    /// a variadic signature. Drops the message below `service`'s configured
    /// log level instead of forwarding everything to `log`.
    pub fn log_write(&self, service: ServiceId, level: log::Level, tag: &str, message: &str) {
        let threshold = self.core.get_log_level(service).unwrap_or(log::LevelFilter::Info);
        if level > threshold {
            return;
        }
        log::log!(level, "[{}] {}", tag, message);
    }

    pub fn set_log_level(&self, service: ServiceId, level: log::LevelFilter) -> CoreResult<()> {
        self.core.set_log_level(service, level)
    }

    pub fn get_log_level(&self, service: ServiceId) -> CoreResult<log::LevelFilter> {
        self.core.get_log_level(service)
    }

    pub fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }

    pub fn ticks(&self) -> u64 {
        self.core.now_ms()
    }
}

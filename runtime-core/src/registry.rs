//! Service Registry (C2).
//!
//! Name -> id mapping, lifecycle state, heartbeat timestamps, and the
//! per-service fields that belong to a registered service but aren't
//! owned by any other component (context pointer, critical flag, restart
//! counter, log level).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use abi::{CoreError, CoreResult, ServiceId, ServiceState};

const MAX_NAME_LEN: usize = 31;

/// Opaque, service-owned context. The registry stores it and hands back a
/// clone of the `Arc` on lookup; it never inspects the contents.
pub type Context = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub name: String,
    pub state: ServiceState,
    pub context: Context,
    pub last_heartbeat_ms: u64,
    pub critical: bool,
    pub restart_count: u32,
    pub log_level: log::LevelFilter,
}

struct Record {
    info: ServiceInfo,
}

/// Name -> id -> record registry. Holds no locks of its own; the caller
/// (`SystemCore`) serializes access via the system mutex; see
/// section 5's lock-order rule.
pub struct ServiceRegistry {
    max_services: usize,
    records: HashMap<u16, Record>,
    names: HashMap<String, u16>,
    /// Registration order, for `list_all`. Ids can be recycled after
    /// `unregister`, so this is tracked independently of numeric id order.
    order: Vec<u16>,
    boot: Instant,
}

impl ServiceRegistry {
    pub fn new(max_services: usize) -> Self {
        ServiceRegistry {
            max_services,
            records: HashMap::new(),
            names: HashMap::new(),
            order: Vec::new(),
            boot: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        Instant::now().duration_since(self.boot).as_millis() as u64
    }

    /// Scans `0..max_services` for the smallest id not currently in use.
    /// Freed ids must be handed out again before any higher one -- a
    /// hint-based forward scan would skip over them once the hint has
    /// advanced past a since-freed slot.
    fn lowest_free_id(&self) -> Option<u16> {
        (0..self.max_services as u16).find(|id| !self.records.contains_key(id))
    }

    pub fn register(&mut self, name: &str, context: Context) -> CoreResult<ServiceId> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(CoreError::InvalidArg);
        }
        if self.names.contains_key(name) {
            return Err(CoreError::AlreadyRegistered);
        }
        let id = self.lowest_free_id().ok_or(CoreError::RegistryFull)?;
        self.names.insert(name.to_string(), id);
        self.records.insert(
            id,
            Record {
                info: ServiceInfo {
                    id: ServiceId(id),
                    name: name.to_string(),
                    state: ServiceState::Unregistered,
                    context,
                    last_heartbeat_ms: 0,
                    critical: false,
                    restart_count: 0,
                    log_level: log::LevelFilter::Info,
                },
            },
        );
        self.order.push(id);
        Ok(ServiceId(id))
    }

    /// Mirrors `register`'s UNREGISTERED -> REGISTERED handoff: callers
    /// finish setup, then flip the state themselves via `set_state`.
    pub fn set_state(&mut self, id: ServiceId, state: ServiceState) -> CoreResult<()> {
        let record = self.records.get_mut(&id.0).ok_or(CoreError::NotFound)?;
        let current = record.info.state;
        let legal = matches!(
            (current, state),
            (ServiceState::Unregistered, ServiceState::Registered)
        ) || current.can_transition_to(state);
        if !legal {
            return Err(CoreError::InvalidState);
        }
        record.info.state = state;
        if state == ServiceState::Running {
            let now = self.now_ms();
            self.records.get_mut(&id.0).unwrap().info.last_heartbeat_ms = now;
        }
        Ok(())
    }

    /// Forces a service into `ERROR`, bumping its restart counter. Used by
    /// the watchdog on heartbeat expiry, which isn't a normal
    /// application-initiated `set_state` call.
    pub fn force_error(&mut self, id: ServiceId) -> CoreResult<u32> {
        let record = self.records.get_mut(&id.0).ok_or(CoreError::NotFound)?;
        record.info.state = ServiceState::Error;
        record.info.restart_count += 1;
        Ok(record.info.restart_count)
    }

    pub fn heartbeat(&mut self, id: ServiceId) -> CoreResult<()> {
        let now = self.now_ms();
        let record = self.records.get_mut(&id.0).ok_or(CoreError::NotFound)?;
        if record.info.state != ServiceState::Running {
            return Err(CoreError::InvalidState);
        }
        record.info.last_heartbeat_ms = now;
        Ok(())
    }

    pub fn set_critical(&mut self, id: ServiceId, critical: bool) -> CoreResult<()> {
        let record = self.records.get_mut(&id.0).ok_or(CoreError::NotFound)?;
        record.info.critical = critical;
        Ok(())
    }

    pub fn set_log_level(&mut self, id: ServiceId, level: log::LevelFilter) -> CoreResult<()> {
        let record = self.records.get_mut(&id.0).ok_or(CoreError::NotFound)?;
        record.info.log_level = level;
        Ok(())
    }

    pub fn get_log_level(&self, id: ServiceId) -> CoreResult<log::LevelFilter> {
        self.records
            .get(&id.0)
            .map(|r| r.info.log_level)
            .ok_or(CoreError::NotFound)
    }

    pub fn get_info(&self, id: ServiceId) -> CoreResult<ServiceInfo> {
        self.records
            .get(&id.0)
            .map(|r| r.info.clone())
            .ok_or(CoreError::NotFound)
    }

    pub fn get_state(&self, id: ServiceId) -> CoreResult<ServiceState> {
        self.records
            .get(&id.0)
            .map(|r| r.info.state)
            .ok_or(CoreError::NotFound)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ServiceId> {
        self.names.get(name).copied().map(ServiceId)
    }

    /// Registration-order snapshot of every live service.
    pub fn list_all(&self) -> Vec<ServiceInfo> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|r| r.info.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Drops the service from the registry. Callers must already have
    /// unsubscribed it (C12/C4) and released its quota slot (C6) -- this
    /// method only does the name/id bookkeeping.
    pub fn unregister(&mut self, id: ServiceId) -> CoreResult<ServiceInfo> {
        let record = self.records.remove(&id.0).ok_or(CoreError::NotFound)?;
        self.names.remove(&record.info.name);
        self.order.retain(|&x| x != id.0);
        Ok(record.info)
    }

    /// Services whose last heartbeat predates `now_ms - timeout_ms` while
    /// `RUNNING`. Used by the watchdog scan (C8).
    pub fn stale_running(&self, now_ms: u64, timeout_ms: u64) -> Vec<ServiceId> {
        self.records
            .values()
            .filter(|r| {
                r.info.state == ServiceState::Running
                    && now_ms.saturating_sub(r.info.last_heartbeat_ms) >= timeout_ms
            })
            .map(|r| r.info.id)
            .collect()
    }

    pub fn heartbeat_age_ms(&self, id: ServiceId, now_ms: u64) -> Option<u64> {
        self.records
            .get(&id.0)
            .map(|r| now_ms.saturating_sub(r.info.last_heartbeat_ms))
    }

    pub fn uptime(&self) -> Duration {
        self.boot.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Arc::new(())
    }

    #[test]
    fn register_assigns_lowest_free_id() {
        let mut reg = ServiceRegistry::new(4);
        let a = reg.register("a", ctx()).unwrap();
        let b = reg.register("b", ctx()).unwrap();
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        reg.unregister(a).unwrap();
        let c = reg.register("c", ctx()).unwrap();
        assert_eq!(c.0, 0);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = ServiceRegistry::new(4);
        reg.register("dup", ctx()).unwrap();
        assert_eq!(
            reg.register("dup", ctx()).unwrap_err(),
            CoreError::AlreadyRegistered
        );
    }

    #[test]
    fn registry_full() {
        let mut reg = ServiceRegistry::new(1);
        reg.register("a", ctx()).unwrap();
        assert_eq!(reg.register("b", ctx()).unwrap_err(), CoreError::RegistryFull);
    }

    #[test]
    fn state_machine_rejects_illegal_transitions() {
        let mut reg = ServiceRegistry::new(4);
        let id = reg.register("svc", ctx()).unwrap();
        assert_eq!(
            reg.set_state(id, ServiceState::Paused).unwrap_err(),
            CoreError::InvalidState
        );
        reg.set_state(id, ServiceState::Registered).unwrap();
        reg.set_state(id, ServiceState::Running).unwrap();
        reg.set_state(id, ServiceState::Paused).unwrap();
        reg.set_state(id, ServiceState::Running).unwrap();
        reg.set_state(id, ServiceState::Stopping).unwrap();
    }

    #[test]
    fn heartbeat_requires_running() {
        let mut reg = ServiceRegistry::new(4);
        let id = reg.register("svc", ctx()).unwrap();
        assert_eq!(reg.heartbeat(id).unwrap_err(), CoreError::InvalidState);
        reg.set_state(id, ServiceState::Registered).unwrap();
        reg.set_state(id, ServiceState::Running).unwrap();
        reg.heartbeat(id).unwrap();
    }

    #[test]
    fn list_all_is_registration_order() {
        let mut reg = ServiceRegistry::new(4);
        let a = reg.register("a", ctx()).unwrap();
        let b = reg.register("b", ctx()).unwrap();
        reg.unregister(a).unwrap();
        let c = reg.register("c", ctx()).unwrap();
        let names: Vec<_> = reg.list_all().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["b", "c"]);
        let _ = b;
    }
}

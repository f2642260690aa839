//! Watchdog (C8).
//!
//! Observes per-service heartbeat age and, on expiry, transitions the
//! service to `ERROR` and (if configured) invokes a restart hook. Unifies
//! two historical designs -- a heartbeat-scan supervisor and
//! handler-timeout signalling from C7 -- per the Open Question
//! resolution in DESIGN.md.

use std::collections::HashMap;

use abi::{CoreError, ServiceId, WatchdogConfig};

pub type RestartHook = Box<dyn FnMut(ServiceId) -> Result<(), CoreError> + Send>;

struct Entry {
    config: WatchdogConfig,
    hook: Option<RestartHook>,
}

pub struct Watchdog {
    entries: HashMap<u16, Entry>,
}

/// Outcome of a single service's watchdog check, for the caller to act on
/// (transition state, emit the CRITICAL escalation event, bump metrics).
pub enum WatchdogAction {
    /// Heartbeat still fresh, nothing to do.
    Ok,
    /// Heartbeat expired; the service was transitioned to ERROR before
    /// this check ran. `restart_result` reflects what the hook did:
    /// `None` means auto-restart wasn't configured or attempts were
    /// exhausted, so the service stays in ERROR; `Some(Ok(()))` means the
    /// hook recovered it and the caller should move it back to
    /// REGISTERED; `Some(Err(_))` means the hook ran and failed, so the
    /// caller should surface `RestartFailed` and leave it in ERROR.
    Expired {
        is_critical: bool,
        restart_result: Option<Result<(), CoreError>>,
    },
}

impl Watchdog {
    pub fn new() -> Self {
        Watchdog {
            entries: HashMap::new(),
        }
    }

    pub fn configure(&mut self, service: ServiceId, config: WatchdogConfig) {
        self.entries
            .entry(service.0)
            .and_modify(|e| e.config = config)
            .or_insert(Entry { config, hook: None });
    }

    pub fn set_restart_hook(&mut self, service: ServiceId, hook: RestartHook) {
        self.entries
            .entry(service.0)
            .or_insert(Entry {
                config: WatchdogConfig {
                    timeout_ms: 0,
                    auto_restart: false,
                    max_restart_attempts: 0,
                    is_critical: false,
                },
                hook: None,
            })
            .hook = Some(hook);
    }

    pub fn release(&mut self, service: ServiceId) {
        self.entries.remove(&service.0);
    }

    pub fn timeout_ms(&self, service: ServiceId) -> Option<u64> {
        self.entries.get(&service.0).map(|e| e.config.timeout_ms).filter(|&t| t > 0)
    }

    /// Evaluates expiry for `service` given its current heartbeat age, and
    /// runs the restart hook if configured and attempts remain.
    ///
    /// Returns the action taken; the caller (system core) is responsible
    /// for the state transition and for emitting the CRITICAL escalation
    /// event when `is_critical` is set and the hook fails or is absent.
    pub fn check(&mut self, service: ServiceId, age_ms: u64, restart_count: u32) -> WatchdogAction {
        let Some(entry) = self.entries.get_mut(&service.0) else {
            return WatchdogAction::Ok;
        };
        if entry.config.timeout_ms == 0 || age_ms < entry.config.timeout_ms {
            return WatchdogAction::Ok;
        }

        let attempts_ok = entry.config.max_restart_attempts == 0
            || restart_count <= entry.config.max_restart_attempts;
        let restart_result = if entry.config.auto_restart && attempts_ok {
            entry.hook.as_mut().map(|hook| hook(service))
        } else {
            None
        };
        WatchdogAction::Expired {
            is_critical: entry.config.is_critical,
            restart_result,
        }
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn fresh_heartbeat_is_ok() {
        let mut wd = Watchdog::new();
        wd.configure(
            ServiceId(0),
            WatchdogConfig {
                timeout_ms: 1000,
                auto_restart: false,
                max_restart_attempts: 0,
                is_critical: false,
            },
        );
        assert!(matches!(wd.check(ServiceId(0), 10, 0), WatchdogAction::Ok));
    }

    #[test]
    fn expiry_invokes_restart_hook() {
        let mut wd = Watchdog::new();
        wd.configure(
            ServiceId(0),
            WatchdogConfig {
                timeout_ms: 100,
                auto_restart: true,
                max_restart_attempts: 0,
                is_critical: true,
            },
        );
        let called = Arc::new(AtomicU32::new(0));
        let called2 = called.clone();
        wd.set_restart_hook(
            ServiceId(0),
            Box::new(move |_| {
                called2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        match wd.check(ServiceId(0), 500, 0) {
            WatchdogAction::Expired { is_critical, restart_result } => {
                assert!(is_critical);
                assert_eq!(restart_result, Some(Ok(())));
            }
            WatchdogAction::Ok => panic!("expected expiry"),
        }
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_restart_attempts_skips_hook() {
        let mut wd = Watchdog::new();
        wd.configure(
            ServiceId(0),
            WatchdogConfig {
                timeout_ms: 100,
                auto_restart: true,
                max_restart_attempts: 2,
                is_critical: false,
            },
        );
        let called = Arc::new(AtomicU32::new(0));
        let called2 = called.clone();
        wd.set_restart_hook(
            ServiceId(0),
            Box::new(move |_| {
                called2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        wd.check(ServiceId(0), 500, 3);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_restart_hook_surfaces_error() {
        let mut wd = Watchdog::new();
        wd.configure(
            ServiceId(0),
            WatchdogConfig {
                timeout_ms: 100,
                auto_restart: true,
                max_restart_attempts: 0,
                is_critical: false,
            },
        );
        wd.set_restart_hook(ServiceId(0), Box::new(|_| Err(CoreError::RestartFailed)));
        match wd.check(ServiceId(0), 500, 0) {
            WatchdogAction::Expired { restart_result, .. } => {
                assert_eq!(restart_result, Some(Err(CoreError::RestartFailed)));
            }
            WatchdogAction::Ok => panic!("expected expiry"),
        }
    }
}

//! Handler Monitor (C7).
//!
//! Wraps every handler invocation with a monotonic timer, tracks
//! per-service running total/count/max, and flags slow or (if configured)
//! timed-out handlers. Handlers are cooperative: a "timeout" here means
//! "observed long, counted, diagnosed", never "aborted".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use abi::{EventTypeId, ServiceId};

/// Diagnostic entries recorded for slow or timed-out handler invocations.
/// Kept in a fixed-capacity ring buffer rather than logged on the hot path,
/// matching a preference for `ringbuf!` over a logging macro
/// inside dispatch (see SPEC_FULL.md section 1.2).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Diag {
    #[default]
    None,
    SlowHandler {
        service: u16,
        event_type: u16,
        micros: u32,
    },
    HandlerTimeout {
        service: u16,
        event_type: u16,
        micros: u32,
    },
}

ringbuf::ringbuf!(HANDLER_DIAG, Diag, 64, Diag::None);

#[derive(Copy, Clone, Debug, Default)]
pub struct HandlerStats {
    pub invocations: u64,
    pub total: Duration,
    pub max: Duration,
    pub timeouts: u64,
}

impl HandlerStats {
    pub fn average(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total / self.invocations as u32
        }
    }
}

pub struct HandlerMonitor {
    warn_threshold: Duration,
    timeout_threshold: Option<Duration>,
    stats: HashMap<u16, HandlerStats>,
}

impl HandlerMonitor {
    pub fn new(warn_threshold_ms: u64, timeout_threshold_ms: u64) -> Self {
        HandlerMonitor {
            warn_threshold: Duration::from_millis(warn_threshold_ms),
            timeout_threshold: if timeout_threshold_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(timeout_threshold_ms))
            },
            stats: HashMap::new(),
        }
    }

    /// Invokes `f`, timing it and updating per-service stats. Returns
    /// whether the invocation is counted as a timeout (the handler still
    /// ran to completion -- there is no preemption).
    ///
    /// `f` runs with no lock held by the caller -- see `record` for the
    /// split version used where the timing has to happen outside a
    /// critical section the handler itself might re-enter.
    pub fn invoke(&mut self, service: ServiceId, event_type: EventTypeId, f: impl FnOnce()) -> bool {
        let start = Instant::now();
        f();
        let elapsed = start.elapsed();
        self.record(service, event_type, elapsed)
    }

    /// Updates per-service stats for an invocation already timed by the
    /// caller. Returns whether it counts as a timeout.
    pub fn record(&mut self, service: ServiceId, event_type: EventTypeId, elapsed: Duration) -> bool {
        let entry = self.stats.entry(service.0).or_default();
        entry.invocations += 1;
        entry.total += elapsed;
        entry.max = entry.max.max(elapsed);

        let micros = elapsed.as_micros().min(u32::MAX as u128) as u32;
        if elapsed >= self.warn_threshold {
            ringbuf::ringbuf_entry!(
                HANDLER_DIAG,
                Diag::SlowHandler {
                    service: service.0,
                    event_type: event_type.0,
                    micros,
                }
            );
            log::warn!(
                "slow handler: service={} event_type={} took {:?}",
                service.0,
                event_type.0,
                elapsed
            );
        }

        let timed_out = matches!(self.timeout_threshold, Some(t) if elapsed >= t);
        if timed_out {
            entry.timeouts += 1;
            ringbuf::ringbuf_entry!(
                HANDLER_DIAG,
                Diag::HandlerTimeout {
                    service: service.0,
                    event_type: event_type.0,
                    micros,
                }
            );
        }
        timed_out
    }

    pub fn stats_for(&self, service: ServiceId) -> HandlerStats {
        self.stats.get(&service.0).copied().unwrap_or_default()
    }

    pub fn release(&mut self, service: ServiceId) {
        self.stats.remove(&service.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn tracks_average_and_max() {
        let mut mon = HandlerMonitor::new(1000, 0);
        let svc = ServiceId(0);
        let ty = EventTypeId(0);
        mon.invoke(svc, ty, || {});
        mon.invoke(svc, ty, || {});
        let stats = mon.stats_for(svc);
        assert_eq!(stats.invocations, 2);
    }

    #[test]
    fn slow_handler_does_not_count_as_timeout_when_disabled() {
        let mut mon = HandlerMonitor::new(0, 0);
        let timed_out = mon.invoke(ServiceId(0), EventTypeId(0), || sleep(Duration::from_millis(2)));
        assert!(!timed_out);
    }

    #[test]
    fn timeout_counted_when_configured() {
        let mut mon = HandlerMonitor::new(0, 1);
        let timed_out = mon.invoke(ServiceId(0), EventTypeId(0), || sleep(Duration::from_millis(5)));
        assert!(timed_out);
        assert_eq!(mon.stats_for(ServiceId(0)).timeouts, 1);
    }
}

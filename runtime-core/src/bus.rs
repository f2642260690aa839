//! Event Bus queue mechanics (part of C5).
//!
//! Three FIFO tiers (HIGH, NORMAL, LOW), each a bounded `VecDeque` guarded
//! by its own lock and condition variable -- deliberately *not* the system
//! mutex, per the lock-order rule "system mutex -> queue lock, never the
//! reverse". CRITICAL events never touch this module; they're dispatched
//! synchronously by the caller in `system::SystemCore::post`.
//!
//! Orchestration (type/quota validation, subscriber snapshot, handler
//! invocation) lives in `system.rs`, which is the only place with a
//! consistent view of every other registry; this module only knows about
//! bytes and priorities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use abi::{EventTypeId, Priority, ServiceId, MAX_SLOT_BYTES};

/// A queued event: header fields plus a fixed-capacity payload buffer.
#[derive(Clone)]
pub struct EventSlot {
    pub event_type: EventTypeId,
    pub priority: Priority,
    pub sender: ServiceId,
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub len: usize,
    pub data: [u8; MAX_SLOT_BYTES],
}

impl EventSlot {
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

pub enum EnqueueOutcome {
    Enqueued,
    /// Only ever returned for `Priority::Low`: the back-pressure tier
    /// silently drops instead of rejecting the caller.
    DroppedLowPriority,
    QueueFull,
}

struct Tiers {
    high: VecDeque<EventSlot>,
    normal: VecDeque<EventSlot>,
    low: VecDeque<EventSlot>,
    shutdown: bool,
}

pub struct EventQueues {
    cap: usize,
    inner: Mutex<Tiers>,
    not_empty: Condvar,
    sequence: AtomicU64,
}

impl EventQueues {
    pub fn new(cap_per_tier: usize) -> Self {
        EventQueues {
            cap: cap_per_tier,
            inner: Mutex::new(Tiers {
                high: VecDeque::with_capacity(cap_per_tier),
                normal: VecDeque::with_capacity(cap_per_tier),
                low: VecDeque::with_capacity(cap_per_tier),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueues `slot` into the tier matching its priority. Never blocks --
    /// a full NORMAL/HIGH queue returns `QueueFull` immediately (see
    /// section 5: "no blocking publishers").
    pub fn enqueue(&self, slot: EventSlot) -> EnqueueOutcome {
        let mut tiers = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let queue = match slot.priority {
            Priority::High => &mut tiers.high,
            Priority::Normal => &mut tiers.normal,
            Priority::Low => &mut tiers.low,
            Priority::Critical => unreachable!("critical events bypass the queue"),
        };
        if queue.len() >= self.cap {
            return match slot.priority {
                Priority::Low => EnqueueOutcome::DroppedLowPriority,
                _ => EnqueueOutcome::QueueFull,
            };
        }
        queue.push_back(slot);
        self.not_empty.notify_one();
        EnqueueOutcome::Enqueued
    }

    pub fn depths(&self) -> (usize, usize, usize) {
        let tiers = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        (tiers.high.len(), tiers.normal.len(), tiers.low.len())
    }

    /// Strict-priority pop: HIGH if non-empty, else NORMAL, else LOW.
    /// Blocks on the condition variable while every tier is empty and the
    /// bus hasn't been asked to shut down; wakes periodically to recheck
    /// shutdown even without a new enqueue.
    pub fn dequeue_blocking(&self) -> Option<EventSlot> {
        let mut tiers = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(slot) = tiers.high.pop_front() {
                return Some(slot);
            }
            if let Some(slot) = tiers.normal.pop_front() {
                return Some(slot);
            }
            if let Some(slot) = tiers.low.pop_front() {
                return Some(slot);
            }
            if tiers.shutdown {
                return None;
            }
            let (guard, _timeout) = self
                .not_empty
                .wait_timeout(tiers, Duration::from_millis(100))
                .unwrap_or_else(|e| e.into_inner());
            tiers = guard;
        }
    }

    pub fn shutdown(&self) {
        let mut tiers = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        tiers.shutdown = true;
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(priority: Priority, seq: u64) -> EventSlot {
        EventSlot {
            event_type: EventTypeId(0),
            priority,
            sender: ServiceId(0),
            sequence: seq,
            timestamp_ms: 0,
            len: 0,
            data: [0u8; MAX_SLOT_BYTES],
        }
    }

    #[test]
    fn high_drains_before_normal_before_low() {
        let q = EventQueues::new(8);
        matches!(q.enqueue(slot(Priority::Low, 1)), EnqueueOutcome::Enqueued);
        matches!(q.enqueue(slot(Priority::Normal, 2)), EnqueueOutcome::Enqueued);
        matches!(q.enqueue(slot(Priority::High, 3)), EnqueueOutcome::Enqueued);

        assert_eq!(q.dequeue_blocking().unwrap().sequence, 3);
        assert_eq!(q.dequeue_blocking().unwrap().sequence, 2);
        assert_eq!(q.dequeue_blocking().unwrap().sequence, 1);
    }

    #[test]
    fn fifo_within_tier() {
        let q = EventQueues::new(8);
        for i in 1..=3 {
            q.enqueue(slot(Priority::Normal, i));
        }
        assert_eq!(q.dequeue_blocking().unwrap().sequence, 1);
        assert_eq!(q.dequeue_blocking().unwrap().sequence, 2);
        assert_eq!(q.dequeue_blocking().unwrap().sequence, 3);
    }

    #[test]
    fn normal_full_rejects_low_drops() {
        let q = EventQueues::new(2);
        assert!(matches!(q.enqueue(slot(Priority::Normal, 1)), EnqueueOutcome::Enqueued));
        assert!(matches!(q.enqueue(slot(Priority::Normal, 2)), EnqueueOutcome::Enqueued));
        assert!(matches!(q.enqueue(slot(Priority::Normal, 3)), EnqueueOutcome::QueueFull));

        assert!(matches!(q.enqueue(slot(Priority::Low, 4)), EnqueueOutcome::Enqueued));
        assert!(matches!(q.enqueue(slot(Priority::Low, 5)), EnqueueOutcome::Enqueued));
        assert!(matches!(q.enqueue(slot(Priority::Low, 6)), EnqueueOutcome::DroppedLowPriority));
    }

    #[test]
    fn shutdown_unblocks_dequeue() {
        let q = EventQueues::new(2);
        q.shutdown();
        assert!(q.dequeue_blocking().is_none());
    }
}

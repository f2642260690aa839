//! The in-flight event view handed to handlers, and the handler signature
//! shared by the subscription table (C4) and the bus dispatcher (C5).

use std::any::Any;
use std::sync::Arc;

use abi::{EventTypeId, Priority, ServiceId};

/// Opaque, subscriber-owned data passed back to a handler untouched. The
/// core never frees or inspects it.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// A subscriber's callback. Takes `&self` (not `&mut self`) so a snapshot
/// of subscribers can be invoked by the dispatcher without any lock held;
/// handlers that need mutable state should put it behind their own
/// `Mutex`/`Cell`; this mirrors the cooperative, non-reentrant-assumption
/// cooperative, non-reentrant contract the dispatcher assumes.
pub type Handler = Arc<dyn Fn(&EventView<'_>, &UserData) + Send + Sync>;

/// Read-only view of a dispatched event. Borrows its payload from the
/// queue slot (or, for CRITICAL events, from the caller's copy); handlers
/// must not retain it past return.
#[derive(Copy, Clone, Debug)]
pub struct EventView<'a> {
    pub event_type: EventTypeId,
    pub priority: Priority,
    pub sender: ServiceId,
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub payload: &'a [u8],
}

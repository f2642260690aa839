//! In-process service and event-bus runtime core.
//!
//! [`system::SystemCore`] is the entry point: construct one, `init` it to
//! mint a capability key, `start` it to launch the dispatcher thread, then
//! register services, event types, and subscriptions through its public
//! methods. The rest of the modules are the components it wires together
//! under one system mutex plus a separate event-queue lock -- see
//! `system.rs` for the lock-order rule.

pub mod bus;
pub mod deps;
pub mod event;
pub mod event_types;
pub mod metrics;
pub mod monitor;
pub mod quota;
pub mod registry;
pub mod subscriptions;
pub mod system;
pub mod watchdog;

pub use event::{EventView, Handler, UserData};
pub use registry::Context;
pub use system::{Stats, SystemCore};

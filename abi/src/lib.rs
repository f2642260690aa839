//! Shared ABI definitions for the service/event-bus runtime.
//!
//! This crate holds the types that cross the boundary between the
//! runtime core, the client facade, and dynamically loaded apps: ids,
//! lifecycle states, priorities, the error taxonomy, and the two
//! wire-stable headers (the versioned event payload header and the
//! on-storage app image header). Nothing in here allocates.

#![cfg_attr(not(test), allow(dead_code))]

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Sentinel event-type id meaning "no such type".
pub const INVALID_EVENT_TYPE: EventTypeId = EventTypeId(0xFFFF);

/// Compile-time capacity of a queue slot's payload buffer. `Limits`'s
/// `max_event_data_bytes` is a runtime-configurable ceiling *under* this;
/// the array itself has to be sized at compile time so the fast path in
/// "no heap activity" invariant holds literally.
pub const MAX_SLOT_BYTES: usize = 512;

/// Stable numeric id assigned to a service at `register` time.
///
/// Unique for the lifetime of the process; never reused while the owning
/// service is live. Analogous to the index half of an embedded kernel's
/// task id, but this runtime does not need a generation field because
/// services are never silently restarted behind an existing id -- a
/// restart goes through `unregister`/`register` and gets a fresh id.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ServiceId(pub u16);

impl ServiceId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable numeric id assigned to an interned event-type name.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct EventTypeId(pub u16);

impl EventTypeId {
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_EVENT_TYPE.0
    }
}

/// Delivery priority for a posted event.
///
/// Ordering matters: `Ord` is derived in declaration order, so
/// `Priority::Low < Priority::Critical` -- this lets the dispatcher pick
/// the numerically greatest pending tier with a plain comparison.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    /// Delivered synchronously on the posting thread; never queued.
    Critical,
}

/// Lifecycle state of a registered service.
///
/// See spec state diagram: `register` -> `Registered`, `set_state` walks
/// the rest, `unregister` tears down from any state back to
/// `Unregistered`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ServiceState {
    Unregistered,
    Registered,
    Running,
    Paused,
    Stopping,
    Error,
}

impl ServiceState {
    /// Whether `self -> next` is a legal transition per the state
    /// state diagram. `unregister` is handled
    /// separately by the registry, not through `set_state`.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Registered, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Running, Error)
                | (Paused, Error)
                | (Registered, Error)
                | (Error, Registered)
                | (Stopping, Registered)
        )
    }
}

/// Lifecycle state of an app as tracked by the app manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AppState {
    Loaded,
    Running,
    Paused,
    Stopped,
}

/// Where an app's code comes from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AppSource {
    Internal,
    Storage,
    Remote,
}

/// Opaque per-boot token minted by `init`, required by every admin call.
///
/// Compared by equality only.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CapabilityKey(pub u32);

/// First four bytes of an event payload, by convention: a version tag and
/// the declared total payload size. Consumers that care about schema
/// compatibility check `version`; a mismatch is diagnosed, not fatal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct PayloadHeader {
    pub version: u16,
    pub total_size: u16,
}

impl PayloadHeader {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Reads a header from the front of `payload`, if it's long enough.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let bytes = payload.get(..Self::SIZE)?;
        Some(Self {
            version: u16::from_le_bytes([bytes[0], bytes[1]]),
            total_size: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Magic value at the start of an on-storage app image header, spelling
/// `APPK` in ASCII (the kraken-os lineage's app-package magic).
pub const APP_IMAGE_MAGIC: u32 = 0x4150_504B;

/// Header prefixing an app binary image on storage or fetched from a
/// remote URL.
#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct AppImageHeader {
    pub magic: u32,
    pub name: [u8; 32],
    pub version: [u8; 16],
    pub author: [u8; 32],
    pub size: u32,
    pub entry_offset: u32,
    pub crc32: u32,
}

impl AppImageHeader {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn is_magic_valid(&self) -> bool {
        self.magic == APP_IMAGE_MAGIC
    }

    /// Reads a header from the front of `bytes`, if it's long enough.
    /// Parsed by hand rather than through a zerocopy cast so the layout
    /// stays obviously byte-for-byte with the wire description in
    /// wire description, independent of repr(C) padding assumptions.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let b = bytes.get(..Self::SIZE)?;
        let mut name = [0u8; 32];
        let mut version = [0u8; 16];
        let mut author = [0u8; 32];
        let mut off = 4;
        name.copy_from_slice(&b[off..off + 32]);
        off += 32;
        version.copy_from_slice(&b[off..off + 16]);
        off += 16;
        author.copy_from_slice(&b[off..off + 32]);
        off += 32;
        let size = u32::from_le_bytes(b[off..off + 4].try_into().ok()?);
        off += 4;
        let entry_offset = u32::from_le_bytes(b[off..off + 4].try_into().ok()?);
        off += 4;
        let crc32 = u32::from_le_bytes(b[off..off + 4].try_into().ok()?);
        Some(AppImageHeader {
            magic: u32::from_le_bytes(b[0..4].try_into().ok()?),
            name,
            version,
            author,
            size,
            entry_offset,
            crc32,
        })
    }
}

/// Runtime-configurable limits, given to `SystemCore::init`.
///
/// The teacher bakes its equivalents into `build.rs`-generated tables
/// because a firmware image only ever runs on one device; this crate is
/// a reusable library, so the same caps become constructor arguments.
/// `Default` reproduces the baseline configuration table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Limits {
    pub max_services: usize,
    pub max_event_types: usize,
    pub max_subscribers: usize,
    pub max_event_data_bytes: usize,
    pub queue_slots_per_tier: usize,
    pub handler_warn_threshold_ms: u64,
    pub handler_timeout_ms: u64,
    pub lock_wait_timeout_ms: u64,
    pub max_apps: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_services: 16,
            max_event_types: 64,
            max_subscribers: 32,
            max_event_data_bytes: 512,
            queue_slots_per_tier: 32,
            handler_warn_threshold_ms: 50,
            handler_timeout_ms: 0,
            lock_wait_timeout_ms: 100,
            max_apps: 16,
        }
    }
}

/// Per-service quota limits, independently configurable per service.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QuotaLimits {
    pub max_events_per_sec: u32,
    pub max_subscriptions: usize,
    pub max_event_data_size: usize,
    pub max_memory_bytes: usize,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        QuotaLimits {
            max_events_per_sec: 1000,
            max_subscriptions: 32,
            max_event_data_size: 512,
            max_memory_bytes: 64 * 1024,
        }
    }
}

/// Watchdog configuration for a single service.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WatchdogConfig {
    pub timeout_ms: u64,
    pub auto_restart: bool,
    /// `0` means unlimited restart attempts.
    pub max_restart_attempts: u32,
    pub is_critical: bool,
}

/// The complete error taxonomy for the runtime. `#[repr(u32)]` so it
/// travels across the capability-table boundary the way an embedded
/// kernel's `*-api` crates return error codes from IPC calls.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum CoreError {
    // Capability
    InvalidKey = 1,
    KeyRequired,
    KeyInvalidated,

    // Lifecycle
    NotInitialized,
    AlreadyInitialized,
    NotStarted,
    AlreadyStarted,
    MutexTimeout,

    // Service
    NotFound,
    RegistryFull,
    AlreadyRegistered,
    InvalidState,
    DependencyFailed,
    CircularDependency,
    WatchdogTimeout,
    RestartFailed,
    Critical,

    // Event
    TypeNotFound,
    TypeRegistryFull,
    QueueFull,
    DataTooLarge,
    HandlerTimeout,
    SubscriptionFull,
    SubscriptionNotFound,
    VersionMismatch,
    InvalidArg,

    // Quota
    EventsExceeded,
    SubscriptionsExceeded,
    MemoryExceeded,
    DataSizeExceeded,

    // App
    AppNotFound,
    AppRegistryFull,
    AppAlreadyRegistered,
    AppContextInvalid,
    AppInvalidState,
    AppEntryFailed,
    AppExitFailed,
    AppInvalidManifest,

    // Memory
    PoolExhausted,
    ExternalAllocFailed,
    FragmentationHigh,
}

impl core::fmt::Display for CoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-capacity ring buffer for recording diagnostic events without
//! allocating on the recording path.
//!
//! This is a std-hosted descendant of an embedded no_std ring buffer
//! (which backs its entries with a `static` and inspects them post-mortem
//! via the `humility` debugger). We don't have a debugger attachment point
//! here, so a ring buffer is just a `Mutex`-protected fixed array that the
//! owning module can drain for logging or testing; the contract that
//! matters -- bounded capacity, newest-overwrites-oldest, no per-entry heap
//! allocation -- is preserved.
//!
//! ```
//! ringbuf::ringbuf!(EVENTS, u32, 16, 0);
//! ringbuf::ringbuf_entry!(EVENTS, 42);
//! assert_eq!(EVENTS.snapshot()[0], 42);
//! ```

use std::sync::Mutex;

/// A fixed-capacity, overwrite-oldest ring buffer of `T`.
pub struct Ringbuf<T: Copy, const N: usize> {
    inner: Mutex<RingbufInner<T, N>>,
}

struct RingbufInner<T: Copy, const N: usize> {
    buffer: [T; N],
    next: usize,
    len: usize,
}

impl<T: Copy, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Ringbuf {
            inner: Mutex::new(RingbufInner {
                buffer: [init; N],
                next: 0,
                len: 0,
            }),
        }
    }

    /// Records `entry`, overwriting the oldest slot once the buffer is full.
    pub fn entry(&self, entry: T) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let next = inner.next;
        inner.buffer[next] = entry;
        inner.next = (next + 1) % N;
        inner.len = (inner.len + 1).min(N);
    }

    /// Returns the recorded entries, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(inner.len);
        let start = if inner.len == N { inner.next } else { 0 };
        for i in 0..inner.len {
            out.push(inner.buffer[(start + i) % N]);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Declares a named, statically-allocated ring buffer.
///
/// `ringbuf!(NAME, Type, capacity, initial_value)`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        static $name: $crate::Ringbuf<$t, $n> = $crate::Ringbuf::new($init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Records an entry into a ring buffer declared with [`ringbuf!`].
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($name:ident, $val:expr) => {
        $name.entry($val)
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($name:ident, $val:expr) => {
        let _ = $val;
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    ringbuf!(TEST_RB, u32, 4, 0);

    #[test]
    fn wraps_and_overwrites_oldest() {
        for i in 1..=6u32 {
            ringbuf_entry!(TEST_RB, i);
        }
        assert_eq!(TEST_RB.snapshot(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn empty_until_recorded() {
        ringbuf!(EMPTY_RB, u32, 4, 0);
        assert!(EMPTY_RB.is_empty());
        ringbuf_entry!(EMPTY_RB, 1);
        assert!(!EMPTY_RB.is_empty());
    }
}

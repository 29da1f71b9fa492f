//! Pending call table.
//!
//! One table per connection, keyed by [`CallId`]. An entry is a boxed
//! continuation that resolves the caller's future; it is taken out of the
//! table exactly once, by whichever of these wins:
//!
//! - a response arrives with the matching key
//! - the call timer fires (when call timeouts are configured)
//! - nothing, if the connection tears down first
//!
//! On teardown entries are *discarded*, never invoked. Once the transport is
//! gone there is no trustworthy answer to deliver, and a fabricated error
//! would be indistinguishable from a real remote failure.

use std::collections::HashMap;

use crate::error::CallError;
use crate::types::CallId;

/// Resolves one caller's future with the call outcome.
pub(crate) type Continuation<P> = Box<dyn FnOnce(Result<P, CallError>)>;

/// Calls awaiting a response, keyed by correlation key.
pub(crate) struct PendingCalls<P> {
    entries: HashMap<CallId, Continuation<P>>,
}

impl<P> PendingCalls<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Whether `key` currently owns a live entry.
    pub(crate) fn contains(&self, key: &CallId) -> bool {
        self.entries.contains_key(key)
    }

    /// Register a continuation under a fresh key.
    ///
    /// The caller guarantees freshness by re-drawing keys until
    /// [`contains`](Self::contains) is false.
    pub(crate) fn insert(&mut self, key: CallId, continuation: Continuation<P>) {
        let previous = self.entries.insert(key, continuation);
        debug_assert!(previous.is_none(), "correlation key reused: {key}");
    }

    /// Take the continuation for `key`, if a call is still waiting on it.
    pub(crate) fn remove(&mut self, key: &CallId) -> Option<Continuation<P>> {
        self.entries.remove(key)
    }

    /// Drop every entry without invoking anything. Returns how many were
    /// discarded.
    pub(crate) fn discard_all(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

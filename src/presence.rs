//! Presence table: the authoritative map of identifier to attachment status.
//!
//! One mutex covers the map and the subscriber reference, so every operation
//! is atomic with respect to the hotplug monitor and caller threads. The
//! subscriber callback is always invoked after the lock has been released;
//! a subscriber may call back into [`PresenceTable`] (or a facade built on
//! it) without deadlocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Attachment status delivered to subscribers.
///
/// A removed device is deleted from the table rather than stored as
/// `NotPresent`; the variant only ever appears in notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceStatus {
    Present,
    NotPresent,
}

/// Callback sink receiving `(identifier, status)` notifications.
pub type PresenceSink = Arc<dyn Fn(&str, PresenceStatus) + Send + Sync>;

#[derive(Default)]
struct TableInner {
    entries: HashMap<String, PresenceStatus>,
    sink: Option<PresenceSink>,
}

#[derive(Default)]
pub struct PresenceTable {
    inner: Mutex<TableInner>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subscriber. A non-empty sink has no memory of the past and
    /// needs a consistent starting view, so every entry present at the moment
    /// of subscription is delivered exactly once before this returns.
    pub fn set_subscriber(&self, sink: Option<PresenceSink>) {
        let replay: Vec<(String, PresenceStatus)> = {
            let mut inner = self.lock();
            inner.sink = sink.clone();
            match &sink {
                Some(_) => inner
                    .entries
                    .iter()
                    .map(|(id, status)| (id.clone(), *status))
                    .collect(),
                None => Vec::new(),
            }
        };
        if let Some(sink) = sink {
            for (identifier, status) in replay {
                sink(&identifier, status);
            }
        }
    }

    /// Insert or overwrite an entry as present and notify the subscriber.
    pub fn mark_present(&self, identifier: &str) {
        let sink = {
            let mut inner = self.lock();
            inner
                .entries
                .insert(identifier.to_string(), PresenceStatus::Present);
            inner.sink.clone()
        };
        if let Some(sink) = sink {
            sink(identifier, PresenceStatus::Present);
        }
    }

    /// Delete an entry and notify the subscriber. Removing an identifier that
    /// was never added is a benign race with device-node churn: logged, no
    /// callback, no error.
    pub fn mark_absent(&self, identifier: &str) {
        let sink = {
            let mut inner = self.lock();
            if inner.entries.remove(identifier).is_none() {
                log::warn!("cannot find device to remove: {}", identifier);
                return;
            }
            inner.sink.clone()
        };
        if let Some(sink) = sink {
            sink(identifier, PresenceStatus::NotPresent);
        }
    }

    /// Whether the identifier is currently recorded as present.
    pub fn is_present(&self, identifier: &str) -> bool {
        matches!(
            self.lock().entries.get(identifier),
            Some(PresenceStatus::Present)
        )
    }

    /// Sorted snapshot of all known identifiers, for diagnostics.
    pub fn snapshot_identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.lock().entries.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TableInner> {
        self.inner.lock().expect("presence table lock poisoned")
    }
}

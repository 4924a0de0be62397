//! SharedStateRegistry - per-key subscribers and the local dispatcher
//!
//! The registry maps each [`SharedKey`] to the subscribers currently bound to
//! it. Entries are created by the first subscription and removed with the
//! last one; a later subscription on the same key starts from its own
//! initial value.
//!
//! # Strategies
//!
//! A registry runs one [`SyncStrategy`], fixed at construction:
//!
//! - **Broadcast**: each entry keeps the latest resolved value; every
//!   subscriber receives a plain copy. Updater functions are resolved once
//!   per dispatch and the result is shared.
//! - **Reconciled**: each entry owns one canonical [`TrackedValue`] shared
//!   by every binding. Writes through the tracked accessors notify all
//!   subscribers and go to the host; dispatched values are merged in place
//!   so nested handles survive.
//!
//! Under both, concurrent writes resolve as last-applied-wins on the single
//! UI thread.
//!
//! # Echo suppression
//!
//! Only [`Origin::Local`] changes are forwarded to the host. Values applied
//! from the host go through [`SharedStateRegistry::apply_remote`], which
//! notifies subscribers and never sends.
//!
//! # Re-entrancy
//!
//! No internal borrow is held while subscriber callbacks or updater
//! functions run, so they may subscribe, unsubscribe or dispatch again.
//! Subscribers are snapshotted before notification. A nested dispatch on the
//! same key supersedes the outer one: the outer pass stops notifying and
//! does not send its now-stale value.

use super::tracked::{wrap, ChangeFn, Slot, TrackedValue};
use super::types::{Origin, SharedKey, Subscriber, SubscriberId, Update};
use crate::bridge::HostBridgeAdapter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace, warn};

/// How a registry reconciles values shared under one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Plain per-subscriber copies, broadcast on every change
    #[default]
    Broadcast,
    /// One tracked object per key, merged in place
    Reconciled,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStrategy::Broadcast => write!(f, "broadcast"),
            SyncStrategy::Reconciled => write!(f, "reconciled"),
        }
    }
}

enum EntryState {
    Broadcast { current: Value },
    Reconciled {
        root: Slot,
        /// Last value handed to subscribers and the host
        published: Value,
    },
}

impl EntryState {
    fn snapshot(&self) -> Value {
        match self {
            EntryState::Broadcast { current } => current.clone(),
            EntryState::Reconciled { root, .. } => root.snapshot(),
        }
    }
}

struct Entry {
    subscribers: Vec<(SubscriberId, Subscriber)>,
    state: EntryState,
    /// Bumped on every applied change
    version: u64,
}

struct RegistryInner {
    strategy: SyncStrategy,
    entries: RefCell<HashMap<SharedKey, Entry>>,
    adapter: HostBridgeAdapter,
    next_subscriber: Cell<u64>,
    disposed: Cell<bool>,
}

/// Registry of shared state entries, keyed by [`SharedKey`]
///
/// Cheap to clone; clones share the same entries. Not thread-safe: the
/// registry lives on the UI thread.
#[derive(Clone)]
pub struct SharedStateRegistry {
    inner: Rc<RegistryInner>,
}

impl SharedStateRegistry {
    /// Create an empty registry sending local changes through `adapter`
    pub fn create(strategy: SyncStrategy, adapter: HostBridgeAdapter) -> Self {
        info!(%strategy, host_attached = adapter.is_attached(), "Shared state registry created");
        Self {
            inner: Rc::new(RegistryInner {
                strategy,
                entries: RefCell::new(HashMap::new()),
                adapter,
                next_subscriber: Cell::new(1),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Drop every entry; later subscribes and dispatches are ignored
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let entries: Vec<_> = self.inner.entries.borrow_mut().drain().collect();
        info!(entries = entries.len(), "Shared state registry disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.inner.strategy
    }

    pub fn adapter(&self) -> &HostBridgeAdapter {
        &self.inner.adapter
    }

    /// Keys that currently have at least one subscriber
    pub fn keys(&self) -> Vec<SharedKey> {
        let mut keys: Vec<_> = self.inner.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains_key(&self, key: &SharedKey) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    pub fn subscriber_count(&self, key: &SharedKey) -> usize {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map(|entry| entry.subscribers.len())
            .unwrap_or(0)
    }

    /// Current value under `key`, if anyone is subscribed to it
    pub fn current(&self, key: &SharedKey) -> Option<Value> {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map(|entry| entry.state.snapshot())
    }

    /// Canonical tracked value under `key` (reconciled registries only)
    ///
    /// `None` for broadcast registries, unknown keys, and scalar values.
    pub fn tracked(&self, key: &SharedKey) -> Option<TrackedValue> {
        match &self.inner.entries.borrow().get(key)?.state {
            EntryState::Reconciled { root, .. } => root.as_tracked().cloned(),
            EntryState::Broadcast { .. } => None,
        }
    }

    /// Register `subscriber` under `key`
    ///
    /// The entry is created from `initial` when absent; an existing entry
    /// keeps its value. Dropping the returned [`Subscription`] deregisters.
    pub fn subscribe(
        &self,
        key: &SharedKey,
        initial: Value,
        subscriber: Subscriber,
    ) -> Subscription {
        let id = SubscriberId(self.inner.next_subscriber.get());
        self.inner.next_subscriber.set(id.0 + 1);

        if self.is_disposed() {
            warn!(key = %key, "Subscribe on disposed registry ignored");
            return Subscription::inert(key.clone(), id);
        }

        let state = if self.contains_key(key) {
            None
        } else {
            Some(self.initial_state(key, initial))
        };

        let mut entries = self.inner.entries.borrow_mut();
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "Created registry entry");
            Entry {
                subscribers: Vec::new(),
                state: state.unwrap_or(EntryState::Broadcast {
                    current: Value::Null,
                }),
                version: 0,
            }
        });
        entry.subscribers.push((id, subscriber));
        debug!(key = %key, subscriber = %id, count = entry.subscribers.len(), "Subscriber added");

        Subscription {
            registry: Rc::downgrade(&self.inner),
            key: key.clone(),
            id,
            active: true,
        }
    }

    fn initial_state(&self, key: &SharedKey, initial: Value) -> EntryState {
        match self.inner.strategy {
            SyncStrategy::Broadcast => EntryState::Broadcast { current: initial },
            SyncStrategy::Reconciled => {
                let root = wrap(initial, &self.change_hook(key));
                let published = root.snapshot();
                EntryState::Reconciled { root, published }
            }
        }
    }

    /// Remove one subscriber; the entry goes with its last subscriber
    pub fn unsubscribe(&self, key: &SharedKey, id: SubscriberId) -> bool {
        let removed = {
            let mut entries = self.inner.entries.borrow_mut();
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            let before = entry.subscribers.len();
            entry.subscribers.retain(|(existing, _)| *existing != id);
            let removed = entry.subscribers.len() != before;
            if entry.subscribers.is_empty() {
                entries.remove(key);
                debug!(key = %key, "Removed empty registry entry");
            }
            removed
        };
        if removed {
            debug!(key = %key, subscriber = %id, "Subscriber removed");
        }
        removed
    }

    /// Apply a local write and forward it to the host
    ///
    /// Returns the resulting value, or `None` when nobody is subscribed to
    /// `key` (nothing is applied or sent then).
    pub fn dispatch(&self, key: &SharedKey, update: impl Into<Update>) -> Option<Value> {
        self.dispatch_from(key, update.into(), Origin::Local)
    }

    /// Apply a value received from the host without echoing it back
    pub fn apply_remote(&self, key: &SharedKey, value: Value) -> Option<Value> {
        self.dispatch_from(key, Update::Replace(value), Origin::Host)
    }

    fn dispatch_from(&self, key: &SharedKey, update: Update, origin: Origin) -> Option<Value> {
        if self.is_disposed() {
            warn!(key = %key, %origin, "Dispatch on disposed registry ignored");
            return None;
        }

        let Some(previous) = self.current(key) else {
            debug!(key = %key, %origin, "No subscribers for key, update dropped");
            return None;
        };

        // Updater functions run with no borrow held
        let next = update.resolve(&previous);
        if next == previous {
            trace!(key = %key, %origin, "Value unchanged, skipping dispatch");
            return Some(next);
        }

        let (value, version, subscribers) = {
            let mut entries = self.inner.entries.borrow_mut();
            let entry = entries.get_mut(key)?;
            let value = match &mut entry.state {
                EntryState::Broadcast { current } => {
                    *current = next;
                    current.clone()
                }
                EntryState::Reconciled { root, published } => {
                    let merged = match root {
                        Slot::Tracked(tracked) => tracked.reconcile(&next) || tracked.eq_value(&next),
                        Slot::Raw(_) => false,
                    };
                    if !merged {
                        *root = wrap(next, &self.change_hook(key));
                    }
                    *published = root.snapshot();
                    published.clone()
                }
            };
            entry.version += 1;
            (value, entry.version, entry.subscribers.clone())
        };

        debug!(key = %key, %origin, subscribers = subscribers.len(), "Dispatching state update");
        if !self.notify(key, version, &value, &subscribers) {
            return Some(value);
        }

        if origin == Origin::Local {
            self.inner.adapter.send_update(key, &value);
        }
        Some(value)
    }

    /// Call every subscriber; false if a nested dispatch superseded `version`
    fn notify(
        &self,
        key: &SharedKey,
        version: u64,
        value: &Value,
        subscribers: &[(SubscriberId, Subscriber)],
    ) -> bool {
        for (id, subscriber) in subscribers {
            if self.version_of(key).is_some_and(|current| current != version) {
                debug!(key = %key, subscriber = %id, "Dispatch superseded by a newer update");
                return false;
            }
            subscriber(value);
        }
        self.version_of(key).map_or(true, |current| current == version)
    }

    fn version_of(&self, key: &SharedKey) -> Option<u64> {
        self.inner.entries.borrow().get(key).map(|entry| entry.version)
    }

    /// Change callback installed on a key's tracked root
    fn change_hook(&self, key: &SharedKey) -> ChangeFn {
        let registry = Rc::downgrade(&self.inner);
        let key = key.clone();
        Rc::new(move || {
            if let Some(inner) = registry.upgrade() {
                SharedStateRegistry { inner }.publish_tracked(&key);
            }
        })
    }

    /// Notify and forward after an in-place write through tracked accessors
    fn publish_tracked(&self, key: &SharedKey) {
        let (value, version, subscribers) = {
            let mut entries = self.inner.entries.borrow_mut();
            let Some(entry) = entries.get_mut(key) else {
                trace!(key = %key, "Tracked write on detached key, not published");
                return;
            };
            let EntryState::Reconciled { root, published } = &mut entry.state else {
                return;
            };
            // Writes through handles cut off from the root leave it unchanged
            let value = root.snapshot();
            if value == *published {
                trace!(key = %key, "Tracked write did not change the root, not published");
                return;
            }
            *published = value.clone();
            entry.version += 1;
            (value, entry.version, entry.subscribers.clone())
        };

        debug!(key = %key, subscribers = subscribers.len(), "Publishing tracked mutation");
        if self.notify(key, version, &value, &subscribers) {
            self.inner.adapter.send_update(key, &value);
        }
    }
}

/// Registration handle; deregisters its subscriber when dropped
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    key: SharedKey,
    id: SubscriberId,
    active: bool,
}

impl Subscription {
    fn inert(key: SharedKey, id: SubscriberId) -> Self {
        Self {
            registry: Weak::new(),
            key,
            id,
            active: false,
        }
    }

    pub fn key(&self) -> &SharedKey {
        &self.key
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Deregister now instead of on drop
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            SharedStateRegistry { inner }.unsubscribe(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

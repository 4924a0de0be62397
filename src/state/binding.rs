//! UI-facing binding to one shared key
//!
//! A [`Binding`] is what a UI component holds: the latest value it has
//! observed, a setter, and a registration that goes away with the binding.

use super::registry::{SharedStateRegistry, Subscription};
use super::tracked::{Field, Slot, TrackedValue};
use super::types::{SharedKey, Subscriber, Update};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;

/// Cloneable write handle for one key
#[derive(Clone)]
pub struct Setter {
    registry: SharedStateRegistry,
    key: SharedKey,
}

impl Setter {
    /// Replace the value, or derive it with [`Update::with`]
    pub fn set(&self, update: impl Into<Update>) -> Option<Value> {
        self.registry.dispatch(&self.key, update)
    }

    pub fn key(&self) -> &SharedKey {
        &self.key
    }
}

/// A component's live view of one shared key
///
/// Registers on creation and deregisters on drop. The shared value itself
/// survives as long as another binding still holds the key.
pub struct Binding {
    key: SharedKey,
    registry: SharedStateRegistry,
    state: Rc<RefCell<Value>>,
    renders: Rc<Cell<u64>>,
    _subscription: Subscription,
}

impl Binding {
    /// Join (or create) the shared state under `key`
    pub fn attach(registry: &SharedStateRegistry, key: SharedKey, initial: Value) -> Self {
        Self::attach_with_render(registry, key, initial, |_| {})
    }

    /// Like [`attach`](Self::attach), calling `render` on every new value
    pub fn attach_with_render(
        registry: &SharedStateRegistry,
        key: SharedKey,
        initial: Value,
        render: impl Fn(&Value) + 'static,
    ) -> Self {
        let state = Rc::new(RefCell::new(initial.clone()));
        let renders = Rc::new(Cell::new(0));

        let subscriber: Subscriber = {
            let state = Rc::clone(&state);
            let renders = Rc::clone(&renders);
            Rc::new(move |value: &Value| {
                *state.borrow_mut() = value.clone();
                renders.set(renders.get() + 1);
                render(value);
            })
        };

        let subscription = registry.subscribe(&key, initial, subscriber);

        // A joined key keeps its existing value
        if let Some(current) = registry.current(&key) {
            *state.borrow_mut() = current;
        }
        debug!(key = %key, "Binding attached");

        Self {
            key,
            registry: registry.clone(),
            state,
            renders,
            _subscription: subscription,
        }
    }

    pub fn key(&self) -> &SharedKey {
        &self.key
    }

    /// Latest value observed by this binding
    pub fn value(&self) -> Value {
        self.state.borrow().clone()
    }

    /// Write through the dispatcher; every binding on the key observes it
    pub fn set(&self, update: impl Into<Update>) -> Option<Value> {
        self.registry.dispatch(&self.key, update)
    }

    pub fn setter(&self) -> Setter {
        Setter {
            registry: self.registry.clone(),
            key: self.key.clone(),
        }
    }

    /// Canonical tracked value, when the registry reconciles in place
    pub fn tracked(&self) -> Option<TrackedValue> {
        self.registry.tracked(&self.key)
    }

    /// Write one field of the tracked value
    ///
    /// Only meaningful under [`SyncStrategy::Reconciled`](super::SyncStrategy::Reconciled) with an object or
    /// array value; returns false otherwise.
    pub fn set_field(&self, field: impl Into<Field>, value: impl Into<Slot>) -> bool {
        match self.tracked() {
            Some(tracked) => tracked.set_field(field, value),
            None => {
                self.log_untracked();
                false
            }
        }
    }

    /// Write the field at a dotted path such as `items.0.qty`
    pub fn set_path(&self, path: &str, value: impl Into<Slot>) -> bool {
        match self.tracked() {
            Some(tracked) => tracked.set_path(&Field::parse_path(path), value),
            None => {
                self.log_untracked();
                false
            }
        }
    }

    pub fn delete_field(&self, field: impl Into<Field>) -> bool {
        match self.tracked() {
            Some(tracked) => tracked.delete_field(field),
            None => {
                self.log_untracked();
                false
            }
        }
    }

    /// How many times this binding has been handed a new value
    pub fn render_count(&self) -> u64 {
        self.renders.get()
    }

    /// Deregister now instead of on drop
    pub fn detach(self) {
        debug!(key = %self.key, "Binding detached");
    }

    fn log_untracked(&self) {
        debug!(
            key = %self.key,
            strategy = %self.registry.strategy(),
            "Field write ignored, value is not tracked"
        );
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("value", &*self.state.borrow())
            .finish()
    }
}

//! Shared state type definitions
//!
//! Defines the identity, origin and update types that flow between UI
//! bindings, the registry and the host bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Opaque identifier of one logical piece of shared state
///
/// Two bindings holding the same key observe and broadcast to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedKey(String);

impl SharedKey {
    /// Create a key from any string, used verbatim
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SharedKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for SharedKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Where a state change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// A write performed by the UI layer (forwarded to the host)
    Local,
    /// An update pushed by the native host (never forwarded back)
    Host,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Host => write!(f, "host"),
        }
    }
}

/// Identifier handed out for every registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Subscriber callback, receives every new value for its key
pub type Subscriber = Rc<dyn Fn(&Value)>;

/// A pending write: either a literal replacement or a function of the
/// previous value
///
/// The function form is resolved exactly once per dispatch, so every
/// subscriber converges on the same result even when the function is not
/// deterministic.
pub enum Update {
    /// Replace the current value
    Replace(Value),
    /// Derive the next value from the previous one
    With(Box<dyn FnOnce(&Value) -> Value>),
}

impl Update {
    /// Build an updater from a closure over the previous value
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&Value) -> Value + 'static,
    {
        Update::With(Box::new(f))
    }

    /// Resolve against the previous value
    pub fn resolve(self, previous: &Value) -> Value {
        match self {
            Update::Replace(value) => value,
            Update::With(f) => f(previous),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Replace(value)
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::With(_) => f.write_str("With(<fn>)"),
        }
    }
}

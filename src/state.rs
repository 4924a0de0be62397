//! State management module - shared state between UI bindings and the host
//!
//! This module provides the registry that tracks every shared key, the
//! bindings UI components hold, and the mutation-tracking container used to
//! observe in-place writes. Anti-echo is carried by [`Origin`]: only local
//! changes are forwarded to the host.

mod binding;
mod key;
mod registry;
mod tracked;
mod types;

pub use binding::{Binding, Setter};
pub use key::{IdGenerator, KeyResolver, SequentialIds, UuidGenerator};
pub use registry::{SharedStateRegistry, Subscription, SyncStrategy};
pub use tracked::{wrap, ChangeFn, Field, Slot, TrackedValue};
pub use types::{Origin, SharedKey, Subscriber, SubscriberId, Update};

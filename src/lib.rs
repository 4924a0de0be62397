//! State Reflector - shared state between an embedded web UI and its host
//!
//! UI code binds to shared keys through [`SyncBridge`]; every local write
//! reaches the other bindings on the key and is forwarded to the host, while
//! updates pushed by the host are applied locally without being echoed back.

pub mod bridge;
pub mod config;
pub mod error;
pub mod state;

pub use bridge::{BridgeListener, BridgeMessage, HostBridgeAdapter, HostChannel, SyncBridge};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use state::{Binding, SharedKey, SharedStateRegistry, SyncStrategy, TrackedValue, Update};

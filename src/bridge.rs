//! Host bridge module - message channel between the UI layer and the host
//!
//! This module owns the wire protocol, the outbound adapter, the inbound
//! listener and the host side of the channel. [`SyncBridge`] ties them to a
//! registry built from [`BridgeConfig`](crate::config::BridgeConfig).

mod adapter;
mod channel;
mod host;
mod listener;
mod protocol;
mod sync;


use crate::error::{BridgeError, Result};

pub use adapter::HostBridgeAdapter;
pub use channel::{HostEvent, MpscHostChannel, RecordingChannel};
pub use host::HostMirror;
pub use listener::{BridgeListener, InboundOutcome};
pub use protocol::{BridgeMessage, PING, UPDATE_FROM_NATIVE_TYPE, UPDATE_TYPE};
pub use sync::SyncBridge;

/// The host's message-passing primitive, as seen from the UI layer
///
/// Implementations must not block. Delivery is best effort: an `Err` is
/// logged by the caller and the message is dropped.
pub trait HostChannel {
    /// Post one serialized message to the host
    fn post_message(&self, message: &str) -> Result<()>;

    /// Invoke the host's liveness acknowledgment, if it exposes one
    fn ping(&self) -> Result<()> {
        Err(BridgeError::PingUnsupported)
    }
}

//! BridgeListener - inbound half of the host bridge
//!
//! Every message the host pushes goes through [`BridgeListener::handle_message`].
//! Host updates are applied with [`Origin::Host`](crate::state::Origin), so
//! they reach local subscribers without being sent back. Nothing here
//! returns an error to the UI: malformed input is logged and dropped.

use super::adapter::HostBridgeAdapter;
use super::protocol::BridgeMessage;
use crate::error::BridgeError;
use crate::state::{SharedKey, SharedStateRegistry};
use std::cell::Cell;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Liveness probe answered (or the host has no acknowledgment)
    PingAcknowledged,
    /// Host value applied to a bound key
    Applied,
    /// Host value for a key nobody is bound to
    Unbound,
    /// Well-formed but not addressed to the UI
    Ignored,
    /// Could not be parsed
    Malformed,
}

/// Inbound message handler, one per bridge
pub struct BridgeListener {
    registry: SharedStateRegistry,
    adapter: HostBridgeAdapter,
    handled: Cell<u64>,
}

impl BridgeListener {
    pub(crate) fn new(registry: SharedStateRegistry, adapter: HostBridgeAdapter) -> Self {
        Self {
            registry,
            adapter,
            handled: Cell::new(0),
        }
    }

    /// Number of messages processed so far
    pub fn handled_count(&self) -> u64 {
        self.handled.get()
    }

    /// Parse and route one raw message from the host
    pub fn handle_message(&self, raw: &str) -> InboundOutcome {
        self.handled.set(self.handled.get() + 1);

        match BridgeMessage::decode(raw) {
            Ok(BridgeMessage::Ping) => {
                if let Err(e) = self.adapter.acknowledge_ping() {
                    debug!(error = %e, "Liveness probe not acknowledged");
                }
                trace!("Answered host liveness probe");
                InboundOutcome::PingAcknowledged
            }
            Ok(BridgeMessage::UpdateFromNative { key, value }) => {
                let key = SharedKey::from(key);
                debug!(key = %key, value = %value, "📥 State update from host");
                match self.registry.apply_remote(&key, value) {
                    Some(_) => InboundOutcome::Applied,
                    None => InboundOutcome::Unbound,
                }
            }
            Ok(BridgeMessage::Update { key, .. }) => {
                debug!(key = %key, "Ignoring UI-bound update type on inbound channel");
                InboundOutcome::Ignored
            }
            Err(BridgeError::UnknownType(kind)) => {
                debug!(kind = %kind, "Ignoring unrecognized bridge message type");
                InboundOutcome::Ignored
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed bridge message");
                InboundOutcome::Malformed
            }
        }
    }

    /// Consume inbound messages until the sender side closes
    ///
    /// Runs on the UI thread (a `LocalSet` or a current-thread runtime);
    /// each message is handled to completion before the next is received.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<String>) {
        debug!("BridgeListener run loop started");

        while let Some(raw) = inbound.recv().await {
            trace!(raw = %raw, "Processing inbound message");
            self.handle_message(&raw);
        }

        info!(handled = self.handled.get(), "BridgeListener run loop ended");
    }
}

//! Host channel implementations
//!
//! [`MpscHostChannel`] forwards to a host task over a tokio channel;
//! [`RecordingChannel`] keeps everything in memory for tests and tooling.

use super::protocol::BridgeMessage;
use super::HostChannel;
use crate::error::{BridgeError, Result};
use std::cell::{Cell, RefCell};
use tokio::sync::mpsc;

/// What the UI layer hands to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A serialized bridge message
    Message(String),
    /// Liveness acknowledgment (no payload)
    Ping,
}

/// Host channel backed by an unbounded tokio channel
///
/// Posting never blocks; once the receiving host is gone every post fails
/// with [`BridgeError::ChannelUnavailable`].
#[derive(Debug, Clone)]
pub struct MpscHostChannel {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl MpscHostChannel {
    /// Create the channel and the receiver the host consumes
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostChannel for MpscHostChannel {
    fn post_message(&self, message: &str) -> Result<()> {
        self.tx
            .send(HostEvent::Message(message.to_string()))
            .map_err(|_| BridgeError::ChannelUnavailable)
    }

    fn ping(&self) -> Result<()> {
        self.tx
            .send(HostEvent::Ping)
            .map_err(|_| BridgeError::ChannelUnavailable)
    }
}

/// In-memory host channel that records every post
#[derive(Debug)]
pub struct RecordingChannel {
    messages: RefCell<Vec<String>>,
    pings: Cell<u64>,
    offline: Cell<bool>,
    ping_supported: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            messages: RefCell::new(Vec::new()),
            pings: Cell::new(0),
            offline: Cell::new(false),
            ping_supported: true,
        }
    }

    /// A host that exposes no liveness acknowledgment
    pub fn without_ping() -> Self {
        Self {
            ping_supported: false,
            ..Self::new()
        }
    }

    /// Make every subsequent post fail (or succeed again)
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Raw messages posted so far
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    /// Posted messages that decode as bridge messages
    pub fn decoded(&self) -> Vec<BridgeMessage> {
        self.messages
            .borrow()
            .iter()
            .filter_map(|raw| BridgeMessage::decode(raw).ok())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn ping_count(&self) -> u64 {
        self.pings.get()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
        self.pings.set(0);
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl HostChannel for RecordingChannel {
    fn post_message(&self, message: &str) -> Result<()> {
        if self.offline.get() {
            return Err(BridgeError::Send("recording channel is offline".to_string()));
        }
        self.messages.borrow_mut().push(message.to_string());
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        if !self.ping_supported {
            return Err(BridgeError::PingUnsupported);
        }
        if self.offline.get() {
            return Err(BridgeError::ChannelUnavailable);
        }
        self.pings.set(self.pings.get() + 1);
        Ok(())
    }
}

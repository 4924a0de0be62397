//! Outbound half of the host bridge
//!
//! Sends are fire-and-forget: a missing or failing host channel drops the
//! message with a log line and local state carries on regardless.

use super::protocol::BridgeMessage;
use super::HostChannel;
use crate::error::{BridgeError, Result};
use crate::state::SharedKey;
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct AdapterStats {
    sent: Cell<u64>,
    dropped: Cell<u64>,
}

/// Serializes state updates and posts them to the host
///
/// Clones share the channel and the counters.
#[derive(Clone)]
pub struct HostBridgeAdapter {
    channel: Option<Rc<dyn HostChannel>>,
    stats: Rc<AdapterStats>,
}

impl HostBridgeAdapter {
    /// Create an adapter over an optional host channel
    pub fn new(channel: Option<Rc<dyn HostChannel>>) -> Self {
        Self {
            channel,
            stats: Rc::new(AdapterStats::default()),
        }
    }

    /// Adapter with no host attached; every send is dropped
    pub fn detached() -> Self {
        Self::new(None)
    }

    pub fn is_attached(&self) -> bool {
        self.channel.is_some()
    }

    /// Number of updates handed to the host channel
    pub fn sent_count(&self) -> u64 {
        self.stats.sent.get()
    }

    /// Number of updates dropped because the host was missing or failed
    pub fn dropped_count(&self) -> u64 {
        self.stats.dropped.get()
    }

    /// Post `SHARED_STATE_UPDATE` for `key`
    ///
    /// Returns whether the channel accepted the message. Never blocks and
    /// never surfaces an error to the caller.
    pub fn send_update(&self, key: &SharedKey, value: &Value) -> bool {
        let Some(channel) = &self.channel else {
            debug!(key = %key, "No host channel, dropping state update");
            self.stats.dropped.set(self.stats.dropped.get() + 1);
            return false;
        };

        let delivered = BridgeMessage::update(key.as_str(), value.clone())
            .encode()
            .and_then(|message| channel.post_message(&message));

        match delivered {
            Ok(()) => {
                self.stats.sent.set(self.stats.sent.get() + 1);
                trace!(key = %key, value = %value, "📤 State update sent to host");
                true
            }
            Err(e) => {
                self.stats.dropped.set(self.stats.dropped.get() + 1);
                warn!(key = %key, error = %e, "Failed to send state update to host");
                false
            }
        }
    }

    /// Invoke the host's liveness acknowledgment
    pub fn acknowledge_ping(&self) -> Result<()> {
        match &self.channel {
            Some(channel) => channel.ping(),
            None => Err(BridgeError::ChannelUnavailable),
        }
    }
}

impl Default for HostBridgeAdapter {
    fn default() -> Self {
        Self::detached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RecordingChannel;
    use serde_json::json;

    #[test]
    fn test_detached_adapter_drops_silently() {
        let adapter = HostBridgeAdapter::detached();
        assert!(!adapter.send_update(&SharedKey::from("k"), &json!(1)));
        assert_eq!(adapter.dropped_count(), 1);
        assert!(matches!(
            adapter.acknowledge_ping(),
            Err(BridgeError::ChannelUnavailable)
        ));
    }

    #[test]
    fn test_send_update_posts_encoded_message() {
        let channel = Rc::new(RecordingChannel::new());
        let adapter = HostBridgeAdapter::new(Some(channel.clone()));

        assert!(adapter.send_update(&SharedKey::from("cart"), &json!({"items": []})));
        assert_eq!(adapter.sent_count(), 1);
        assert_eq!(
            channel.decoded(),
            vec![BridgeMessage::update("cart", json!({"items": []}))]
        );
    }

    #[test]
    fn test_offline_channel_counts_drop() {
        let channel = Rc::new(RecordingChannel::new());
        channel.set_offline(true);
        let adapter = HostBridgeAdapter::new(Some(channel.clone()));

        assert!(!adapter.send_update(&SharedKey::from("k"), &json!(1)));
        assert_eq!(adapter.sent_count(), 0);
        assert_eq!(adapter.dropped_count(), 1);
        assert!(channel.messages().is_empty());
    }

    #[test]
    fn test_clones_share_counters() {
        let channel = Rc::new(RecordingChannel::new());
        let adapter = HostBridgeAdapter::new(Some(channel));
        let clone = adapter.clone();

        clone.send_update(&SharedKey::from("k"), &json!(1));
        assert_eq!(adapter.sent_count(), 1);
    }
}

//! HostMirror - the native side of the bridge
//!
//! Receives what the UI layer posts, remembers the latest value per key and
//! pushes host-originated updates back to the UI.

use super::channel::HostEvent;
use super::protocol::{BridgeMessage, PING};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Callback invoked with every state update received from the UI
pub type UpdateListener = Box<dyn Fn(&str, &Value)>;

/// Host-side endpoint of the shared state protocol
pub struct HostMirror {
    to_ui: mpsc::UnboundedSender<String>,
    states: HashMap<String, Value>,
    on_update: Option<UpdateListener>,
    initialized: bool,
}

impl HostMirror {
    /// Create a mirror that delivers its messages to the UI through `to_ui`
    pub fn new(to_ui: mpsc::UnboundedSender<String>) -> Self {
        Self {
            to_ui,
            states: HashMap::new(),
            on_update: None,
            initialized: false,
        }
    }

    /// Register the callback for updates coming from the UI
    pub fn set_on_update(&mut self, listener: impl Fn(&str, &Value) + 'static) {
        self.on_update = Some(Box::new(listener));
    }

    /// Latest value the UI reported for `key`
    pub fn shared_state(&self, key: &str) -> Option<&Value> {
        self.states.get(key)
    }

    /// Whether the UI has acknowledged the channel
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Message(raw) => self.handle_ui_message(&raw),
            HostEvent::Ping => self.acknowledge_ping(),
        }
    }

    /// Process one message posted by the UI layer
    pub fn handle_ui_message(&mut self, raw: &str) {
        match BridgeMessage::decode(raw) {
            Ok(BridgeMessage::Update { key, value }) => {
                debug!(key = %key, value = %value, "📥 State update from UI");
                if let Some(listener) = &self.on_update {
                    listener(&key, &value);
                }
                self.states.insert(key, value);
            }
            Ok(other) => {
                debug!(kind = ?other.kind(), "Ignoring message not addressed to the host");
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse message from UI");
            }
        }
    }

    /// Push a value to the UI as a host-originated update
    pub fn send_state(&mut self, key: &str, value: Value) -> bool {
        let encoded = match BridgeMessage::from_native(key, value.clone()).encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode state for UI");
                return false;
            }
        };
        self.states.insert(key.to_string(), value);

        if self.to_ui.send(encoded).is_err() {
            warn!(key = %key, "UI channel closed, state not delivered");
            return false;
        }
        debug!(key = %key, "📤 State pushed to UI");
        true
    }

    /// Ask the UI to confirm the channel
    pub fn request_ping(&self) -> bool {
        self.to_ui.send(PING.to_string()).is_ok()
    }

    /// The UI confirmed the channel is connected
    pub fn acknowledge_ping(&mut self) {
        if !self.initialized {
            info!("UI bridge connected (ping received)");
        }
        self.initialized = true;
    }

    /// Drain events from the UI until its channel closes
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HostEvent>) -> Self {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!(keys = self.states.len(), "HostMirror event loop ended");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_ui_update_is_stored_and_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut host = HostMirror::new(tx);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        host.set_on_update(move |key, value| sink.borrow_mut().push((key.to_string(), value.clone())));

        host.handle_ui_message(r#"{"type":"SHARED_STATE_UPDATE","key":"cart","value":{"items":["x"]}}"#);
        host.handle_ui_message("not json");
        host.handle_ui_message(r#"{"type":"SHARED_STATE_UPDATE_FROM_NATIVE","key":"cart","value":1}"#);

        assert_eq!(host.shared_state("cart"), Some(&json!({"items": ["x"]})));
        assert_eq!(*seen.borrow(), vec![("cart".to_string(), json!({"items": ["x"]}))]);
    }

    #[test]
    fn test_send_state_pushes_from_native() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = HostMirror::new(tx);

        assert!(host.send_state("counter", json!({"n": 1})));
        assert!(host.request_ping());

        let sent = rx.try_recv().unwrap();
        assert_eq!(
            BridgeMessage::decode(&sent).unwrap(),
            BridgeMessage::from_native("counter", json!({"n": 1}))
        );
        assert_eq!(rx.try_recv().unwrap(), "PING");
        assert_eq!(host.shared_state("counter"), Some(&json!({"n": 1})));
    }

    #[test]
    fn test_ping_marks_initialized() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut host = HostMirror::new(tx);
        assert!(!host.is_initialized());
        host.handle_event(HostEvent::Ping);
        assert!(host.is_initialized());
    }

    #[test]
    fn test_send_state_to_closed_ui() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut host = HostMirror::new(tx);
        assert!(!host.send_state("k", json!(1)));
    }
}

//! SyncBridge - one registry, one host channel, one listener
//!
//! Explicitly constructed and disposed; several bridges can live side by side
//! in one process without sharing any state.

use super::adapter::HostBridgeAdapter;
use super::listener::BridgeListener;
use super::HostChannel;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::state::{Binding, IdGenerator, KeyResolver, SharedStateRegistry};
use serde_json::Value;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Entry point for UI code: creates bindings and the inbound listener
pub struct SyncBridge {
    config: BridgeConfig,
    registry: SharedStateRegistry,
    adapter: HostBridgeAdapter,
    keys: KeyResolver,
    listener_installed: Cell<bool>,
}

impl SyncBridge {
    /// Create a bridge over an optional host channel
    ///
    /// Without a channel, bindings still work locally and every outbound
    /// update is dropped.
    pub fn create(config: BridgeConfig, channel: Option<Rc<dyn HostChannel>>) -> Self {
        let adapter = HostBridgeAdapter::new(channel);
        let registry = SharedStateRegistry::create(config.strategy, adapter.clone());
        info!(strategy = %config.strategy, seeds = config.seed.len(), "Sync bridge created");

        Self {
            config,
            registry,
            adapter,
            keys: KeyResolver::default(),
            listener_installed: Cell::new(false),
        }
    }

    /// Use `ids` for anonymous keys instead of random UUIDs
    pub fn with_id_generator(mut self, ids: Rc<dyn IdGenerator>) -> Self {
        self.keys = KeyResolver::new(ids);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedStateRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &HostBridgeAdapter {
        &self.adapter
    }

    /// Bind to shared state
    ///
    /// With a key, the binding joins whatever state already exists under it.
    /// Without one, a private key is generated. A missing initial value
    /// starts as `null`.
    pub fn bind(&self, key: Option<&str>, initial: Option<Value>) -> Binding {
        self.bind_with_render(key, initial, |_| {})
    }

    /// Like [`bind`](Self::bind), calling `render` on every new value
    pub fn bind_with_render(
        &self,
        key: Option<&str>,
        initial: Option<Value>,
        render: impl Fn(&Value) + 'static,
    ) -> Binding {
        let key = self.keys.resolve(key);
        Binding::attach_with_render(&self.registry, key, initial.unwrap_or(Value::Null), render)
    }

    /// Create the bindings listed in the config's `seed` section
    pub fn bind_seeds(&self) -> Vec<Binding> {
        self.config
            .seed
            .iter()
            .map(|seed| self.bind(Some(&seed.key), Some(seed.initial.clone())))
            .collect()
    }

    /// Create the inbound listener; only the first call succeeds
    ///
    /// When `announce_on_install` is set, the host's liveness entry point is
    /// called once so it knows the UI side is connected.
    pub fn install_listener(&self) -> Result<BridgeListener> {
        if self.listener_installed.replace(true) {
            warn!("Bridge listener already installed");
            return Err(BridgeError::AlreadyInstalled);
        }

        if self.config.announce_on_install {
            if let Err(e) = self.adapter.acknowledge_ping() {
                debug!(error = %e, "Host not notified of listener install");
            }
        }

        info!("Bridge listener installed");
        Ok(BridgeListener::new(self.registry.clone(), self.adapter.clone()))
    }

    pub fn listener_installed(&self) -> bool {
        self.listener_installed.get()
    }

    /// Tear down the registry; bindings still held become inert
    pub fn dispose(&self) {
        self.registry.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RecordingChannel;
    use crate::config::SeedBinding;
    use crate::state::{SequentialIds, SyncStrategy};
    use serde_json::json;

    fn bridge(config: BridgeConfig) -> (SyncBridge, Rc<RecordingChannel>) {
        let channel = Rc::new(RecordingChannel::new());
        let bridge = SyncBridge::create(config, Some(channel.clone()))
            .with_id_generator(Rc::new(SequentialIds::new("anon")));
        (bridge, channel)
    }

    #[test]
    fn test_listener_installs_once() {
        let (bridge, channel) = bridge(BridgeConfig::default());

        assert!(bridge.install_listener().is_ok());
        assert!(matches!(
            bridge.install_listener(),
            Err(BridgeError::AlreadyInstalled)
        ));
        assert_eq!(channel.ping_count(), 1);
    }

    #[test]
    fn test_install_without_announce() {
        let config = BridgeConfig {
            announce_on_install: false,
            ..BridgeConfig::default()
        };
        let (bridge, channel) = bridge(config);
        bridge.install_listener().unwrap();
        assert_eq!(channel.ping_count(), 0);
    }

    #[test]
    fn test_anonymous_bindings_get_distinct_keys() {
        let (bridge, _) = bridge(BridgeConfig::default());
        let a = bridge.bind(None, Some(json!({"count": 0})));
        let b = bridge.bind(None, Some(json!({"count": 0})));

        assert_eq!(a.key().as_str(), "anon-1");
        assert_eq!(b.key().as_str(), "anon-2");
    }

    #[test]
    fn test_bind_defaults_to_null() {
        let (bridge, _) = bridge(BridgeConfig::default());
        assert_eq!(bridge.bind(Some("k"), None).value(), Value::Null);
    }

    #[test]
    fn test_bind_seeds() {
        let config = BridgeConfig {
            strategy: SyncStrategy::Reconciled,
            seed: vec![SeedBinding {
                key: "theme".to_string(),
                initial: json!({"mode": "dark"}),
            }],
            ..BridgeConfig::default()
        };
        let (bridge, _) = bridge(config);
        let seeds = bridge.bind_seeds();

        assert_eq!(seeds.len(), 1);
        assert!(seeds[0].tracked().is_some());
        assert_eq!(bridge.registry().keys()[0].as_str(), "theme");
    }

    #[test]
    fn test_bridge_without_host_still_works_locally() {
        let bridge = SyncBridge::create(BridgeConfig::default(), None);
        let a = bridge.bind(Some("k"), Some(json!(1)));
        let b = bridge.bind(Some("k"), Some(json!(1)));

        a.set(json!(2));
        assert_eq!(b.value(), json!(2));
        assert_eq!(bridge.adapter().dropped_count(), 1);
        assert!(bridge.install_listener().is_ok());
    }

    #[test]
    fn test_dispose() {
        let (bridge, channel) = bridge(BridgeConfig::default());
        let binding = bridge.bind(Some("k"), Some(json!(1)));
        bridge.dispose();

        assert_eq!(binding.set(json!(2)), None);
        assert_eq!(channel.sent_count(), 0);
        assert!(bridge.registry().is_disposed());
    }
}

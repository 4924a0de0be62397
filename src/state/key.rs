//! Key resolution for shared-state bindings
//!
//! An explicit key string is used verbatim so every binding naming it shares
//! state. Without one, a fresh unique key is generated and the binding's
//! state stays private.

use super::types::SharedKey;
use std::cell::Cell;
use std::rc::Rc;
use tracing::trace;

/// Source of fresh, globally unique strings for anonymous keys
pub trait IdGenerator {
    /// Produce a string never returned before by this generator
    fn generate(&self) -> String;
}

/// Random UUID v4 keys
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `prefix-N` keys, mostly useful in tests and tooling
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: Cell<u64>,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Cell::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.get();
        self.next.set(n + 1);
        format!("{}-{}", self.prefix, n)
    }
}

/// Resolves the key a binding holds for its whole lifetime
#[derive(Clone)]
pub struct KeyResolver {
    ids: Rc<dyn IdGenerator>,
}

impl KeyResolver {
    /// Create a resolver backed by the given generator
    pub fn new(ids: Rc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Resolve an optional explicit key
    ///
    /// Explicit keys are returned verbatim (the empty string included).
    /// The caller is expected to hold the result; resolving again for the
    /// same binding would generate a different anonymous key.
    pub fn resolve(&self, explicit: Option<&str>) -> SharedKey {
        match explicit {
            Some(key) => SharedKey::from(key),
            None => {
                let key = SharedKey::new(self.ids.generate());
                trace!(key = %key, "Generated anonymous shared key");
                key
            }
        }
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(Rc::new(UuidGenerator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_used_verbatim() {
        let resolver = KeyResolver::default();
        assert_eq!(resolver.resolve(Some("cart")).as_str(), "cart");
        assert_eq!(resolver.resolve(Some("")).as_str(), "");
    }

    #[test]
    fn test_anonymous_keys_are_distinct() {
        let resolver = KeyResolver::default();
        let a = resolver.resolve(None);
        let b = resolver.resolve(None);
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_sequential_ids() {
        let resolver = KeyResolver::new(Rc::new(SequentialIds::new("anon")));
        assert_eq!(resolver.resolve(None).as_str(), "anon-1");
        assert_eq!(resolver.resolve(Some("named")).as_str(), "named");
        assert_eq!(resolver.resolve(None).as_str(), "anon-2");
    }
}

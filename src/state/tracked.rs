//! Mutation-tracking container for nested shared values
//!
//! A [`TrackedValue`] wraps an object or array so that every write made
//! through its accessors, at any depth, invokes a change callback. Nested
//! containers are tracked lazily: reading a field whose content is a plain
//! object or array swaps it in place for a tracked wrapper sharing the same
//! callback.
//!
//! Whether a value is tracked is carried by the [`Slot`] sum type, so a
//! wrapper can never end up wrapped a second time.
//!
//! # Write rules
//!
//! | Current field     | New value        | Effect                                   |
//! |-------------------|------------------|------------------------------------------|
//! | any               | deep-equal       | no-op, no callback                       |
//! | tracked container | object or array  | updated in place, field by field         |
//! | anything else     | object or array  | replaced by a tracked wrapper            |
//! | anything          | scalar           | replaced                                 |
//!
//! The callback fires once per accessor call, never per nested field.
//! Values form a tree: assigning a wrapper into its own subtree is not
//! supported.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Change callback shared by a tracked root and all of its nested wrappers
pub type ChangeFn = Rc<dyn Fn()>;

/// Address of one field inside a tracked container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

impl Field {
    /// Parse a dotted path such as `items.0.name`
    ///
    /// All-digit segments become indices; empty segments are skipped.
    pub fn parse_path(path: &str) -> Vec<Field> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                segment
                    .parse::<usize>()
                    .map(Field::Index)
                    .unwrap_or_else(|_| Field::Key(segment.to_string()))
            })
            .collect()
    }

    fn to_key(&self) -> String {
        match self {
            Field::Key(key) => key.clone(),
            Field::Index(index) => index.to_string(),
        }
    }

    fn to_index(&self) -> Option<usize> {
        match self {
            Field::Key(key) => key.parse().ok(),
            Field::Index(index) => Some(*index),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Key(key) => f.write_str(key),
            Field::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Field {
    fn from(key: &str) -> Self {
        Field::Key(key.to_string())
    }
}

impl From<String> for Field {
    fn from(key: String) -> Self {
        Field::Key(key)
    }
}

impl From<usize> for Field {
    fn from(index: usize) -> Self {
        Field::Index(index)
    }
}

/// A field's content: plain data or a tracked container
#[derive(Clone)]
pub enum Slot {
    /// Untracked JSON; containers here are wrapped on first read
    Raw(Value),
    /// Shared container whose writes report to the root's callback
    Tracked(TrackedValue),
}

impl Slot {
    /// True once the content has been wrapped
    pub fn is_tracked(&self) -> bool {
        matches!(self, Slot::Tracked(_))
    }

    /// The tracked container, or `None` for raw content
    pub fn as_tracked(&self) -> Option<&TrackedValue> {
        match self {
            Slot::Tracked(tracked) => Some(tracked),
            Slot::Raw(_) => None,
        }
    }

    /// Deep copy of the content as plain JSON
    pub fn snapshot(&self) -> Value {
        match self {
            Slot::Raw(value) => value.clone(),
            Slot::Tracked(tracked) => tracked.snapshot(),
        }
    }

    /// Structural comparison against plain JSON
    pub fn eq_value(&self, other: &Value) -> bool {
        match self {
            Slot::Raw(value) => value == other,
            Slot::Tracked(tracked) => tracked.eq_value(other),
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Raw(value)
    }
}

impl From<TrackedValue> for Slot {
    fn from(tracked: TrackedValue) -> Self {
        Slot::Tracked(tracked)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            Slot::Tracked(tracked) => fmt::Debug::fmt(tracked, f),
        }
    }
}

/// Wrap a value so writes to it invoke `on_change`
///
/// Already-tracked values are returned unchanged. Scalars and `null` stay
/// raw, since they have no fields to intercept.
pub fn wrap(value: impl Into<Slot>, on_change: &ChangeFn) -> Slot {
    match value.into() {
        Slot::Raw(raw) => match Body::from_value(raw) {
            Ok(body) => Slot::Tracked(TrackedValue::from_body(body, on_change)),
            Err(scalar) => Slot::Raw(scalar),
        },
        tracked => tracked,
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

enum Body {
    Object(BTreeMap<String, Slot>),
    Array(Vec<Slot>),
}

impl Body {
    fn from_value(value: Value) -> Result<Body, Value> {
        match value {
            Value::Object(map) => Ok(Body::Object(
                map.into_iter().map(|(k, v)| (k, Slot::Raw(v))).collect(),
            )),
            Value::Array(items) => Ok(Body::Array(items.into_iter().map(Slot::Raw).collect())),
            scalar => Err(scalar),
        }
    }

    fn snapshot(&self) -> Value {
        match self {
            Body::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, slot)| (key.clone(), slot.snapshot()))
                    .collect(),
            ),
            Body::Array(items) => Value::Array(items.iter().map(Slot::snapshot).collect()),
        }
    }

    fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Body::Object(map), Value::Object(other)) => {
                map.len() == other.len()
                    && map
                        .iter()
                        .all(|(key, slot)| other.get(key).is_some_and(|v| slot.eq_value(v)))
            }
            (Body::Array(items), Value::Array(other)) => {
                items.len() == other.len()
                    && items.iter().zip(other).all(|(slot, v)| slot.eq_value(v))
            }
            _ => false,
        }
    }

    fn len(&self) -> usize {
        match self {
            Body::Object(map) => map.len(),
            Body::Array(items) => items.len(),
        }
    }

    fn get(&self, field: &Field) -> Option<&Slot> {
        match self {
            Body::Object(map) => map.get(&field.to_key()),
            Body::Array(items) => items.get(field.to_index()?),
        }
    }

    fn any_tracked(&self, mut pred: impl FnMut(&TrackedValue) -> bool) -> bool {
        match self {
            Body::Object(map) => map.values().filter_map(Slot::as_tracked).any(|t| pred(t)),
            Body::Array(items) => items.iter().filter_map(Slot::as_tracked).any(|t| pred(t)),
        }
    }

    fn slot_mut(&mut self, field: &Field) -> Option<&mut Slot> {
        match self {
            Body::Object(map) => map.get_mut(&field.to_key()),
            Body::Array(items) => items.get_mut(field.to_index()?),
        }
    }

    fn remove(&mut self, field: &Field) -> Option<Slot> {
        match self {
            Body::Object(map) => map.remove(&field.to_key()),
            Body::Array(items) => {
                let index = field.to_index()?;
                (index < items.len()).then(|| items.remove(index))
            }
        }
    }

    fn assign(
        &mut self,
        field: &Field,
        incoming: Slot,
        incoming_value: &Value,
        on_change: &ChangeFn,
    ) -> bool {
        match self {
            Body::Object(map) => {
                let key = field.to_key();
                match map.get_mut(&key) {
                    Some(current) => {
                        if current.eq_value(incoming_value) {
                            return false;
                        }
                        replace_slot(current, incoming, incoming_value, on_change);
                    }
                    None => {
                        map.insert(key, wrap(incoming, on_change));
                    }
                }
                true
            }
            Body::Array(items) => {
                let Some(index) = field.to_index() else {
                    trace!(field = %field, "Ignoring non-numeric field on tracked array");
                    return false;
                };
                match items.get_mut(index) {
                    Some(current) => {
                        if current.eq_value(incoming_value) {
                            return false;
                        }
                        replace_slot(current, incoming, incoming_value, on_change);
                    }
                    None => {
                        items.resize_with(index, || Slot::Raw(Value::Null));
                        items.push(wrap(incoming, on_change));
                    }
                }
                true
            }
        }
    }

    /// Bring this body to `value` in place, keeping nested wrappers alive
    fn reconcile(&mut self, value: &Value, on_change: &ChangeFn) -> bool {
        match (self, value) {
            (Body::Object(map), Value::Object(incoming)) => {
                let before = map.len();
                map.retain(|key, _| incoming.contains_key(key));
                let mut changed = map.len() != before;
                for (key, v) in incoming {
                    match map.get_mut(key) {
                        Some(current) => changed |= reconcile_slot(current, v, on_change),
                        None => {
                            map.insert(key.clone(), wrap(v.clone(), on_change));
                            changed = true;
                        }
                    }
                }
                changed
            }
            (Body::Array(items), Value::Array(incoming)) => {
                let mut changed = items.len() > incoming.len();
                items.truncate(incoming.len());
                for (index, v) in incoming.iter().enumerate() {
                    match items.get_mut(index) {
                        Some(current) => changed |= reconcile_slot(current, v, on_change),
                        None => {
                            items.push(wrap(v.clone(), on_change));
                            changed = true;
                        }
                    }
                }
                changed
            }
            (body, value) => match Body::from_value(value.clone()) {
                Ok(fresh) => {
                    *body = fresh;
                    true
                }
                Err(_) => false,
            },
        }
    }
}

fn replace_slot(current: &mut Slot, incoming: Slot, incoming_value: &Value, on_change: &ChangeFn) {
    match current {
        Slot::Tracked(tracked) if is_container(incoming_value) => {
            tracked.reconcile(incoming_value);
        }
        _ => *current = wrap(incoming, on_change),
    }
}

fn reconcile_slot(current: &mut Slot, value: &Value, on_change: &ChangeFn) -> bool {
    if current.eq_value(value) {
        return false;
    }
    replace_slot(current, Slot::Raw(value.clone()), value, on_change);
    true
}

struct TrackedInner {
    body: RefCell<Body>,
    on_change: ChangeFn,
}

/// Shared handle to a tracked object or array
///
/// Clones share the same underlying container; use [`TrackedValue::ptr_eq`]
/// to compare identity and [`TrackedValue::eq_value`] to compare content.
#[derive(Clone)]
pub struct TrackedValue {
    inner: Rc<TrackedInner>,
}

impl TrackedValue {
    fn from_body(body: Body, on_change: &ChangeFn) -> Self {
        Self {
            inner: Rc::new(TrackedInner {
                body: RefCell::new(body),
                on_change: Rc::clone(on_change),
            }),
        }
    }

    /// Whether two handles point at the same container
    pub fn ptr_eq(a: &TrackedValue, b: &TrackedValue) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Whether `target` is this container or already nested somewhere in it
    fn reaches(&self, target: &TrackedValue) -> bool {
        TrackedValue::ptr_eq(self, target)
            || self.inner.body.borrow().any_tracked(|child| child.reaches(target))
    }

    pub fn snapshot(&self) -> Value {
        self.inner.body.borrow().snapshot()
    }

    pub fn eq_value(&self, other: &Value) -> bool {
        self.inner.body.borrow().eq_value(other)
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.inner.body.borrow(), Body::Array(_))
    }

    pub fn len(&self) -> usize {
        self.inner.body.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, field: impl Into<Field>) -> bool {
        self.inner.body.borrow().get(&field.into()).is_some()
    }

    /// Read a field, tracking nested containers on the way out
    pub fn get_field(&self, field: impl Into<Field>) -> Option<Slot> {
        let field = field.into();
        let mut body = self.inner.body.borrow_mut();
        let slot = body.slot_mut(&field)?;
        if let Slot::Raw(raw) = slot {
            if is_container(raw) {
                let value = std::mem::take(raw);
                *slot = wrap(value, &self.inner.on_change);
                trace!(field = %field, "Tracking nested value on read");
            }
        }
        Some(slot.clone())
    }

    /// Follow a path of fields from this container
    pub fn get_path(&self, path: &[Field]) -> Option<Slot> {
        let (last, parents) = path.split_last()?;
        let mut node = self.clone();
        for field in parents {
            match node.get_field(field.clone())? {
                Slot::Tracked(next) => node = next,
                Slot::Raw(_) => return None,
            }
        }
        node.get_field(last.clone())
    }

    /// Write a field; returns whether anything changed
    ///
    /// Writing to an array index past the end pads the gap with `null`.
    pub fn set_field(&self, field: impl Into<Field>, value: impl Into<Slot>) -> bool {
        let field = field.into();
        let incoming = match value.into() {
            // Storing a container inside itself would make it cyclic
            Slot::Tracked(tracked) if tracked.reaches(self) => Slot::Raw(tracked.snapshot()),
            other => other,
        };
        let incoming_value = incoming.snapshot();
        let changed = self.inner.body.borrow_mut().assign(
            &field,
            incoming,
            &incoming_value,
            &self.inner.on_change,
        );
        if changed {
            trace!(field = %field, "Tracked field written");
            (self.inner.on_change)();
        }
        changed
    }

    /// Write the field at the end of `path`; intermediate fields must exist
    pub fn set_path(&self, path: &[Field], value: impl Into<Slot>) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        let mut node = self.clone();
        for field in parents {
            match node.get_field(field.clone()) {
                Some(Slot::Tracked(next)) => node = next,
                _ => return false,
            }
        }
        node.set_field(last.clone(), value)
    }

    /// Remove a field; array elements after it shift down
    pub fn delete_field(&self, field: impl Into<Field>) -> bool {
        let field = field.into();
        let removed = self.inner.body.borrow_mut().remove(&field).is_some();
        if removed {
            trace!(field = %field, "Tracked field deleted");
            (self.inner.on_change)();
        }
        removed
    }

    /// Update in place to match `value`, firing the callback once if
    /// anything changed
    ///
    /// Fields missing from `value` are removed. A scalar cannot replace the
    /// container itself and is ignored; replace the owning slot instead.
    pub fn merge(&self, value: &Value) -> bool {
        let changed = self.reconcile(value);
        if changed {
            (self.inner.on_change)();
        }
        changed
    }

    /// Same as [`merge`](Self::merge) without notifying
    pub(crate) fn reconcile(&self, value: &Value) -> bool {
        self.inner
            .body
            .borrow_mut()
            .reconcile(value, &self.inner.on_change)
    }
}

impl fmt::Debug for TrackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn counter() -> (ChangeFn, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        let hits = Rc::clone(&count);
        let on_change: ChangeFn = Rc::new(move || hits.set(hits.get() + 1));
        (on_change, count)
    }

    fn tracked(value: Value, on_change: &ChangeFn) -> TrackedValue {
        match wrap(value, on_change) {
            Slot::Tracked(tracked) => tracked,
            Slot::Raw(raw) => panic!("expected a container, got {raw}"),
        }
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let (on_change, _) = counter();
        let first = tracked(json!({"a": 1}), &on_change);
        let second = wrap(first.clone(), &on_change);
        assert!(TrackedValue::ptr_eq(&first, second.as_tracked().unwrap()));
    }

    #[test]
    fn test_wrap_keeps_scalars_raw() {
        let (on_change, _) = counter();
        assert!(!wrap(json!(3), &on_change).is_tracked());
        assert!(!wrap(Value::Null, &on_change).is_tracked());
        assert!(wrap(json!([]), &on_change).is_tracked());
    }

    #[test]
    fn test_read_tracks_nested_lazily() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": {"b": 1}, "n": 2}), &on_change);

        let first = root.get_field("a").unwrap();
        let second = root.get_field("a").unwrap();
        assert!(TrackedValue::ptr_eq(
            first.as_tracked().unwrap(),
            second.as_tracked().unwrap()
        ));
        assert!(!root.get_field("n").unwrap().is_tracked());
        assert_eq!(count.get(), 0, "reads never notify");
    }

    #[test]
    fn test_unchanged_write_is_noop() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": {"b": [1, 2]}, "n": 2}), &on_change);

        assert!(!root.set_field("n", json!(2)));
        assert!(!root.set_field("a", json!({"b": [1, 2]})));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_scalar_write_notifies() {
        let (on_change, count) = counter();
        let root = tracked(json!({"n": 1}), &on_change);

        assert!(root.set_field("n", json!(2)));
        assert!(root.set_field("m", json!("new")));
        assert_eq!(count.get(), 2);
        assert_eq!(root.snapshot(), json!({"n": 2, "m": "new"}));
    }

    #[test]
    fn test_nested_write_updates_in_place() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": {"b": 1, "c": 2}}), &on_change);
        let a = root.get_field("a").unwrap().as_tracked().unwrap().clone();

        assert!(root.set_field("a", json!({"b": 5, "c": 2})));
        assert_eq!(count.get(), 1, "one notification for the outer write");

        let after = root.get_field("a").unwrap();
        assert!(TrackedValue::ptr_eq(&a, after.as_tracked().unwrap()));
        assert_eq!(a.snapshot(), json!({"b": 5, "c": 2}));
    }

    #[test]
    fn test_object_into_untracked_field_is_wrapped() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": 1}), &on_change);

        assert!(root.set_field("a", json!({"x": true})));
        assert!(root.get_field("a").unwrap().is_tracked());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_deep_write_through_child() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": {"b": 1}}), &on_change);
        let a = root.get_field("a").unwrap().as_tracked().unwrap().clone();

        assert!(a.set_field("b", json!(5)));
        assert_eq!(count.get(), 1);
        assert_eq!(root.snapshot(), json!({"a": {"b": 5}}));
    }

    #[test]
    fn test_assigning_tracked_value_reuses_wrapper() {
        let (on_change, _) = counter();
        let root = tracked(json!({}), &on_change);
        let other = tracked(json!({"k": 1}), &on_change);

        root.set_field("child", other.clone());
        let child = root.get_field("child").unwrap();
        assert!(TrackedValue::ptr_eq(&other, child.as_tracked().unwrap()));
    }

    #[test]
    fn test_delete_field() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": 1}), &on_change);

        assert!(!root.delete_field("missing"));
        assert_eq!(count.get(), 0);
        assert!(root.delete_field("a"));
        assert_eq!(count.get(), 1);
        assert!(root.is_empty());
    }

    #[test]
    fn test_array_fields() {
        let (on_change, count) = counter();
        let root = tracked(json!({"items": ["x"]}), &on_change);
        let items = root.get_field("items").unwrap().as_tracked().unwrap().clone();
        assert!(items.is_array());

        assert!(items.set_field(2usize, json!("z")));
        assert_eq!(items.snapshot(), json!(["x", null, "z"]));
        assert!(!items.set_field("name", json!(1)));
        assert!(items.delete_field(0usize));
        assert_eq!(root.snapshot(), json!({"items": [null, "z"]}));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_merge_reconciles_and_notifies_once() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": {"b": 1}, "gone": true}), &on_change);
        let a = root.get_field("a").unwrap().as_tracked().unwrap().clone();

        assert!(root.merge(&json!({"a": {"b": 2}, "new": [1]})));
        assert_eq!(count.get(), 1);
        assert_eq!(root.snapshot(), json!({"a": {"b": 2}, "new": [1]}));
        assert!(TrackedValue::ptr_eq(
            &a,
            root.get_field("a").unwrap().as_tracked().unwrap()
        ));

        assert!(!root.merge(&json!({"a": {"b": 2}, "new": [1]})));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_merge_shape_change_keeps_identity() {
        let (on_change, _) = counter();
        let root = tracked(json!({"a": 1}), &on_change);
        let alias = root.clone();

        assert!(root.merge(&json!([1, 2])));
        assert!(alias.is_array());
        assert!(!root.merge(&json!(7)));
    }

    #[test]
    fn test_paths() {
        let (on_change, count) = counter();
        let root = tracked(json!({"cart": {"items": [{"qty": 1}]}}), &on_change);
        let path = Field::parse_path("cart.items.0.qty");
        assert_eq!(path[2], Field::Index(0));

        assert!(root.set_path(&path, json!(3)));
        assert_eq!(root.get_path(&path).unwrap().snapshot(), json!(3));
        assert!(!root.set_path(&Field::parse_path("cart.missing.qty"), json!(1)));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_self_assignment_does_not_alias() {
        let (on_change, _) = counter();
        let root = tracked(json!({"a": 1}), &on_change);

        assert!(root.set_field("copy", root.clone()));
        assert_eq!(root.snapshot(), json!({"a": 1, "copy": {"a": 1}}));
    }

    #[test]
    fn test_ancestor_assignment_does_not_cycle() {
        let (on_change, count) = counter();
        let root = tracked(json!({"a": {"x": 1}}), &on_change);
        let a = root.get_field("a").unwrap().as_tracked().unwrap().clone();

        assert!(a.set_field("loop", root.clone()));
        assert_eq!(count.get(), 1);
        assert_eq!(
            root.snapshot(),
            json!({"a": {"x": 1, "loop": {"a": {"x": 1}}}})
        );

        let stored = a.get_field("loop").unwrap();
        assert!(!TrackedValue::ptr_eq(stored.as_tracked().unwrap(), &root));
    }

    #[test]
    fn test_sibling_container_is_shared_not_copied() {
        let (on_change, _) = counter();
        let root = tracked(json!({"a": {"x": 1}, "b": {}}), &on_change);
        let a = root.get_field("a").unwrap().as_tracked().unwrap().clone();
        let b = root.get_field("b").unwrap().as_tracked().unwrap().clone();

        assert!(b.set_field("link", a.clone()));
        let stored = b.get_field("link").unwrap();
        assert!(TrackedValue::ptr_eq(stored.as_tracked().unwrap(), &a));
    }

    #[test]
    fn test_contains_reads_without_mutating() {
        let (on_change, count) = counter();
        let object = tracked(json!({"a": {"b": 1}}), &on_change);
        let list = tracked(json!([1, 2]), &on_change);

        // A reader already holds the body
        let _held = object.inner.body.borrow();
        assert!(object.contains("a"));
        assert!(!object.contains("missing"));

        assert!(list.contains(1usize));
        assert!(!list.contains(2usize));
        assert_eq!(count.get(), 0);
    }
}

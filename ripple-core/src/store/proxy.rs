//! Reactive proxies over dynamic objects.
//!
//! A [`Reactive`] wraps a raw [`Object`] so that every read through it is
//! tracked per key and every write notifies exactly the subscribers of the
//! keys it changed. There is one proxy per live target.
//!
//! Arrays get extra rules: writing past the end grows the array and
//! notifies `length` readers, and shrinking it notifies `length` readers
//! plus the readers of every removed index.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::registry::Registry;
use super::value::{DepKey, Key, Object, ObjectData, Value, MAX_ARRAY_LENGTH};
use crate::error::{ReactiveError, Result};
use crate::reactive::{Runtime, Trackable};

pub(crate) struct ProxyInner {
    target: Object,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        let addr = self.target.addr();
        Runtime::try_with(|rt| rt.store.release_proxy(addr));
    }
}

/// Deep-observable view of an object.
///
/// # Example
///
/// ```rust
/// use ripple_core::{effect, reactive, Value};
/// use serde_json::json;
///
/// let state = reactive(Value::from(json!({ "user": { "name": "Ada" } })));
/// let state = state.to_reactive()?;
///
/// let runner = effect({
///     let state = state.clone();
///     move || {
///         let user = state.get("user");
///         if let Value::Reactive(user) = user {
///             println!("name: {:?}", user.get("name"));
///         }
///     }
/// });
///
/// // Nested objects come back wrapped, so this write is observed.
/// let user = state.get("user");
/// user.to_reactive()?.set("name", "Grace")?;
/// assert_eq!(runner.effect().run_count(), 2);
/// # Ok::<(), ripple_core::ReactiveError>(())
/// ```
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ProxyInner>,
}

/// Wrap `value` for deep observation.
///
/// Non-objects are returned unchanged, a proxy is returned as is, and an
/// object that already has a live proxy gets that same proxy back.
pub fn reactive(value: Value) -> Value {
    value.into_reactive()
}

/// The proxy for `object`, created on first request.
pub(crate) fn proxy_for(object: &Object) -> Reactive {
    let addr = object.addr();
    let existing = Runtime::with(|rt| rt.store.proxy(addr)).and_then(|weak| weak.upgrade());
    if let Some(inner) = existing {
        return Reactive { inner };
    }

    let inner = Rc::new(ProxyInner {
        target: object.clone(),
    });
    Runtime::with(|rt| rt.store.register_proxy(addr, Rc::downgrade(&inner)));
    debug!(target = format_args!("{addr:#x}"), array = object.is_array(), "proxy created");
    Reactive { inner }
}

impl Reactive {
    fn target(&self) -> &Object {
        &self.inner.target
    }

    fn addr(&self) -> usize {
        self.target().addr()
    }

    /// The raw object behind the proxy.
    pub fn raw(&self) -> Object {
        self.target().clone()
    }

    pub fn is_array(&self) -> bool {
        self.target().is_array()
    }

    /// Whether two handles are the same proxy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Map keys onto what the target can hold. `None` for a name on an
    /// array, or an index no array can reach.
    fn normalize(&self, key: Key) -> Option<Key> {
        if self.is_array() {
            match key {
                Key::Prop(_) => None,
                Key::Index(index) if index >= MAX_ARRAY_LENGTH => None,
                key => Some(key),
            }
        } else {
            Some(Key::Prop(key.to_prop()))
        }
    }

    fn invalid_key(&self, key: &Key) -> ReactiveError {
        ReactiveError::InvalidKey {
            key: key.to_string(),
            kind: if self.is_array() { "array" } else { "object" },
        }
    }

    /// Tracked read of one key.
    ///
    /// A nested ref is read through (and tracked); a nested object comes back
    /// as its proxy.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let Some(key) = self.normalize(key.into()) else {
            return Value::Undefined;
        };
        Registry::track(self.addr(), DepKey::Key(key.clone()));

        match self.target().get(key) {
            Value::Ref(cell) => cell.get(),
            value => value.into_reactive(),
        }
    }

    /// Write one key, notifying its readers if the value changed.
    ///
    /// Writing a plain value over a nested ref writes through the ref
    /// instead. On arrays, writing `length` resizes and writing past the end
    /// grows the array.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into().to_raw();
        let Some(key) = self.normalize(key.clone()) else {
            return Err(self.invalid_key(&key));
        };

        if key == Key::Length {
            return self.set_len(array_length(&value)?);
        }

        if let Value::Ref(cell) = self.target().get(key.clone()) {
            if !value.is_ref() {
                cell.set(value);
                return Ok(());
            }
        }

        let (previous, grew) = {
            let mut data = self.target().data_mut();
            match (&mut *data, &key) {
                (ObjectData::Map(map), Key::Prop(name)) => {
                    let previous = map.insert(Rc::clone(name), value.clone());
                    let added = previous.is_none();
                    (previous.unwrap_or_default(), added)
                }
                (ObjectData::Array(items), Key::Index(index)) => {
                    let index = *index;
                    let grew = index >= items.len();
                    if grew {
                        items.resize(index + 1, Value::Undefined);
                    }
                    (std::mem::replace(&mut items[index], value.clone()), grew)
                }
                _ => unreachable!("normalized key {key:?} does not fit its target"),
            }
        };

        let changed = !previous.same_value(&value);
        drop(previous);

        // A new map key changes the key set; a write past the end of an
        // array changes its length.
        let structural = grew.then(|| {
            if self.is_array() {
                DepKey::Key(Key::Length)
            } else {
                DepKey::Iterate
            }
        });

        if changed || structural.is_some() {
            let key = DepKey::Key(key);
            Registry::trigger(self.addr(), |dep| {
                (changed && *dep == key) || structural.as_ref() == Some(dep)
            });
        }
        Ok(())
    }

    /// Remove one key. On arrays the slot is cleared, not removed, so the
    /// length is unchanged. Returns whether the key held a value.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        let Some(key) = self.normalize(key.clone()) else {
            return Err(self.invalid_key(&key));
        };
        if key == Key::Length {
            return Err(self.invalid_key(&key));
        }

        let previous = {
            let mut data = self.target().data_mut();
            match (&mut *data, &key) {
                (ObjectData::Map(map), Key::Prop(name)) => map.shift_remove(&**name),
                (ObjectData::Array(items), Key::Index(index)) => items
                    .get_mut(*index)
                    .map(std::mem::take)
                    .filter(|previous| !previous.is_undefined()),
                _ => unreachable!("normalized key {key:?} does not fit its target"),
            }
        };

        let Some(previous) = previous else {
            return Ok(false);
        };
        drop(previous);

        let key = DepKey::Key(key);
        let array = self.is_array();
        Registry::trigger(self.addr(), |dep| {
            *dep == key || (!array && *dep == DepKey::Iterate)
        });
        Ok(true)
    }

    /// Number of entries. Tracks `length` on arrays and the key set on maps.
    pub fn len(&self) -> usize {
        self.track_shape();
        self.target().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize an array. Shrinking notifies the readers of every removed
    /// index; any change notifies `length` readers.
    pub fn set_len(&self, len: usize) -> Result<()> {
        if !self.is_array() {
            return Err(self.invalid_key(&Key::Length));
        }
        let (old_len, removed) = {
            let mut data = self.target().data_mut();
            let ObjectData::Array(items) = &mut *data else {
                unreachable!("checked above");
            };
            let old_len = items.len();
            let removed = if len < old_len {
                items.split_off(len)
            } else {
                items.resize(len, Value::Undefined);
                Vec::new()
            };
            (old_len, removed)
        };
        drop(removed);

        if old_len == len {
            return Ok(());
        }
        Registry::trigger(self.addr(), |dep| match dep {
            DepKey::Key(Key::Length) => true,
            DepKey::Key(Key::Index(index)) => *index >= len,
            _ => false,
        });
        Ok(())
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        if !self.is_array() {
            return Err(self.invalid_key(&Key::Length));
        }
        let index = self.target().len();
        self.set(Key::Index(index), value)
    }

    /// Keys in order: indices for arrays, property names for maps.
    pub fn keys(&self) -> Vec<Key> {
        self.track_shape();
        match &*self.target().data() {
            ObjectData::Map(map) => map.keys().map(|name| Key::Prop(Rc::clone(name))).collect(),
            ObjectData::Array(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    fn track_shape(&self) {
        let key = if self.is_array() {
            DepKey::Key(Key::Length)
        } else {
            DepKey::Iterate
        };
        Registry::track(self.addr(), key);
    }
}

/// Parse a value written to an array's `length`.
fn array_length(value: &Value) -> Result<usize> {
    match value {
        Value::Number(n)
            if *n >= 0.0 && *n <= MAX_ARRAY_LENGTH as f64 && n.fract() == 0.0 =>
        {
            Ok(*n as usize)
        }
        other => Err(ReactiveError::InvalidArrayLength(format!("{other:?}"))),
    }
}

/// Proxies compare by target, which is the same as by proxy while both
/// are alive.
impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.target().ptr_eq(other.target())
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(self.target()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Ref};
    use serde_json::json;
    use std::cell::RefCell;

    fn proxy(json: serde_json::Value) -> Reactive {
        Value::from(json).to_reactive().unwrap()
    }

    fn log_of(f: impl Fn() -> Value + 'static) -> (Rc<RefCell<Vec<Value>>>, crate::EffectRunner) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let runner = effect({
            let log = log.clone();
            move || {
                let value = f();
                log.borrow_mut().push(value);
            }
        });
        (log, runner)
    }

    #[test]
    fn reactive_preserves_identity() {
        let raw = Value::map([("a", 1)]);
        let first = reactive(raw.clone());
        let again = reactive(raw.clone());
        let twice = reactive(first.clone());

        assert!(first.is_reactive());
        assert!(first.as_reactive().unwrap().ptr_eq(again.as_reactive().unwrap()));
        assert!(first.as_reactive().unwrap().ptr_eq(twice.as_reactive().unwrap()));
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(reactive(Value::from(1)), Value::from(1));
        assert_eq!(reactive(Value::Null), Value::Null);
    }

    #[test]
    fn writes_notify_only_readers_of_that_key() {
        let state = proxy(json!({ "a": 1, "b": 2 }));
        let (log, _runner) = log_of({
            let state = state.clone();
            move || state.get("a")
        });

        state.set("b", 20).unwrap();
        assert_eq!(log.borrow().len(), 1);

        state.set("a", 10).unwrap();
        state.set("a", 10).unwrap();
        assert_eq!(*log.borrow(), vec![Value::from(1), Value::from(10)]);
    }

    #[test]
    fn nested_objects_are_wrapped_lazily() {
        let state = proxy(json!({ "user": { "name": "Ada" } }));
        let (log, _runner) = log_of({
            let state = state.clone();
            move || match state.get("user") {
                Value::Reactive(user) => user.get("name"),
                other => other,
            }
        });

        let user = state.get("user");
        assert!(user.is_reactive());
        assert_eq!(user, state.get("user"));

        user.as_reactive().unwrap().set("name", "Grace").unwrap();
        assert_eq!(*log.borrow(), vec![Value::from("Ada"), Value::from("Grace")]);
    }

    #[test]
    fn nested_refs_are_unwrapped_and_written_through() {
        let count = Ref::new(Value::from(1));
        let state = reactive(Value::map([("count", Value::Ref(count.clone()))]));
        let state = state.as_reactive().unwrap().clone();

        let (log, _runner) = log_of({
            let state = state.clone();
            move || state.get("count")
        });

        state.set("count", 2).unwrap();
        assert_eq!(count.get(), Value::from(2));
        assert!(state.raw().get("count").is_ref());

        count.set(Value::from(3));
        assert_eq!(*log.borrow(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn writing_past_the_end_notifies_length_readers() {
        let items = proxy(json!([1, 2, 3]));
        let (log, _runner) = log_of({
            let items = items.clone();
            move || Value::from(items.len())
        });

        items.set(5usize, 99).unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(items.get(4usize), Value::Undefined);
        assert_eq!(*log.borrow(), vec![Value::from(3), Value::from(6)]);
    }

    #[test]
    fn shrinking_notifies_removed_indices() {
        let items = proxy(json!([1, 2, 3, 4]));
        let (tail, _tail_runner) = log_of({
            let items = items.clone();
            move || items.get(3usize)
        });
        let (head, _head_runner) = log_of({
            let items = items.clone();
            move || items.get(0usize)
        });

        items.set("length", 2).unwrap();

        assert_eq!(*tail.borrow(), vec![Value::from(4), Value::Undefined]);
        assert_eq!(head.borrow().len(), 1);
    }

    #[test]
    fn push_appends_and_notifies_once() {
        let items = proxy(json!([]));
        let (log, _runner) = log_of({
            let items = items.clone();
            move || {
                let len = items.len();
                Value::from(len)
            }
        });

        items.push("a").unwrap();
        items.push("b").unwrap();
        assert_eq!(*log.borrow(), vec![Value::from(0), Value::from(1), Value::from(2)]);
    }

    #[test]
    fn new_and_deleted_keys_notify_key_readers() {
        let state = proxy(json!({ "a": 1 }));
        let (log, _runner) = log_of({
            let state = state.clone();
            move || Value::array(state.keys().iter().map(|key| key.to_string()))
        });

        state.set("b", 2).unwrap();
        state.set("b", 3).unwrap();
        assert!(state.delete("a").unwrap());
        assert!(!state.delete("a").unwrap());

        let snapshots: Vec<serde_json::Value> =
            log.borrow().iter().map(|keys| keys.to_json().unwrap()).collect();
        assert_eq!(snapshots, vec![json!(["a"]), json!(["a", "b"]), json!(["b"])]);
    }

    #[test]
    fn invalid_writes_are_reported() {
        let items = proxy(json!([1]));
        assert!(matches!(
            items.set("name", 1),
            Err(ReactiveError::InvalidKey { kind: "array", .. })
        ));
        assert!(matches!(
            items.set("length", 1.5),
            Err(ReactiveError::InvalidArrayLength(_))
        ));
        assert!(matches!(items.set("length", -1), Err(ReactiveError::InvalidArrayLength(_))));

        assert!(matches!(
            items.set(usize::MAX, 1),
            Err(ReactiveError::InvalidKey { kind: "array", .. })
        ));
        assert!(matches!(
            items.set("18446744073709551615", 1),
            Err(ReactiveError::InvalidKey { kind: "array", .. })
        ));
        assert!(matches!(
            items.set("length", 1e19),
            Err(ReactiveError::InvalidArrayLength(_))
        ));
        assert!(matches!(
            items.set("length", f64::INFINITY),
            Err(ReactiveError::InvalidArrayLength(_))
        ));
        assert_eq!(items.get(usize::MAX), Value::Undefined);
        assert_eq!(items.len(), 1);

        let map = proxy(json!({}));
        assert!(matches!(map.push(1), Err(ReactiveError::InvalidKey { kind: "object", .. })));
        assert!(matches!(Value::from(1).to_reactive(), Err(ReactiveError::NotAnObject)));
        assert!(matches!(map.set_len(0), Err(ReactiveError::InvalidKey { kind: "object", .. })));
    }

    #[test]
    fn length_is_an_ordinary_property_on_maps() {
        let map = proxy(json!({}));
        map.set("length", "long").unwrap();
        assert_eq!(map.get("length"), Value::from("long"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn proxy_is_recreated_after_drop() {
        let raw = Object::map([("a", 1)]);
        let first = proxy_for(&raw);
        drop(first);
        assert!(Runtime::with(|rt| rt.store.proxy(raw.addr())).is_none());

        let second = proxy_for(&raw);
        assert_eq!(second.get("a"), Value::from(1));
    }
}

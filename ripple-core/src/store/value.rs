//! Dynamic values held by reactive objects.
//!
//! A [`Value`] is either a primitive, a raw [`Object`] (a map or an array
//! that nothing observes), a [`Reactive`] proxy over one, or a nested
//! [`Ref`]. Objects compare by identity; everything else by value.

use std::cell::{Ref as Borrow, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::proxy::{proxy_for, Reactive};
use super::registry::Registry;
use crate::error::{ReactiveError, Result};
use crate::reactive::{Ref, Runtime, Trackable};

/// Arrays hold at most this many elements. Larger indices are property
/// names, and larger lengths are rejected.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// A property key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property.
    Prop(Rc<str>),
    /// An array index.
    Index(usize),
    /// An array's length.
    Length,
}

impl Key {
    /// The key as a property name, for objects that are not arrays.
    pub(crate) fn to_prop(&self) -> Rc<str> {
        match self {
            Key::Prop(name) => Rc::clone(name),
            Key::Index(index) => Rc::from(index.to_string()),
            Key::Length => Rc::from("length"),
        }
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        if key == "length" {
            return Key::Length;
        }
        match key.parse::<usize>() {
            // "01" is a property name, not an index.
            Ok(index) if index < MAX_ARRAY_LENGTH && index.to_string() == key => {
                Key::Index(index)
            }
            _ => Key::Prop(Rc::from(key)),
        }
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::from(key.as_str())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
            Key::Length => f.write_str("length"),
        }
    }
}

/// What a per-target dependency is keyed by: one property, or the set of
/// keys as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    Key(Key),
    Iterate,
}

#[derive(Debug)]
pub(crate) enum ObjectData {
    Map(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
}

pub(crate) struct Target {
    pub(crate) data: RefCell<ObjectData>,
}

impl Drop for Target {
    fn drop(&mut self) {
        let addr = self as *const Target as usize;
        Runtime::try_with(|rt| Registry::forget(&rt.store, addr));
    }
}

/// A raw map or array. Reads and writes through an `Object` are not
/// tracked; wrap it with [`reactive`](super::reactive) for that.
#[derive(Clone)]
pub struct Object {
    pub(crate) inner: Rc<Target>,
}

impl Object {
    fn from_data(data: ObjectData) -> Self {
        Self {
            inner: Rc::new(Target {
                data: RefCell::new(data),
            }),
        }
    }

    /// A map from its entries, in order.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        Self::from_data(ObjectData::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into().to_raw()))
                .collect(),
        ))
    }

    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(ObjectData::Array(
            items.into_iter().map(|item| item.into().to_raw()).collect(),
        ))
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.data(), ObjectData::Array(_))
    }

    /// Number of entries (or elements).
    pub fn len(&self) -> usize {
        match &*self.data() {
            ObjectData::Map(map) => map.len(),
            ObjectData::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Untracked read of one entry.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        match (&*self.data(), &key) {
            (ObjectData::Array(items), Key::Index(index)) => {
                items.get(*index).cloned().unwrap_or_default()
            }
            (ObjectData::Array(items), Key::Length) => Value::from(items.len()),
            (ObjectData::Array(_), Key::Prop(_)) => Value::Undefined,
            (ObjectData::Map(map), _) => map.get(&*key.to_prop()).cloned().unwrap_or_default(),
        }
    }

    /// Whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn data(&self) -> Borrow<'_, ObjectData> {
        self.inner.data.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, ObjectData> {
        self.inner.data.borrow_mut()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("array", &self.is_array())
            .field("len", &self.len())
            .finish()
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// A raw object.
    Object(Object),
    /// A proxy over an object.
    Reactive(Reactive),
    /// A ref stored inside an object. Reading it through a proxy yields the
    /// ref's value.
    Ref(Ref<Value>),
}

impl Value {
    /// A raw map value.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        Value::Object(Object::map(entries))
    }

    /// A raw array value.
    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::Object(Object::array(items))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is a map or array, raw or proxied.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self, Value::Reactive(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// The proxy for this object, wrapping a raw object on the way.
    pub fn to_reactive(&self) -> Result<Reactive> {
        match self {
            Value::Reactive(proxy) => Ok(proxy.clone()),
            Value::Object(object) => Ok(proxy_for(object)),
            _ => Err(ReactiveError::NotAnObject),
        }
    }

    /// The raw object behind a proxy; any other value unchanged.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Reactive(proxy) => Value::Object(proxy.raw()),
            other => other.clone(),
        }
    }

    /// Untracked snapshot as JSON. `undefined` becomes `null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Address of the underlying object, if any.
    fn target_addr(&self) -> Option<usize> {
        match self {
            Value::Object(object) => Some(object.addr()),
            Value::Reactive(proxy) => Some(proxy.raw().addr()),
            _ => None,
        }
    }
}

/// Numbers use `==`; objects and refs compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (a, b) => match (a.target_addr(), b.target_addr()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Trackable for Value {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.same_value(b),
            _ => self == other,
        }
    }

    fn into_reactive(self) -> Self {
        match self {
            Value::Object(object) => Value::Reactive(proxy_for(&object)),
            other => other,
        }
    }

    fn traverse(&self) {
        traverse_value(self, &mut HashSet::new());
    }
}

fn traverse_value(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Ref(cell) => traverse_value(&cell.get(), seen),
        Value::Object(object) => traverse_value(&Value::Reactive(proxy_for(object)), seen),
        Value::Reactive(proxy) => {
            if !seen.insert(proxy.raw().addr()) {
                return;
            }
            for key in proxy.keys() {
                traverse_value(&proxy.get(key), seen);
            }
        }
        _ => {}
    }
}

macro_rules! from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Reactive> for Value {
    fn from(proxy: Reactive) -> Self {
        Value::Reactive(proxy)
    }
}

impl From<Ref<Value>> for Value {
    fn from(cell: Ref<Value>) -> Self {
        Value::Ref(cell)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(map) => Value::map(map),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let ancestors = RefCell::new(Vec::new());
        Snapshot {
            value: self,
            ancestors: &ancestors,
        }
        .serialize(serializer)
    }
}

/// Serializes a value without tracking, rejecting cycles.
struct Snapshot<'a> {
    value: &'a Value,
    ancestors: &'a RefCell<Vec<usize>>,
}

impl Snapshot<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Snapshot<'b> {
        Snapshot {
            value,
            ancestors: self.ancestors,
        }
    }
}

impl Serialize for Snapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let object = match self.value {
            Value::Undefined | Value::Null => return serializer.serialize_none(),
            Value::Bool(b) => return serializer.serialize_bool(*b),
            Value::Number(n) => {
                return if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                };
            }
            Value::String(s) => return serializer.serialize_str(s),
            Value::Ref(cell) => return cell.with_untracked(|value| self.child(value).serialize(serializer)),
            Value::Object(object) => object.clone(),
            Value::Reactive(proxy) => proxy.raw(),
        };

        let addr = object.addr();
        if self.ancestors.borrow().contains(&addr) {
            return Err(S::Error::custom("cannot serialize a cyclic object"));
        }
        self.ancestors.borrow_mut().push(addr);

        let data = object.data();
        let result = match &*data {
            ObjectData::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(&**key, &self.child(value))?;
                }
                out.end()
            }
            ObjectData::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&self.child(item))?;
                }
                out.end()
            }
        };

        self.ancestors.borrow_mut().pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_parse_like_property_names() {
        assert_eq!(Key::from("length"), Key::Length);
        assert_eq!(Key::from("3"), Key::Index(3));
        assert_eq!(Key::from("03"), Key::Prop(Rc::from("03")));
        assert_eq!(Key::from("name"), Key::Prop(Rc::from("name")));
        assert_eq!(Key::from("4294967294"), Key::Index(4_294_967_294));
        assert_eq!(Key::from("4294967295"), Key::Prop(Rc::from("4294967295")));
        assert_eq!(
            Key::from("18446744073709551615"),
            Key::Prop(Rc::from("18446744073709551615"))
        );
        assert_eq!(&*Key::Index(7).to_prop(), "7");
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Value::map([("x", 1)]);
        let b = Value::map([("x", 1)]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn numbers_use_object_is_for_change_detection() {
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
    }

    #[test]
    fn json_conversion_keeps_shape() {
        let fixture = json!({ "name": "ripple", "tags": ["a", "b"], "meta": { "stars": 3 } });
        let value = Value::from(fixture.clone());
        assert_eq!(value.to_json().unwrap(), fixture);
    }

    #[test]
    fn undefined_serializes_as_null() {
        let value = Value::array([Value::Undefined, Value::from(1.5)]);
        assert_eq!(value.to_json().unwrap(), json!([null, 1.5]));
    }

    #[test]
    fn nested_refs_serialize_as_their_value() {
        let cell = Ref::new(Value::from("inner"));
        let value = Value::map([("cell", Value::Ref(cell))]);
        assert_eq!(value.to_json().unwrap(), json!({ "cell": "inner" }));
    }

    #[test]
    fn cyclic_objects_fail_to_serialize() {
        let object = Object::map([("x", 1)]);
        let proxy = proxy_for(&object);
        proxy.set("me", Value::Object(object.clone())).unwrap();

        assert!(Value::Object(object.clone()).to_json().is_err());

        // Break the cycle so the test does not leak.
        proxy.delete("me").unwrap();
    }

    #[test]
    fn to_raw_unwraps_proxies_only() {
        let object = Object::array([1, 2]);
        let proxied = Value::Object(object.clone()).into_reactive();
        assert!(proxied.is_reactive());
        assert!(matches!(proxied.to_raw(), Value::Object(raw) if raw.ptr_eq(&object)));
        assert_eq!(Value::from(3).to_raw(), Value::from(3));
    }
}

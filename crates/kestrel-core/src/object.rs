//! Objects with hidden classes (shapes)
//!
//! An object is either plain (layout described entirely by its shape) or
//! exotic (a proxy that intercepts definition, get and set). The generic
//! `define_own_property` here is the slow path of the define IC and the
//! entry point used by reflective callers.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{VmError, VmResult};
use crate::proxy::JsProxy;
use crate::shape::{Shape, ShapeTable};
use crate::symbol::PrivateName;
use crate::value::Value;

/// Shared object reference
pub type ObjectRef = Arc<JsObject>;

/// Property key (string, index or private name)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Integer index
    Index(u32),
    /// Private field name or class brand
    Private(PrivateName),
}

impl PropertyKey {
    /// Create a string property key.
    ///
    /// Canonical array-index strings become `Index`, so `"1"` and `1` name
    /// the same property.
    pub fn string(s: &str) -> Self {
        match array_index(s) {
            Some(index) => Self::Index(index),
            None => Self::String(Arc::from(s)),
        }
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// Create a private property key
    pub fn private(name: PrivateName) -> Self {
        Self::Private(name)
    }

    /// Whether this key is a private name or brand
    #[inline]
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// Get the private name, if any
    pub fn as_private(&self) -> Option<&PrivateName> {
        match self {
            Self::Private(name) => Some(name),
            _ => None,
        }
    }

    /// Convert a computed key value
    pub fn from_value(value: &Value) -> VmResult<Self> {
        match value {
            Value::String(s) => Ok(match array_index(s) {
                Some(index) => Self::Index(index),
                None => Self::String(s.clone()),
            }),
            Value::Int32(n) if *n >= 0 => Ok(Self::Index(*n as u32)),
            Value::Int32(n) => Ok(Self::String(Arc::from(n.to_string()))),
            Value::Number(n) => Ok(Self::from_number(*n)),
            Value::Boolean(b) => Ok(Self::String(Arc::from(b.to_string()))),
            Value::Undefined => Ok(Self::string("undefined")),
            Value::Null => Ok(Self::string("null")),
            other => Err(VmError::type_error(format!(
                "Cannot convert {other:?} to a property key"
            ))),
        }
    }
}

impl PropertyKey {
    fn from_number(n: f64) -> Self {
        if n == 0.0 {
            // Covers -0
            return Self::Index(0);
        }
        if n.fract() == 0.0 && n > 0.0 && n <= MAX_ARRAY_INDEX as f64 {
            return Self::Index(n as u32);
        }
        let text = if n.is_nan() {
            "NaN".to_string()
        } else if n.is_infinite() {
            if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
        } else {
            n.to_string()
        };
        Self::String(Arc::from(text))
    }
}

/// Largest array index, `2^32 - 2`
const MAX_ARRAY_INDEX: u32 = u32::MAX - 1;

/// Parse a canonical array-index string: decimal digits, no leading zero,
/// at most `MAX_ARRAY_INDEX`.
fn array_index(s: &str) -> Option<u32> {
    let bytes = s.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    s.parse::<u32>().ok().filter(|&n| n <= MAX_ARRAY_INDEX)
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Index(i) => write!(f, "{i}"),
            Self::Private(name) => write!(f, "{name}"),
        }
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes (public class fields)
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable (class brands)
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// Private fields: writable, hidden from enumeration, never deleted
    pub const fn private_field() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: false,
        }
    }
}

/// Property descriptor
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// The value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property
    Accessor {
        /// Getter function
        get: Option<Value>,
        /// Setter function
        set: Option<Value>,
        /// Attributes (`writable` is ignored)
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Create a data property
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Create an accessor property
    pub fn accessor(get: Option<Value>, set: Option<Value>) -> Self {
        Self::Accessor {
            get,
            set,
            attributes: PropertyAttributes {
                writable: false,
                enumerable: false,
                configurable: true,
            },
        }
    }

    /// Get the value (for data properties)
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Get the attributes
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Check if writable
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { attributes, .. } => attributes.writable,
            Self::Accessor { .. } => false,
        }
    }
}

#[derive(Clone)]
enum PropertySlot {
    Data(Value),
    Accessor {
        get: Option<Value>,
        set: Option<Value>,
    },
}

impl PropertySlot {
    fn from_descriptor(desc: PropertyDescriptor) -> Self {
        match desc {
            PropertyDescriptor::Data { value, .. } => Self::Data(value),
            PropertyDescriptor::Accessor { get, set, .. } => Self::Accessor { get, set },
        }
    }

    fn to_descriptor(&self, attributes: PropertyAttributes) -> PropertyDescriptor {
        match self {
            Self::Data(value) => PropertyDescriptor::Data {
                value: value.clone(),
                attributes,
            },
            Self::Accessor { get, set } => PropertyDescriptor::Accessor {
                get: get.clone(),
                set: set.clone(),
                attributes,
            },
        }
    }
}

struct ObjectStorage {
    shape: Arc<Shape>,
    slots: Vec<PropertySlot>,
}

/// Plain or exotic
pub enum ObjectKind {
    /// Ordinary object, eligible for the IC fast path
    Plain,
    /// Proxy intercepting definition
    Exotic(JsProxy),
}

/// An object
///
/// Thread-safe with interior mutability.
pub struct JsObject {
    kind: ObjectKind,
    storage: RwLock<ObjectStorage>,
    prototype: Option<ObjectRef>,
    extensible: AtomicBool,
    shapes: Arc<ShapeTable>,
}

impl JsObject {
    /// Create a new empty plain object on the shared root shape
    pub fn new(prototype: Option<ObjectRef>, shapes: Arc<ShapeTable>) -> Self {
        let root = Arc::clone(shapes.root());
        Self::with_shape(root, prototype, shapes)
    }

    /// Create a plain object starting from a specific (root) shape
    pub fn with_shape(
        shape: Arc<Shape>,
        prototype: Option<ObjectRef>,
        shapes: Arc<ShapeTable>,
    ) -> Self {
        Self::with_kind(ObjectKind::Plain, shape, prototype, shapes)
    }

    /// Create an exotic object wrapping a proxy
    pub fn proxy(proxy: JsProxy, shapes: Arc<ShapeTable>) -> Self {
        let root = Arc::clone(shapes.root());
        Self::with_kind(ObjectKind::Exotic(proxy), root, None, shapes)
    }

    fn with_kind(
        kind: ObjectKind,
        shape: Arc<Shape>,
        prototype: Option<ObjectRef>,
        shapes: Arc<ShapeTable>,
    ) -> Self {
        Self {
            kind,
            storage: RwLock::new(ObjectStorage {
                shape,
                slots: Vec::new(),
            }),
            prototype,
            extensible: AtomicBool::new(true),
            shapes,
        }
    }

    /// Object kind
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Whether definitions on this object are observable by an interceptor
    #[inline]
    pub fn is_exotic(&self) -> bool {
        matches!(self.kind, ObjectKind::Exotic(_))
    }

    /// Get the proxy, if exotic
    pub fn as_proxy(&self) -> Option<&JsProxy> {
        match &self.kind {
            ObjectKind::Exotic(proxy) => Some(proxy),
            ObjectKind::Plain => None,
        }
    }

    /// Current shape
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(&self.storage.read().shape)
    }

    /// Shape table this object allocates transitions from
    pub fn shapes(&self) -> &Arc<ShapeTable> {
        &self.shapes
    }

    /// Get prototype
    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.prototype.as_ref()
    }

    /// Whether new own properties may be added
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// Forbid adding new own properties
    pub fn prevent_extensions(&self) {
        self.extensible.store(false, Ordering::Release);
    }

    fn own_lookup(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let storage = self.storage.read();
        let offset = storage.shape.get_offset(key)?;
        let attributes = storage.shape.entries()[offset].1;
        storage
            .slots
            .get(offset)
            .map(|slot| slot.to_descriptor(attributes))
    }

    /// Get an own property descriptor
    ///
    /// Public keys of exotic objects are answered by the proxy target.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        match &self.kind {
            ObjectKind::Exotic(proxy) if !key.is_private() => {
                proxy.target()?.get_own_property(key)
            }
            _ => self.own_lookup(key),
        }
    }

    /// Check if object has own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.get_own_property(key).is_some()
    }

    /// Own keys in definition order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut keys = match &self.kind {
            ObjectKind::Exotic(proxy) => proxy
                .target()
                .map(|target| target.own_keys())
                .unwrap_or_default(),
            ObjectKind::Plain => Vec::new(),
        };
        keys.extend(self.storage.read().shape.own_keys());
        keys
    }

    /// Own keys with their descriptors in definition order
    pub fn own_properties(&self) -> Vec<(PropertyKey, PropertyDescriptor)> {
        self.own_keys()
            .into_iter()
            .filter_map(|key| {
                let desc = self.get_own_property(&key)?;
                Some((key, desc))
            })
            .collect()
    }

    /// Read a private field or brand. Never consults prototypes or traps.
    pub fn get_private(&self, name: &PrivateName) -> Option<Value> {
        match self.own_lookup(&PropertyKey::Private(name.clone()))? {
            PropertyDescriptor::Data { value, .. } => Some(value),
            PropertyDescriptor::Accessor { .. } => None,
        }
    }

    /// Get property by key (`obj[key]`)
    pub fn get(self: &Arc<Self>, key: &PropertyKey) -> VmResult<Value> {
        self.get_with_receiver(key, &Value::Object(Arc::clone(self)))
    }

    /// Get property by key with an explicit receiver for getters
    pub fn get_with_receiver(&self, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
        if let ObjectKind::Exotic(proxy) = &self.kind
            && !key.is_private()
        {
            let (target, handler) = proxy.checked("get")?;
            return handler.get(target, key, receiver);
        }

        match self.own_lookup(key) {
            Some(PropertyDescriptor::Data { value, .. }) => Ok(value),
            Some(PropertyDescriptor::Accessor { get, .. }) => match get {
                Some(getter) => getter.call(receiver, &[]),
                None => Ok(Value::undefined()),
            },
            None => match &self.prototype {
                Some(proto) => proto.get_with_receiver(key, receiver),
                None => Ok(Value::undefined()),
            },
        }
    }

    /// Set property by key with assignment semantics (`obj[key] = value`)
    ///
    /// Honours setters on the prototype chain and proxy `set` traps.
    pub fn set(self: &Arc<Self>, key: PropertyKey, value: Value) -> VmResult<bool> {
        self.set_with_receiver(&key, value, self)
    }

    /// Set with an explicit receiver
    pub fn set_with_receiver(
        &self,
        key: &PropertyKey,
        value: Value,
        receiver: &ObjectRef,
    ) -> VmResult<bool> {
        if let ObjectKind::Exotic(proxy) = &self.kind
            && !key.is_private()
        {
            let (target, handler) = proxy.checked("set")?;
            return handler.set(target, key, value, receiver);
        }

        match self.own_lookup(key) {
            Some(PropertyDescriptor::Data { attributes, .. }) => {
                if !attributes.writable {
                    return Ok(false);
                }
                if std::ptr::eq(self, Arc::as_ptr(receiver)) {
                    self.write_own(key, value);
                    return Ok(true);
                }
                receiver.create_data_property(key, value)
            }
            Some(PropertyDescriptor::Accessor { set, .. }) => match set {
                Some(setter) => {
                    setter.call(&Value::Object(Arc::clone(receiver)), &[value])?;
                    Ok(true)
                }
                None => Ok(false),
            },
            None => match &self.prototype {
                Some(proto) => proto.set_with_receiver(key, value, receiver),
                None => receiver.create_data_property(key, value),
            },
        }
    }

    fn write_own(&self, key: &PropertyKey, value: Value) {
        let mut storage = self.storage.write();
        if let Some(offset) = storage.shape.get_offset(key) {
            storage.slots[offset] = PropertySlot::Data(value);
        }
    }

    fn create_data_property(&self, key: &PropertyKey, value: Value) -> VmResult<bool> {
        if let Some(existing) = self.get_own_property(key) {
            if !existing.is_writable() {
                return Ok(false);
            }
            return match &self.kind {
                ObjectKind::Exotic(proxy) if !key.is_private() => {
                    let (target, _) = proxy.checked("set")?;
                    target.create_data_property(key, value)
                }
                _ => {
                    self.write_own(key, value);
                    Ok(true)
                }
            };
        }
        match self.define_own_property(key.clone(), PropertyDescriptor::data(value)) {
            Ok(()) => Ok(true),
            Err(VmError::TypeError(_)) if !self.is_extensible() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Define an own property (generic path).
    ///
    /// Rejects keys that already exist, applies the attributes verbatim and
    /// routes public keys of exotic objects through the proxy's
    /// `define_property` trap. Private keys are always stored on the object
    /// itself and never observed by traps.
    pub fn define_own_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> VmResult<()> {
        if let ObjectKind::Exotic(proxy) = &self.kind
            && !key.is_private()
        {
            let (target, handler) = proxy.checked("defineProperty")?;
            if handler.define_property(target, &key, &desc)? {
                return Ok(());
            }
            return Err(VmError::type_error(format!(
                "'defineProperty' on proxy: trap returned falsish for property '{key}'"
            )));
        }

        self.ordinary_define_own_property(key, desc)
    }

    fn ordinary_define_own_property(
        &self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> VmResult<()> {
        let mut storage = self.storage.write();
        if storage.shape.has_key(&key) {
            return Err(VmError::duplicate_key(&key));
        }
        if !self.is_extensible() {
            return Err(VmError::type_error(format!(
                "Cannot define property {key}, object is not extensible"
            )));
        }

        let next = self
            .shapes
            .transition(&storage.shape, &key, desc.attributes())?;
        storage.slots.push(PropertySlot::from_descriptor(desc));
        storage.shape = next;
        Ok(())
    }

    /// Advance along a cached transition and store `value` in the new slot.
    ///
    /// Fails, handing the value back, when the object no longer has shape
    /// `before` or `after` is not a direct successor of it.
    pub(crate) fn write_transition(
        &self,
        before: &Arc<Shape>,
        after: &Arc<Shape>,
        value: Value,
    ) -> Result<(), Value> {
        let mut storage = self.storage.write();
        let successor = after
            .parent()
            .is_some_and(|parent| Arc::ptr_eq(parent, before));
        if !successor
            || !Arc::ptr_eq(&storage.shape, before)
            || storage.slots.len() != before.property_count()
            || !self.is_extensible()
        {
            return Err(value);
        }
        storage.slots.push(PropertySlot::Data(value));
        storage.shape = Arc::clone(after);
        Ok(())
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.storage.read();
        f.debug_struct("JsObject")
            .field("shape", &storage.shape.id())
            .field("properties", &storage.slots.len())
            .field("exotic", &self.is_exotic())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NativeFunction;
    use std::sync::atomic::AtomicUsize;

    fn plain(shapes: &Arc<ShapeTable>) -> ObjectRef {
        Arc::new(JsObject::new(None, Arc::clone(shapes)))
    }

    #[test]
    fn test_object_get_set() {
        let shapes = ShapeTable::new();
        let obj = plain(&shapes);

        assert!(obj.set(PropertyKey::string("foo"), Value::int32(42)).unwrap());
        assert_eq!(obj.get(&PropertyKey::string("foo")).unwrap(), Value::int32(42));
        assert!(obj.set(PropertyKey::string("foo"), Value::int32(7)).unwrap());
        assert_eq!(obj.get(&PropertyKey::string("foo")).unwrap(), Value::int32(7));
        assert_eq!(obj.shape().property_count(), 1);
    }

    #[test]
    fn test_define_rejects_duplicate() {
        let shapes = ShapeTable::new();
        let obj = plain(&shapes);
        let key = PropertyKey::string("x");

        obj.define_own_property(key.clone(), PropertyDescriptor::data(Value::int32(1)))
            .unwrap();
        let shape = obj.shape();
        let err = obj
            .define_own_property(key.clone(), PropertyDescriptor::data(Value::int32(2)))
            .unwrap_err();
        assert!(matches!(err, VmError::DuplicateKey { .. }));
        assert!(Arc::ptr_eq(&shape, &obj.shape()));
        assert_eq!(obj.get(&key).unwrap(), Value::int32(1));
    }

    #[test]
    fn test_define_applies_attributes_verbatim() {
        let shapes = ShapeTable::new();
        let obj = plain(&shapes);
        let key = PropertyKey::string("hidden");

        obj.define_own_property(
            key.clone(),
            PropertyDescriptor::data_with_attrs(Value::null(), PropertyAttributes::frozen()),
        )
        .unwrap();
        let desc = obj.get_own_property(&key).unwrap();
        assert_eq!(desc.attributes(), PropertyAttributes::frozen());
        assert!(!obj.set(key, Value::int32(1)).unwrap());
    }

    #[test]
    fn test_define_bypasses_prototype_setter_but_set_does_not() {
        let shapes = ShapeTable::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let setter = NativeFunction::new("set x", move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Value::undefined())
        });

        let proto = plain(&shapes);
        proto
            .define_own_property(
                PropertyKey::string("x"),
                PropertyDescriptor::accessor(None, Some(Value::function(setter))),
            )
            .unwrap();

        let assigned = Arc::new(JsObject::new(Some(Arc::clone(&proto)), Arc::clone(&shapes)));
        assert!(assigned.set(PropertyKey::string("x"), Value::int32(1)).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!assigned.has_own(&PropertyKey::string("x")));

        let defined = Arc::new(JsObject::new(Some(proto), shapes));
        defined
            .define_own_property(PropertyKey::string("x"), PropertyDescriptor::data(Value::int32(1)))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            defined.get(&PropertyKey::string("x")).unwrap(),
            Value::int32(1)
        );
    }

    #[test]
    fn test_non_extensible_rejects_define() {
        let shapes = ShapeTable::new();
        let obj = plain(&shapes);
        obj.prevent_extensions();
        let err = obj
            .define_own_property(PropertyKey::string("x"), PropertyDescriptor::data(Value::null()))
            .unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
        assert!(!obj.set(PropertyKey::string("x"), Value::null()).unwrap());
    }

    #[test]
    fn test_write_transition_requires_matching_shape() {
        let shapes = ShapeTable::new();
        let obj = plain(&shapes);
        let key = PropertyKey::string("a");
        let before = obj.shape();
        let after = shapes
            .transition(&before, &key, PropertyAttributes::data())
            .unwrap();

        obj.write_transition(&before, &after, Value::int32(1)).unwrap();
        assert_eq!(obj.get(&key).unwrap(), Value::int32(1));

        let rejected = obj.write_transition(&before, &after, Value::int32(2));
        assert_eq!(rejected, Err(Value::int32(2)));
    }

    #[test]
    fn test_computed_key_conversion() {
        assert_eq!(
            PropertyKey::from_value(&Value::int32(3)).unwrap(),
            PropertyKey::Index(3)
        );
        assert_eq!(
            PropertyKey::from_value(&Value::string("k")).unwrap(),
            PropertyKey::string("k")
        );
        assert_eq!(
            PropertyKey::from_value(&Value::string("1")).unwrap(),
            PropertyKey::Index(1)
        );
        assert_eq!(
            PropertyKey::from_value(&Value::number(1.0)).unwrap(),
            PropertyKey::Index(1)
        );
        assert_eq!(
            PropertyKey::from_value(&Value::number(-0.0)).unwrap(),
            PropertyKey::Index(0)
        );
        assert_eq!(
            PropertyKey::from_value(&Value::number(1.5)).unwrap(),
            PropertyKey::string("1.5")
        );
        assert_eq!(
            PropertyKey::from_value(&Value::number(f64::INFINITY)).unwrap(),
            PropertyKey::string("Infinity")
        );
        assert_eq!(PropertyKey::string("01"), PropertyKey::String(Arc::from("01")));
        assert_eq!(
            PropertyKey::string("4294967295"),
            PropertyKey::String(Arc::from("4294967295"))
        );
        assert!(PropertyKey::from_value(&Value::function(NativeFunction::new("f", |_, _| {
            Ok(Value::undefined())
        })))
        .is_err());
    }

    #[test]
    fn test_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JsObject>();
    }
}

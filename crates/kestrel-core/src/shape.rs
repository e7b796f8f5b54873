//! Hidden Classes (Shapes) and the shape table.
//!
//! A Shape records the own keys of an object, their attributes and the slot
//! each one lives in. Shapes are shared between objects with the same layout
//! through a transition tree keyed by `(key, attributes)`. Every class gets
//! its own root so that instance layouts of unrelated classes never meet.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::config::DEFAULT_MAX_SHAPES;
use crate::error::{VmError, VmResult};
use crate::object::{JsObject, PropertyAttributes, PropertyKey};

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

type TransitionKey = (PropertyKey, PropertyAttributes);

/// A Shape defines the layout of properties in an object.
pub struct Shape {
    id: u64,

    /// The parent shape from which this shape was transitioned.
    /// None for a root (empty) shape.
    parent: Option<Arc<Shape>>,

    /// The property key that was added to the parent to create this shape.
    key: Option<PropertyKey>,

    /// Attributes of `key`
    attributes: PropertyAttributes,

    /// Slot of `key` in the object's slot vector.
    offset: Option<usize>,

    /// Transitions from this shape to child shapes.
    /// Child -> Parent is strong, Parent -> Child is weak.
    transitions: RwLock<FxHashMap<TransitionKey, Weak<Shape>>>,

    /// All property offsets in this shape (inherited + own).
    property_map: FxHashMap<PropertyKey, usize>,

    /// Keys and attributes in insertion order
    keys_ordered: Vec<(PropertyKey, PropertyAttributes)>,

    /// Live-shape counter of the owning table, released on drop.
    live: Arc<AtomicUsize>,
}

impl Shape {
    fn root(live: &Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
            key: None,
            attributes: PropertyAttributes::default(),
            offset: None,
            transitions: RwLock::new(FxHashMap::default()),
            property_map: FxHashMap::default(),
            keys_ordered: Vec::new(),
            live: Arc::clone(live),
        })
    }

    /// Unique shape id, for logging and IC bookkeeping
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shape this one transitioned from
    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    /// Key added by the transition into this shape
    pub fn last_key(&self) -> Option<&PropertyKey> {
        self.key.as_ref()
    }

    /// Whether this is an empty root shape
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Find an existing transition for `(key, attributes)`.
    pub fn lookup_transition(
        &self,
        key: &PropertyKey,
        attributes: PropertyAttributes,
    ) -> Option<Arc<Shape>> {
        self.transitions
            .read()
            .get(&(key.clone(), attributes))
            .and_then(Weak::upgrade)
    }

    /// Create and register the transition for `(key, attributes)`.
    ///
    /// Returns the shape and whether it was newly created; a concurrent
    /// creator may have registered the edge first.
    fn add_transition(
        self: &Arc<Self>,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> (Arc<Self>, bool) {
        let mut transitions = self.transitions.write();

        // Double-check after acquiring the write lock
        if let Some(shape) = transitions
            .get(&(key.clone(), attributes))
            .and_then(Weak::upgrade)
        {
            return (shape, false);
        }

        let next_offset = self.keys_ordered.len();

        let mut next_property_map = self.property_map.clone();
        next_property_map.insert(key.clone(), next_offset);

        let mut next_keys_ordered = self.keys_ordered.clone();
        next_keys_ordered.push((key.clone(), attributes));

        let new_shape = Arc::new(Self {
            id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
            parent: Some(Arc::clone(self)),
            key: Some(key.clone()),
            attributes,
            offset: Some(next_offset),
            transitions: RwLock::new(FxHashMap::default()),
            property_map: next_property_map,
            keys_ordered: next_keys_ordered,
            live: Arc::clone(&self.live),
        });

        // Drop dead edges while we hold the lock
        transitions.retain(|_, weak| weak.strong_count() > 0);
        transitions.insert((key, attributes), Arc::downgrade(&new_shape));
        (new_shape, true)
    }

    /// Get the slot offset of a property key in this shape.
    pub fn get_offset(&self, key: &PropertyKey) -> Option<usize> {
        self.property_map.get(key).copied()
    }

    /// Get the attributes of a property key in this shape.
    pub fn attributes_of(&self, key: &PropertyKey) -> Option<PropertyAttributes> {
        self.get_offset(key).map(|offset| self.keys_ordered[offset].1)
    }

    /// Whether the key is an own property of objects with this shape
    #[inline]
    pub fn has_key(&self, key: &PropertyKey) -> bool {
        self.property_map.contains_key(key)
    }

    /// Get all own property keys in this shape in insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.keys_ordered.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Keys with their attributes in insertion order.
    pub fn entries(&self) -> &[(PropertyKey, PropertyAttributes)] {
        &self.keys_ordered
    }

    /// Get the number of properties defined in this shape.
    pub fn property_count(&self) -> usize {
        self.keys_ordered.len()
    }

    /// Number of live outgoing transitions
    pub fn transition_count(&self) -> usize {
        self.transitions
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Drop for Shape {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("offset", &self.offset)
            .field("attributes", &self.attributes)
            .field("property_count", &self.property_count())
            .finish()
    }
}

/// Owner of root shapes and the shape allocation budget.
///
/// The budget bounds the shapes alive at once; a dropped shape gives its
/// unit back.
pub struct ShapeTable {
    root: Arc<Shape>,
    live: Arc<AtomicUsize>,
    limit: usize,
}

impl ShapeTable {
    /// Create a table with the default budget
    pub fn new() -> Arc<Self> {
        Self::with_limit(DEFAULT_MAX_SHAPES)
    }

    /// Create a table that keeps at most `limit` shapes alive
    pub fn with_limit(limit: usize) -> Arc<Self> {
        let live = Arc::new(AtomicUsize::new(1));
        Arc::new(Self {
            root: Shape::root(&live),
            live,
            limit,
        })
    }

    /// Shared root for plain objects
    pub fn root(&self) -> &Arc<Shape> {
        &self.root
    }

    /// Fresh empty-instance root for a class
    pub fn new_root(&self) -> VmResult<Arc<Shape>> {
        self.charge()?;
        Ok(Shape::root(&self.live))
    }

    /// Find an existing transition.
    #[inline]
    pub fn lookup_transition(
        &self,
        shape: &Shape,
        key: &PropertyKey,
        attributes: PropertyAttributes,
    ) -> Option<Arc<Shape>> {
        shape.lookup_transition(key, attributes)
    }

    /// Find a transition, creating and registering it on a miss.
    pub fn transition(
        &self,
        shape: &Arc<Shape>,
        key: &PropertyKey,
        attributes: PropertyAttributes,
    ) -> VmResult<Arc<Shape>> {
        if let Some(next) = shape.lookup_transition(key, attributes) {
            return Ok(next);
        }

        self.charge()?;
        let (next, created) = shape.add_transition(key.clone(), attributes);
        if created {
            tracing::trace!(
                target: "kestrel::shape",
                from = shape.id(),
                to = next.id(),
                key = %key,
                "shape transition created"
            );
        } else {
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(next)
    }

    /// Current shape of an object
    #[inline]
    pub fn current_shape(&self, object: &JsObject) -> Arc<Shape> {
        object.shape()
    }

    /// Slot of `key` in objects of `shape`
    #[inline]
    pub fn slot_offset(&self, shape: &Shape, key: &PropertyKey) -> Option<usize> {
        shape.get_offset(key)
    }

    /// Shapes currently alive, including roots
    pub fn shape_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn charge(&self) -> VmResult<()> {
        let previous = self.live.fetch_add(1, Ordering::Relaxed);
        if previous >= self.limit {
            self.live.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(
                target: "kestrel::shape",
                limit = self.limit,
                "shape budget exhausted"
            );
            return Err(VmError::OutOfMemory);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShapeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeTable")
            .field("shape_count", &self.shape_count())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_is_shared() {
        let table = ShapeTable::new();
        let root = table.new_root().unwrap();
        let key = PropertyKey::string("x");

        let a = table.transition(&root, &key, PropertyAttributes::data()).unwrap();
        let b = table.transition(&root, &key, PropertyAttributes::data()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.get_offset(&key), Some(0));
        assert_eq!(root.transition_count(), 1);
    }

    #[test]
    fn test_attributes_split_transitions() {
        let table = ShapeTable::new();
        let root = table.new_root().unwrap();
        let key = PropertyKey::string("x");

        let data = table.transition(&root, &key, PropertyAttributes::data()).unwrap();
        let frozen = table.transition(&root, &key, PropertyAttributes::frozen()).unwrap();
        assert!(!Arc::ptr_eq(&data, &frozen));
        assert_eq!(frozen.attributes_of(&key), Some(PropertyAttributes::frozen()));
    }

    #[test]
    fn test_lookup_miss_before_creation() {
        let table = ShapeTable::new();
        let root = table.new_root().unwrap();
        let key = PropertyKey::string("y");
        assert!(
            table
                .lookup_transition(&root, &key, PropertyAttributes::data())
                .is_none()
        );
        let next = table.transition(&root, &key, PropertyAttributes::data()).unwrap();
        let found = table
            .lookup_transition(&root, &key, PropertyAttributes::data())
            .unwrap();
        assert!(Arc::ptr_eq(&next, &found));
    }

    #[test]
    fn test_key_order_and_offsets() {
        let table = ShapeTable::new();
        let root = table.new_root().unwrap();
        let a = PropertyKey::string("a");
        let b = PropertyKey::string("b");

        let s1 = table.transition(&root, &a, PropertyAttributes::data()).unwrap();
        let s2 = table.transition(&s1, &b, PropertyAttributes::data()).unwrap();
        assert_eq!(s2.own_keys(), vec![a.clone(), b.clone()]);
        assert_eq!(table.slot_offset(&s2, &b), Some(1));
        assert!(Arc::ptr_eq(s2.parent().unwrap(), &s1));
    }

    #[test]
    fn test_dead_transitions_are_recreated() {
        let table = ShapeTable::new();
        let root = table.new_root().unwrap();
        let key = PropertyKey::string("z");

        let first_id = table
            .transition(&root, &key, PropertyAttributes::data())
            .unwrap()
            .id();
        // The only strong reference was dropped above
        let second = table.transition(&root, &key, PropertyAttributes::data()).unwrap();
        assert_ne!(first_id, second.id());
    }

    #[test]
    fn test_budget_exhaustion() {
        let table = ShapeTable::with_limit(2);
        let root = table.new_root().unwrap();
        let err = table
            .transition(&root, &PropertyKey::string("a"), PropertyAttributes::data())
            .unwrap_err();
        assert!(matches!(err, VmError::OutOfMemory));
        assert_eq!(table.shape_count(), 2);
    }

    #[test]
    fn test_dropped_shapes_return_budget() {
        let table = ShapeTable::with_limit(3);
        let root = table.new_root().unwrap();
        let key = PropertyKey::string("a");

        for _ in 0..10 {
            let next = table.transition(&root, &key, PropertyAttributes::data()).unwrap();
            assert_eq!(table.shape_count(), 3);
            drop(next);
            assert_eq!(table.shape_count(), 2);
        }

        drop(root);
        assert_eq!(table.shape_count(), 1);
    }
}

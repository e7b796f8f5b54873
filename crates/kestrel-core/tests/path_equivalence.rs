//! Fast and slow define paths produce the same objects
//!
//! Random initializer sequences (including repeated keys) are run through a
//! warmed-up inline cache and through the generic define; own keys,
//! attributes, values, shapes and errors must match.

use std::sync::Arc;

use kestrel_bytecode::FeedbackSlot;
use kestrel_core::{
    DefineOwnIc, DefinePath, FeedbackVector, JsObject, PropertyAttributes, PropertyDescriptor,
    PropertyKey, Shape, ShapeTable, Value, VmError,
};
use proptest::prelude::*;

type Field = (u8, i32, bool);

fn key(id: u8) -> PropertyKey {
    if id % 4 == 3 {
        PropertyKey::Index(u32::from(id))
    } else {
        PropertyKey::string(&format!("f{id}"))
    }
}

fn attributes(hidden: bool) -> PropertyAttributes {
    if hidden {
        PropertyAttributes::private_field()
    } else {
        PropertyAttributes::data()
    }
}

fn instance(shapes: &Arc<ShapeTable>, root: &Arc<Shape>) -> JsObject {
    JsObject::with_shape(Arc::clone(root), None, Arc::clone(shapes))
}

fn run_ic(
    feedback: &FeedbackVector,
    target: &JsObject,
    fields: &[Field],
) -> Vec<Result<DefinePath, bool>> {
    fields
        .iter()
        .enumerate()
        .map(|(slot, &(id, value, hidden))| {
            DefineOwnIc::new(feedback, FeedbackSlot(slot as u32), 4)
                .define(target, key(id), Value::int32(value), attributes(hidden))
                .map_err(|err| matches!(err, VmError::DuplicateKey { .. }))
        })
        .collect()
}

fn run_generic(target: &JsObject, fields: &[Field]) -> Vec<Result<(), bool>> {
    fields
        .iter()
        .map(|&(id, value, hidden)| {
            target
                .define_own_property(
                    key(id),
                    PropertyDescriptor::data_with_attrs(Value::int32(value), attributes(hidden)),
                )
                .map_err(|err| matches!(err, VmError::DuplicateKey { .. }))
        })
        .collect()
}

proptest! {
    #[test]
    fn fast_and_slow_paths_agree(
        fields in prop::collection::vec((0u8..8, any::<i32>(), any::<bool>()), 1..12),
        warmups in 1usize..4,
    ) {
        let shapes = ShapeTable::new();
        let root = shapes.new_root().unwrap();
        let feedback = FeedbackVector::new(fields.len());

        let mut warm = Vec::new();
        for _ in 0..warmups {
            let target = instance(&shapes, &root);
            run_ic(&feedback, &target, &fields);
            warm.push(target);
        }

        let cached = instance(&shapes, &root);
        let cached_results = run_ic(&feedback, &cached, &fields);
        let generic = instance(&shapes, &root);
        let generic_results = run_generic(&generic, &fields);

        prop_assert_eq!(cached.own_properties(), generic.own_properties());
        prop_assert!(Arc::ptr_eq(&cached.shape(), &generic.shape()));

        for (cached, generic) in cached_results.iter().zip(&generic_results) {
            match (cached, generic) {
                (Ok(path), Ok(())) => prop_assert_eq!(*path, DefinePath::Fast),
                (Err(duplicate), Err(also_duplicate)) => {
                    prop_assert!(*duplicate);
                    prop_assert!(*also_duplicate);
                }
                _ => prop_assert!(false, "paths disagree: {:?} vs {:?}", cached, generic),
            }
        }
    }

    #[test]
    fn duplicate_leaves_target_unmodified(
        fields in prop::collection::vec((0u8..8, any::<i32>(), any::<bool>()), 1..8),
        repeat in any::<prop::sample::Index>(),
    ) {
        let shapes = ShapeTable::new();
        let root = shapes.new_root().unwrap();
        let feedback = FeedbackVector::new(fields.len() + 1);
        let target = instance(&shapes, &root);
        run_ic(&feedback, &target, &fields);

        let shape = target.shape();
        let before = target.own_properties();
        let (id, _, hidden) = fields[repeat.index(fields.len())];
        let err = DefineOwnIc::new(&feedback, FeedbackSlot(fields.len() as u32), 4)
            .define(&target, key(id), Value::null(), attributes(hidden))
            .unwrap_err();

        prop_assert!(matches!(err, VmError::DuplicateKey { .. }), "unexpected error");
        prop_assert!(Arc::ptr_eq(&shape, &target.shape()));
        prop_assert_eq!(before, target.own_properties());
    }
}

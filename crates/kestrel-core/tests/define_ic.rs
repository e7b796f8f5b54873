//! Define IC convergence tests
//!
//! Drives initializer sites through real class constructions and checks the
//! feedback state machine:
//! - Monomorphic after the first construction, fast path afterwards
//! - Polymorphic when a base class site sees several subclass layouts
//! - Megamorphic past the polymorphism limit or on a key change
//! - Reset on recompile

use std::sync::Arc;

use kestrel_bytecode::{ClassTemplate, FeedbackSlot, ValueExpr};
use kestrel_core::{
    ClassSetup, CompiledClass, DefinePath, FeedbackState, IcConfig, JsClass, PropertyAttributes,
    PropertyKey, Runtime, TargetKey, Value, VmError,
};

fn point_class(runtime: &Runtime) -> (Arc<CompiledClass>, Arc<JsClass>) {
    let template = ClassTemplate::builder("Point")
        .field("x", ValueExpr::int32(1))
        .field("y", ValueExpr::int32(2))
        .build()
        .unwrap();
    let compiled = runtime.compile(template).unwrap();
    let class = runtime
        .evaluate_class(&compiled, ClassSetup::new())
        .unwrap();
    (compiled, class)
}

fn fast_hits(compiled: &CompiledClass, slot: u32) -> u32 {
    compiled
        .feedback()
        .read_cell(FeedbackSlot(slot), |cell| cell.fast_hits())
        .unwrap()
}

fn slow_hits(compiled: &CompiledClass, slot: u32) -> u32 {
    compiled
        .feedback()
        .read_cell(FeedbackSlot(slot), |cell| cell.slow_hits())
        .unwrap()
}

/// Base class `B { x = 0 }` and `n` subclasses `class Dn extends B { dn = n }`
fn base_with_subclasses(
    runtime: &Runtime,
    n: usize,
) -> (Arc<CompiledClass>, Arc<JsClass>, Vec<Arc<JsClass>>) {
    let base_template = ClassTemplate::builder("B")
        .field("x", ValueExpr::int32(0))
        .build()
        .unwrap();
    let base_compiled = runtime.compile(base_template).unwrap();
    let base = runtime
        .evaluate_class(&base_compiled, ClassSetup::new())
        .unwrap();

    let subclasses = (0..n)
        .map(|i| {
            let template = ClassTemplate::builder(format!("D{i}"))
                .derived(true)
                .field(format!("d{i}"), ValueExpr::int32(i as i32))
                .build()
                .unwrap();
            let compiled = runtime.compile(template).unwrap();
            runtime
                .evaluate_class(&compiled, ClassSetup::new().extends(Arc::clone(&base)))
                .unwrap()
        })
        .collect();

    (base_compiled, base, subclasses)
}

#[test]
fn test_monomorphic_after_first_construction() {
    let runtime = Runtime::new();
    let (compiled, class) = point_class(&runtime);

    runtime.construct(&class).unwrap();
    assert_eq!(
        compiled.feedback().states(),
        vec![FeedbackState::Monomorphic, FeedbackState::Monomorphic]
    );
    assert_eq!(fast_hits(&compiled, 0), 0);

    for _ in 0..9 {
        runtime.construct(&class).unwrap();
    }
    assert_eq!(fast_hits(&compiled, 0), 9);
    assert_eq!(fast_hits(&compiled, 1), 9);
    assert_eq!(slow_hits(&compiled, 0), 1);
    assert_eq!(
        compiled.feedback().states(),
        vec![FeedbackState::Monomorphic, FeedbackState::Monomorphic]
    );
}

#[test]
fn test_instances_share_shape_and_values() {
    let runtime = Runtime::new();
    let (_compiled, class) = point_class(&runtime);

    let a = runtime.construct(&class).unwrap();
    let b = runtime.construct(&class).unwrap();
    let c = runtime.construct(&class).unwrap();
    assert!(Arc::ptr_eq(&a.shape(), &b.shape()));
    assert!(Arc::ptr_eq(&b.shape(), &c.shape()));
    assert_eq!(c.get(&PropertyKey::string("x")).unwrap(), Value::int32(1));
    assert_eq!(c.get(&PropertyKey::string("y")).unwrap(), Value::int32(2));
    assert_eq!(
        c.own_keys(),
        vec![PropertyKey::string("x"), PropertyKey::string("y")]
    );
}

#[test]
fn test_base_site_goes_polymorphic_across_subclasses() {
    let runtime = Runtime::new();
    let (base_compiled, _base, subclasses) = base_with_subclasses(&runtime, 3);
    let site = FeedbackSlot(0);

    runtime.construct(&subclasses[0]).unwrap();
    assert_eq!(
        base_compiled.feedback().state(site).unwrap(),
        FeedbackState::Monomorphic
    );

    runtime.construct(&subclasses[1]).unwrap();
    assert_eq!(
        base_compiled.feedback().state(site).unwrap(),
        FeedbackState::Polymorphic
    );

    runtime.construct(&subclasses[2]).unwrap();
    let entries = base_compiled
        .feedback()
        .read_cell(site, |cell| cell.entries().len())
        .unwrap();
    assert_eq!(entries, 3);

    // Every recorded pattern still takes the fast path and stays correct
    for (i, class) in subclasses.iter().enumerate() {
        let instance = runtime.construct(class).unwrap();
        assert_eq!(instance.get(&PropertyKey::string("x")).unwrap(), Value::int32(0));
        assert_eq!(
            instance.get(&PropertyKey::string(&format!("d{i}"))).unwrap(),
            Value::int32(i as i32)
        );
    }
    assert_eq!(fast_hits(&base_compiled, 0), 3);
}

#[test]
fn test_megamorphic_past_limit() {
    let runtime = Runtime::new();
    let (base_compiled, _base, subclasses) = base_with_subclasses(&runtime, 5);
    let site = FeedbackSlot(0);

    for class in &subclasses[..4] {
        runtime.construct(class).unwrap();
    }
    assert_eq!(
        base_compiled.feedback().state(site).unwrap(),
        FeedbackState::Polymorphic
    );

    runtime.construct(&subclasses[4]).unwrap();
    assert_eq!(
        base_compiled.feedback().state(site).unwrap(),
        FeedbackState::Megamorphic
    );

    let slow_before = slow_hits(&base_compiled, 0);
    for class in &subclasses {
        let instance = runtime.construct(class).unwrap();
        assert_eq!(instance.get(&PropertyKey::string("x")).unwrap(), Value::int32(0));
    }
    assert_eq!(slow_hits(&base_compiled, 0), slow_before + 5);
    assert_eq!(fast_hits(&base_compiled, 0), 0);
}

#[test]
fn test_polymorphism_limit_of_one() {
    let runtime = Runtime::with_config(IcConfig::new().max_polymorphism(1)).unwrap();
    let (base_compiled, _base, subclasses) = base_with_subclasses(&runtime, 2);

    runtime.construct(&subclasses[0]).unwrap();
    runtime.construct(&subclasses[1]).unwrap();
    assert_eq!(
        base_compiled.feedback().state(FeedbackSlot(0)).unwrap(),
        FeedbackState::Megamorphic
    );
}

#[test]
fn test_key_change_goes_megamorphic() {
    let runtime = Runtime::new();
    let template = ClassTemplate::builder("K")
        .computed_field(0, ValueExpr::int32(1))
        .build()
        .unwrap();
    let compiled = runtime.compile(template).unwrap();

    let first = runtime
        .evaluate_class(&compiled, ClassSetup::new().computed_key(Value::string("a")))
        .unwrap();
    runtime.construct(&first).unwrap();
    let recorded = compiled
        .feedback()
        .read_cell(FeedbackSlot(0), |cell| cell.target_key().clone())
        .unwrap();
    assert_eq!(recorded, TargetKey::Key(PropertyKey::string("a")));

    let second = runtime
        .evaluate_class(&compiled, ClassSetup::new().computed_key(Value::string("b")))
        .unwrap();
    let instance = runtime.construct(&second).unwrap();
    assert!(instance.has_own(&PropertyKey::string("b")));
    assert_eq!(
        compiled.feedback().state(FeedbackSlot(0)).unwrap(),
        FeedbackState::Megamorphic
    );
}

#[test]
fn test_reset_returns_to_uninitialized() {
    let runtime = Runtime::new();
    let (compiled, class) = point_class(&runtime);
    runtime.construct(&class).unwrap();
    runtime.construct(&class).unwrap();

    compiled.reset_feedback();
    assert_eq!(
        compiled.feedback().states(),
        vec![FeedbackState::Uninitialized, FeedbackState::Uninitialized]
    );

    runtime.construct(&class).unwrap();
    assert_eq!(
        compiled.feedback().states(),
        vec![FeedbackState::Monomorphic, FeedbackState::Monomorphic]
    );
}

#[test]
fn test_ic_reports_paths() {
    let runtime = Runtime::new();
    let (compiled, _class) = point_class(&runtime);
    let ic = runtime.define_ic(&compiled, FeedbackSlot(0));
    let key = PropertyKey::string("x");

    let a = runtime.new_object();
    let b = runtime.new_object();
    let first = ic
        .define(&a, key.clone(), Value::int32(1), PropertyAttributes::data())
        .unwrap();
    let second = ic
        .define(&b, key.clone(), Value::int32(2), PropertyAttributes::data())
        .unwrap();
    assert_eq!((first, second), (DefinePath::Slow, DefinePath::Fast));

    let err = ic
        .define(&b, key, Value::int32(3), PropertyAttributes::data())
        .unwrap_err();
    assert!(matches!(err, VmError::DuplicateKey { .. }));
    assert_eq!(b.get(&PropertyKey::string("x")).unwrap(), Value::int32(2));
}

#[test]
fn test_shape_budget_exhaustion() {
    let runtime = Runtime::with_config(IcConfig::new().max_shapes(3)).unwrap();
    let (_compiled, class) = point_class(&runtime);

    // Shared root, class root and the `x` shape fill the budget
    let err = runtime.construct(&class).unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory));
    assert!(err.is_fatal());
}

#[test]
fn test_megamorphic_constructions_stay_within_budget() {
    let runtime =
        Runtime::with_config(IcConfig::new().max_shapes(16).max_polymorphism(1)).unwrap();
    let (base_compiled, _base, subclasses) = base_with_subclasses(&runtime, 2);

    for subclass in &subclasses {
        runtime.construct(subclass).unwrap();
    }
    assert_eq!(
        base_compiled.feedback().state(FeedbackSlot(0)).unwrap(),
        FeedbackState::Megamorphic
    );
    let live = runtime.shapes().shape_count();

    for round in 0..200 {
        let instance = runtime.construct(&subclasses[round % 2]).unwrap();
        drop(instance);
        assert_eq!(runtime.shapes().shape_count(), live);
    }
}

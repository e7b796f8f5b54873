//! Define IC Performance Benchmarks
//!
//! Measures class construction throughput across different IC states.

use criterion::{Criterion, criterion_group, criterion_main};
use kestrel_bytecode::{ClassTemplate, KeyExpr, ValueExpr};
use kestrel_core::{ClassSetup, IcConfig, JsClass, NativeFunction, Runtime, Value};
use std::hint::black_box;
use std::sync::Arc;

fn eight_field_class(runtime: &Runtime) -> Arc<JsClass> {
    let mut builder = ClassTemplate::builder("Wide");
    for i in 0..8 {
        builder = builder.field(format!("f{i}"), ValueExpr::int32(i));
    }
    let compiled = runtime.compile(builder.build().unwrap()).unwrap();
    runtime
        .evaluate_class(&compiled, ClassSetup::new())
        .unwrap()
}

/// Benchmark: Monomorphic construction (every site hits its cache)
fn bench_monomorphic_construction(c: &mut Criterion) {
    let runtime = Runtime::new();
    let class = eight_field_class(&runtime);

    c.bench_function("construct_monomorphic_8_fields", |b| {
        b.iter(|| black_box(runtime.construct(&class).unwrap()));
    });
}

/// Benchmark: Same class with caching disabled by a polymorphism limit
/// that every base-class site exceeds
fn bench_megamorphic_construction(c: &mut Criterion) {
    let runtime = Runtime::with_config(IcConfig::new().max_polymorphism(1)).unwrap();
    let mut builder = ClassTemplate::builder("Base");
    for i in 0..8 {
        builder = builder.field(format!("f{i}"), ValueExpr::int32(i));
    }
    let base_compiled = runtime.compile(builder.build().unwrap()).unwrap();
    let base = runtime
        .evaluate_class(&base_compiled, ClassSetup::new())
        .unwrap();

    let subclasses: Vec<_> = (0..2)
        .map(|i| {
            let template = ClassTemplate::builder(format!("Sub{i}"))
                .derived(true)
                .build()
                .unwrap();
            runtime
                .evaluate_class(
                    &runtime.compile(template).unwrap(),
                    ClassSetup::new().extends(Arc::clone(&base)),
                )
                .unwrap()
        })
        .collect();
    for class in &subclasses {
        runtime.construct(class).unwrap();
    }

    c.bench_function("construct_megamorphic_8_fields", |b| {
        b.iter(|| black_box(runtime.construct(&subclasses[0]).unwrap()));
    });
}

/// Benchmark: Private field, brand and a field reading it back
fn bench_private_members(c: &mut Criterion) {
    let runtime = Runtime::new();
    let template = ClassTemplate::builder("A")
        .private_field("#a", ValueExpr::int32(0))
        .field("b", ValueExpr::ReadThis(KeyExpr::Private("#a".into())))
        .private_method("#m")
        .build()
        .unwrap();
    let compiled = runtime.compile(template).unwrap();
    let class = runtime
        .evaluate_class(
            &compiled,
            ClassSetup::new()
                .private_method("#m", NativeFunction::new("#m", |_, _| Ok(Value::undefined()))),
        )
        .unwrap();

    c.bench_function("construct_private_field_and_brand", |b| {
        b.iter(|| black_box(runtime.construct(&class).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_monomorphic_construction,
    bench_megamorphic_construction,
    bench_private_members
);
criterion_main!(benches);

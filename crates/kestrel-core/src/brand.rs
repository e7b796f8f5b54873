//! Class brands
//!
//! A class with private methods stamps each instance it constructs with its
//! brand: a frozen own property keyed by the brand symbol whose value is the
//! class context. Private method access checks for that key.
//!
//! The brand is normally installed through the define IC of the class's
//! brand site. When a derived constructor calls `super()` from a nested
//! closure the class context is found by walking the scope chain and the
//! brand is defined generically; such sites never cache.

use std::sync::Arc;

use kestrel_bytecode::{FeedbackSlot, ScopeDepth};

use crate::class::ClassContext;
use crate::context::ScopeRecord;
use crate::define_ic::{DefineOwnIc, DefinePath};
use crate::error::{VmError, VmResult};
use crate::feedback::FeedbackVector;
use crate::object::{JsObject, ObjectRef, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::Value;

fn brand_key(context: &ClassContext) -> VmResult<PropertyKey> {
    context
        .brand()
        .cloned()
        .map(PropertyKey::Private)
        .ok_or_else(|| VmError::internal(format!("class {} has no brand", context.name())))
}

/// Install the brand through the site's inline cache
pub fn install_brand(
    ic: &DefineOwnIc<'_>,
    instance: &JsObject,
    context: &Arc<ClassContext>,
) -> VmResult<DefinePath> {
    let key = brand_key(context)?;
    ic.define(
        instance,
        key,
        Value::class_context(Arc::clone(context)),
        PropertyAttributes::frozen(),
    )
}

/// Install the brand of the class bound `depth` scopes above `scope`.
///
/// Always uses the generic define and marks the site GenericOnly.
pub fn install_brand_from_scope(
    feedback: &FeedbackVector,
    slot: FeedbackSlot,
    instance: &JsObject,
    scope: &ScopeRecord,
    depth: ScopeDepth,
) -> VmResult<()> {
    let context = scope.class_context_at(depth)?;
    let key = brand_key(&context)?;
    feedback.with_cell(slot, |cell| {
        cell.record_slow();
        cell.mark_generic_only();
    })?;

    tracing::debug!(
        target: "kestrel::brand",
        class = context.name(),
        depth = depth.depth(),
        "installing brand from nested scope"
    );
    instance.define_own_property(
        key,
        PropertyDescriptor::data_with_attrs(
            Value::class_context(context),
            PropertyAttributes::frozen(),
        ),
    )
}

/// Whether `instance` carries the brand of `context`
pub fn has_brand(instance: &JsObject, context: &ClassContext) -> bool {
    context
        .brand()
        .is_some_and(|brand| instance.get_private(brand).is_some())
}

/// Load a private method after checking the receiver's brand
pub fn private_method(instance: &JsObject, context: &ClassContext, name: &str) -> VmResult<Value> {
    let method = context.method(name).ok_or_else(|| {
        VmError::type_error(format!(
            "Class {} does not declare private method {name}",
            context.name()
        ))
    })?;
    if !has_brand(instance, context) {
        return Err(VmError::uninitialized_access(name, context.name()));
    }
    Ok(method.clone())
}

/// Load a private method of the class bound `depth` scopes above `scope`
pub fn private_method_from_scope(
    instance: &JsObject,
    scope: &ScopeRecord,
    depth: ScopeDepth,
    name: &str,
) -> VmResult<Value> {
    let context = scope.class_context_at(depth)?;
    private_method(instance, &context, name)
}

/// Call a private method with `instance` as `this`
pub fn call_private_method(
    instance: &ObjectRef,
    context: &ClassContext,
    name: &str,
    args: &[Value],
) -> VmResult<Value> {
    let method = private_method(instance, context, name)?;
    method.call(&Value::Object(Arc::clone(instance)), args)
}

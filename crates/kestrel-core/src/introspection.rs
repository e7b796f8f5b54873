//! Debugger view of private methods
//!
//! Private methods live in class contexts, not on instances. An instance
//! reaches them through the brands it carries, so enumerating its brand
//! keys yields every private method callable on it.

use std::sync::Arc;

use crate::class::ClassContext;
use crate::object::{JsObject, PropertyKey};
use crate::value::Value;

/// One private method reachable from an instance
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateMethodEntry {
    /// Class that declared the method
    pub class_name: Arc<str>,
    /// Method spelling, including `#`
    pub name: Arc<str>,
    /// Method value
    pub value: Value,
}

/// Class contexts whose brands `instance` carries, in installation order
pub fn installed_brands(instance: &JsObject) -> Vec<Arc<ClassContext>> {
    instance
        .shape()
        .own_keys()
        .into_iter()
        .filter_map(|key| match key {
            PropertyKey::Private(name) if name.is_brand() => instance.get_private(&name),
            _ => None,
        })
        .filter_map(|value| value.as_class_context().cloned())
        .collect()
}

/// Private methods of every installed brand
pub fn private_methods(instance: &JsObject) -> Vec<PrivateMethodEntry> {
    installed_brands(instance)
        .iter()
        .flat_map(|context| {
            let class_name: Arc<str> = Arc::from(context.name());
            context
                .private_methods()
                .iter()
                .map(move |method| PrivateMethodEntry {
                    class_name: Arc::clone(&class_name),
                    name: Arc::from(method.name()),
                    value: method.value().clone(),
                })
        })
        .collect()
}

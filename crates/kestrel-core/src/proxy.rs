//! Proxy objects
//!
//! A proxy forwards fundamental operations on its target through a
//! [`ProxyHandler`]. Objects wrapping a proxy are exotic: definitions on
//! them are always observable and never take the inline-cache fast path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{VmError, VmResult};
use crate::object::{ObjectRef, PropertyDescriptor, PropertyKey};
use crate::value::Value;

/// Proxy traps
///
/// Every trap defaults to the ordinary operation on the target.
pub trait ProxyHandler: Send + Sync {
    /// `defineProperty` trap. Returning `Ok(false)` rejects the definition.
    fn define_property(
        &self,
        target: &ObjectRef,
        key: &PropertyKey,
        descriptor: &PropertyDescriptor,
    ) -> VmResult<bool> {
        target.define_own_property(key.clone(), descriptor.clone())?;
        Ok(true)
    }

    /// `get` trap
    fn get(&self, target: &ObjectRef, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
        target.get_with_receiver(key, receiver)
    }

    /// `set` trap
    fn set(
        &self,
        target: &ObjectRef,
        key: &PropertyKey,
        value: Value,
        receiver: &ObjectRef,
    ) -> VmResult<bool> {
        target.set_with_receiver(key, value, receiver)
    }
}

/// Handler with no traps; every operation reaches the target
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingHandler;

impl ProxyHandler for ForwardingHandler {}

/// A proxy: target, handler and revocation flag
pub struct JsProxy {
    target: ObjectRef,
    handler: Arc<dyn ProxyHandler>,
    revoked: AtomicBool,
}

impl std::fmt::Debug for JsProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_revoked() {
            write!(f, "Proxy {{ <revoked> }}")
        } else {
            write!(f, "Proxy {{ target: {:?} }}", self.target)
        }
    }
}

impl JsProxy {
    /// Create a new proxy
    pub fn new(target: ObjectRef, handler: Arc<dyn ProxyHandler>) -> Self {
        Self {
            target,
            handler,
            revoked: AtomicBool::new(false),
        }
    }

    /// Get the target object
    ///
    /// Returns `None` if the proxy has been revoked.
    pub fn target(&self) -> Option<&ObjectRef> {
        if self.is_revoked() {
            None
        } else {
            Some(&self.target)
        }
    }

    /// Get the handler
    ///
    /// Returns `None` if the proxy has been revoked.
    pub fn handler(&self) -> Option<&Arc<dyn ProxyHandler>> {
        if self.is_revoked() {
            None
        } else {
            Some(&self.handler)
        }
    }

    /// Check if this proxy has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Revoke this proxy
    ///
    /// After revocation, all trap operations will throw a TypeError.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }

    /// Target and handler for a trap, or a TypeError once revoked
    pub(crate) fn checked(&self, trap: &str) -> VmResult<(&ObjectRef, &Arc<dyn ProxyHandler>)> {
        if self.is_revoked() {
            return Err(VmError::type_error(format!(
                "Cannot perform '{trap}' on a proxy that has been revoked"
            )));
        }
        Ok((&self.target, &self.handler))
    }
}

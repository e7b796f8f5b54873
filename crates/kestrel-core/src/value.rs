//! Runtime values
//!
//! Values seen by initializer expressions. Heap references compare by
//! identity.

use std::fmt;
use std::sync::Arc;

use kestrel_bytecode::Literal;

use crate::class::ClassContext;
use crate::error::{VmError, VmResult};
use crate::object::ObjectRef;

type NativeFn = dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync;

/// A host function callable from the runtime
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    /// Wrap a host closure
    pub fn new(
        name: &str,
        func: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call with an explicit `this`
    pub fn call(&self, this: &Value, args: &[Value]) -> VmResult<Value> {
        (self.func)(this, args)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

/// A runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Small integer
    Int32(i32),
    /// Double
    Number(f64),
    /// String
    String(Arc<str>),
    /// Object reference
    Object(ObjectRef),
    /// Host function
    Function(NativeFunction),
    /// Class context reference (stored under brand keys)
    ClassContext(Arc<ClassContext>),
}

impl Value {
    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self::Undefined
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self::Null
    }

    /// Boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }

    /// Small integer value
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Self::Int32(n)
    }

    /// Double value
    #[inline]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// String value
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Object value
    pub fn object(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }

    /// Function value
    pub fn function(func: NativeFunction) -> Self {
        Self::Function(func)
    }

    /// Class context value
    pub fn class_context(ctx: Arc<ClassContext>) -> Self {
        Self::ClassContext(ctx)
    }

    /// Build a value from a descriptor literal
    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Undefined => Self::Undefined,
            Literal::Null => Self::Null,
            Literal::Bool(b) => Self::Boolean(*b),
            Literal::Int32(n) => Self::Int32(*n),
            Literal::Number(n) => Self::Number(*n),
            Literal::String(s) => Self::string(s),
        }
    }

    /// Check for `undefined`
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Get as integer
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Self::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get as function
    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            Self::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Get as class context
    pub fn as_class_context(&self) -> Option<&Arc<ClassContext>> {
        match self {
            Self::ClassContext(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Call this value if it is a function
    pub fn call(&self, this: &Value, args: &[Value]) -> VmResult<Value> {
        match self {
            Self::Function(func) => func.call(this, args),
            other => Err(VmError::type_error(format!("{other:?} is not a function"))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Int32(a), Self::Number(b)) | (Self::Number(b), Self::Int32(a)) => {
                f64::from(*a) == *b
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::ClassContext(a), Self::ClassContext(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(obj) => write!(f, "{obj:?}"),
            Self::Function(func) => write!(f, "{func:?}"),
            Self::ClassContext(ctx) => write!(f, "[ClassContext {}]", ctx.name()),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

//! VM error types

use thiserror::Error;

use crate::object::PropertyKey;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Define found the key already present as an own property
    #[error("TypeError: Cannot redefine own property '{key}'")]
    DuplicateKey {
        /// Display form of the key
        key: String,
    },

    /// Private method read before the class brand was installed
    #[error(
        "TypeError: Private method '{name}' of class {class} is not yet initialized on this object"
    )]
    UninitializedAccess {
        /// Private method name
        name: String,
        /// Class declaring the method
        class: String,
    },

    /// Type error (e.g. revoked proxy, non-extensible target)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (e.g. `this` before `super()`, missing scope)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Shape or feedback allocation budget exhausted
    #[error("OutOfMemory")]
    OutOfMemory,

    /// Malformed class template
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] kestrel_bytecode::BytecodeError),
}

impl VmError {
    /// Create a duplicate key error
    pub fn duplicate_key(key: &PropertyKey) -> Self {
        Self::DuplicateKey {
            key: key.to_string(),
        }
    }

    /// Create an uninitialized private access error
    pub fn uninitialized_access(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self::UninitializedAccess {
            name: name.into(),
            class: class.into(),
        }
    }

    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a reference error
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this is a fatal resource fault rather than a language error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory | Self::InternalError(_))
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;

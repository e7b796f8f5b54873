//! # Kestrel Bytecode
//!
//! Descriptor format handed from the front-end to the Kestrel runtime.
//!
//! ## Design Principles
//!
//! - **Declaration order**: one initializer descriptor per field or brand, in
//!   the order the class body declares them
//! - **One feedback slot per site**: slot `n` belongs to initializer `n`
//! - **Serializable**: templates round-trip through JSON for caching

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod initializer;
pub mod operand;
pub mod template;

pub use error::BytecodeError;
pub use initializer::{InitializerDescriptor, InitializerKind, KeyExpr, Literal, ValueExpr};
pub use operand::{ComputedKeyIndex, FeedbackSlot, HostClosureIndex, ScopeDepth};
pub use template::{ClassTemplate, ClassTemplateBuilder, SuperCallSite};

/// Descriptor format version
pub const DESCRIPTOR_VERSION: u32 = 1;

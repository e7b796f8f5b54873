//! # Kestrel Core
//!
//! Own-property definition for class construction.
//!
//! ## Design Principles
//!
//! - **Define, not assign**: initializers never hit setters or plain-object
//!   traps and never overwrite an existing key
//! - **Hidden classes**: per-class root shapes with shared transitions
//! - **Adaptive**: each initializer site caches the transitions it observes
//!   and falls back to the generic path whenever the target does not match
//! - **Thread-safe**: shapes, objects and feedback are `Send + Sync`

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod brand;
pub mod class;
pub mod config;
pub mod context;
pub mod define_ic;
pub mod error;
pub mod feedback;
pub mod introspection;
pub mod object;
pub mod proxy;
pub mod runtime;
pub mod shape;
pub mod symbol;
pub mod value;

pub use class::{ClassContext, ClassSetup, CompiledClass, Heritage, JsClass, PrivateMethod};
pub use config::{ConfigError, IcConfig};
pub use context::{ScopeKind, ScopeRecord};
pub use define_ic::{DefineOwnIc, DefinePath};
pub use error::{VmError, VmResult};
pub use feedback::{FeedbackCell, FeedbackState, FeedbackVector, TargetKey};
pub use introspection::PrivateMethodEntry;
pub use object::{JsObject, ObjectRef, PropertyAttributes, PropertyDescriptor, PropertyKey};
pub use proxy::{ForwardingHandler, JsProxy, ProxyHandler};
pub use runtime::Runtime;
pub use shape::{Shape, ShapeTable};
pub use symbol::PrivateName;
pub use value::{NativeFunction, Value};

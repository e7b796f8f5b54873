//! Initializer descriptors
//!
//! One descriptor per field or brand the front-end extracted from a class
//! body, in declaration order. Each descriptor owns one feedback slot.

use serde::{Deserialize, Serialize};

use crate::operand::{ComputedKeyIndex, FeedbackSlot, HostClosureIndex};

/// What an initializer site installs on the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitializerKind {
    /// `name = value`
    PublicNamed,
    /// `[expr] = value`
    PublicComputed,
    /// `#name = value`
    PrivateField,
    /// Brand stamp for a class with private methods
    PrivateMethodBrand,
}

impl InitializerKind {
    /// Whether the installed key is a private name or brand
    #[inline]
    pub fn is_private(self) -> bool {
        matches!(self, Self::PrivateField | Self::PrivateMethodBrand)
    }
}

/// Key expression of an initializer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyExpr {
    /// Identifier or string literal key
    Named(String),
    /// Key computed once when the class is evaluated
    Computed(ComputedKeyIndex),
    /// Private name, including the leading `#`
    Private(String),
    /// The class brand symbol
    Brand,
}

impl KeyExpr {
    /// Check that the key expression fits an initializer kind
    pub fn matches_kind(&self, kind: InitializerKind) -> bool {
        matches!(
            (kind, self),
            (InitializerKind::PublicNamed, KeyExpr::Named(_))
                | (InitializerKind::PublicComputed, KeyExpr::Computed(_))
                | (InitializerKind::PrivateField, KeyExpr::Private(_))
                | (InitializerKind::PrivateMethodBrand, KeyExpr::Brand)
        )
    }
}

/// Literal initializer values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Small integer
    Int32(i32),
    /// Double
    Number(f64),
    /// String
    String(String),
}

/// Value expression of an initializer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueExpr {
    /// A literal value; `Literal::Undefined` for `name;` declarations
    Literal(Literal),
    /// Read an own field of `this`, e.g. `b = this.#a`
    ReadThis(KeyExpr),
    /// Call a host closure bound at class evaluation with `this`
    Host(HostClosureIndex),
    /// Reference to the class context, used by brand sites
    ClassContext,
}

impl ValueExpr {
    /// `undefined`
    pub fn undefined() -> Self {
        Self::Literal(Literal::Undefined)
    }

    /// Integer literal
    pub fn int32(value: i32) -> Self {
        Self::Literal(Literal::Int32(value))
    }

    /// String literal
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }
}

/// A single initializer site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializerDescriptor {
    /// Initializer kind
    pub kind: InitializerKind,
    /// Key expression
    pub key: KeyExpr,
    /// Value expression
    pub value: ValueExpr,
    /// Feedback cell owned by this site
    pub slot: FeedbackSlot,
}

impl InitializerDescriptor {
    /// Create a descriptor
    pub fn new(kind: InitializerKind, key: KeyExpr, value: ValueExpr, slot: FeedbackSlot) -> Self {
        Self {
            kind,
            key,
            value,
            slot,
        }
    }

    /// Brand site descriptor
    pub fn brand(slot: FeedbackSlot) -> Self {
        Self::new(
            InitializerKind::PrivateMethodBrand,
            KeyExpr::Brand,
            ValueExpr::ClassContext,
            slot,
        )
    }
}

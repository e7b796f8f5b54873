//! Private names and brand symbols
//!
//! Every private name is a fresh identity: two classes declaring `#x` get
//! distinct keys, and nothing outside the declaring class can construct one.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PRIVATE_ID: AtomicU64 = AtomicU64::new(1);

/// What a private name stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivateNameKind {
    /// `#field`
    Field,
    /// Class brand guarding private methods
    Brand,
}

#[derive(Debug)]
struct PrivateNameData {
    id: u64,
    description: Arc<str>,
    kind: PrivateNameKind,
}

/// An unforgeable private key
#[derive(Clone)]
pub struct PrivateName(Arc<PrivateNameData>);

impl PrivateName {
    /// Create a private field name, e.g. `#a`
    pub fn field(description: &str) -> Self {
        Self::with_kind(description, PrivateNameKind::Field)
    }

    /// Create the brand symbol of a class
    pub fn brand(class_name: &str) -> Self {
        Self::with_kind(&format!("#<brand {class_name}>"), PrivateNameKind::Brand)
    }

    fn with_kind(description: &str, kind: PrivateNameKind) -> Self {
        Self(Arc::new(PrivateNameData {
            id: NEXT_PRIVATE_ID.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description),
            kind,
        }))
    }

    /// Unique identity
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Source spelling
    pub fn description(&self) -> &str {
        &self.0.description
    }

    /// Field or brand
    #[inline]
    pub fn kind(&self) -> PrivateNameKind {
        self.0.kind
    }

    /// Whether this is a class brand
    #[inline]
    pub fn is_brand(&self) -> bool {
        self.0.kind == PrivateNameKind::Brand
    }
}

impl PartialEq for PrivateName {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for PrivateName {}

impl Hash for PrivateName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for PrivateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.0.description, self.0.id)
    }
}

impl fmt::Display for PrivateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.description)
    }
}

//! Descriptor errors

use thiserror::Error;

/// Errors raised while building or decoding class templates
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Unsupported descriptor format version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),

    /// More than one brand site in a single class
    #[error("Class '{0}' declares more than one brand site")]
    DuplicateBrandSite(String),

    /// Brand site is not the first initializer
    #[error("Brand site of class '{0}' must be the first initializer")]
    MisplacedBrandSite(String),

    /// Private methods declared without a brand site
    #[error("Class '{0}' has private methods but no brand site")]
    MissingBrandSite(String),

    /// Same private name declared twice
    #[error("Duplicate private name '{name}' in class '{class}'")]
    DuplicatePrivateName {
        /// Class being built
        class: String,
        /// Offending private name
        name: String,
    },

    /// Private name not spelled with a leading `#`
    #[error("Invalid private name '{0}'")]
    InvalidPrivateName(String),

    /// Key expression does not match the initializer kind
    #[error("Initializer {index} of class '{class}' has a key that does not match its kind")]
    KindMismatch {
        /// Class being built
        class: String,
        /// Position in the initializer list
        index: usize,
    },

    /// Feedback slot out of range or assigned twice
    #[error("Invalid feedback slot {0}")]
    InvalidFeedbackSlot(u32),

    /// Computed-key indices leave a gap
    #[error("Class '{class}' never uses computed key {missing}")]
    SparseComputedKeys {
        /// Class being built
        class: String,
        /// First unused index below the highest one
        missing: u32,
    },

    /// Nested `super()` depth that cannot reach the class scope
    #[error("Invalid scope depth {0} for a nested super call")]
    InvalidScopeDepth(u16),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for descriptor operations
pub type Result<T> = std::result::Result<T, BytecodeError>;

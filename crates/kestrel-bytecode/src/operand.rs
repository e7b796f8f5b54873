//! Descriptor operands

use serde::{Deserialize, Serialize};

/// Index of a feedback cell in a compiled class's feedback vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FeedbackSlot(pub u32);

impl FeedbackSlot {
    /// Create a new feedback slot
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl From<u32> for FeedbackSlot {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// Index into the computed keys bound when a class is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ComputedKeyIndex(pub u32);

impl ComputedKeyIndex {
    /// Create a new computed key index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Index into the host initializer closures bound when a class is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct HostClosureIndex(pub u32);

impl HostClosureIndex {
    /// Create a new host closure index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Static nesting depth between an activation and an enclosing scope
///
/// Depth 0 is the activation's own scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ScopeDepth(pub u16);

impl ScopeDepth {
    /// Create a new scope depth
    #[inline]
    pub const fn new(depth: u16) -> Self {
        Self(depth)
    }

    /// Get depth value
    #[inline]
    pub const fn depth(self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_slot() {
        let s = FeedbackSlot::new(7);
        assert_eq!(s.index(), 7);
        assert_eq!(FeedbackSlot::from(7), s);
    }

    #[test]
    fn test_scope_depth_default_is_own_scope() {
        assert_eq!(ScopeDepth::default().depth(), 0);
    }
}

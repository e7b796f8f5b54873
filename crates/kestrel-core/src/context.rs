//! Lexical scope chain
//!
//! Scopes are parent-linked records. A class scope carries the class
//! context; constructors and the closures nested in them hang below it, so
//! code inside a closure reaches the class context by walking a depth known
//! when the class was compiled.

use std::sync::Arc;

use kestrel_bytecode::ScopeDepth;

use crate::class::ClassContext;
use crate::error::{VmError, VmResult};

/// What introduced a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level scope
    Global,
    /// Class body; binds the class context
    Class,
    /// Function activation (constructors)
    Function,
    /// Arrow function or other nested closure
    Closure,
}

/// One scope in the chain
#[derive(Debug)]
pub struct ScopeRecord {
    kind: ScopeKind,
    parent: Option<Arc<ScopeRecord>>,
    class_context: Option<Arc<ClassContext>>,
}

impl ScopeRecord {
    /// Create the global scope
    pub fn global() -> Arc<Self> {
        Arc::new(Self {
            kind: ScopeKind::Global,
            parent: None,
            class_context: None,
        })
    }

    /// Create a class scope binding `context` below `parent`
    pub fn class(parent: &Arc<Self>, context: Arc<ClassContext>) -> Arc<Self> {
        Arc::new(Self {
            kind: ScopeKind::Class,
            parent: Some(Arc::clone(parent)),
            class_context: Some(context),
        })
    }

    /// Create a function or closure scope below `parent`
    pub fn child(parent: &Arc<Self>, kind: ScopeKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            parent: Some(Arc::clone(parent)),
            class_context: None,
        })
    }

    /// Scope kind
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Enclosing scope
    pub fn parent(&self) -> Option<&Arc<ScopeRecord>> {
        self.parent.as_ref()
    }

    /// Class context bound by this scope
    pub fn class_context(&self) -> Option<&Arc<ClassContext>> {
        self.class_context.as_ref()
    }

    /// Walk `depth` hops up the chain
    pub fn ancestor(&self, depth: ScopeDepth) -> VmResult<&ScopeRecord> {
        let mut scope = self;
        for hop in 0..depth.depth() {
            scope = scope.parent.as_deref().ok_or_else(|| {
                VmError::reference_error(format!(
                    "scope chain ends after {hop} of {} hops",
                    depth.depth()
                ))
            })?;
        }
        Ok(scope)
    }

    /// Class context bound exactly `depth` hops up
    pub fn class_context_at(&self, depth: ScopeDepth) -> VmResult<Arc<ClassContext>> {
        self.ancestor(depth)?.class_context.clone().ok_or_else(|| {
            VmError::reference_error(format!(
                "no class context bound at scope depth {}",
                depth.depth()
            ))
        })
    }

    /// Number of hops to the nearest enclosing class scope
    pub fn depth_to_class(&self) -> Option<ScopeDepth> {
        let mut scope = self;
        let mut depth = 0u16;
        loop {
            if scope.kind == ScopeKind::Class {
                return Some(ScopeDepth(depth));
            }
            scope = scope.parent.as_deref()?;
            depth = depth.checked_add(1)?;
        }
    }
}

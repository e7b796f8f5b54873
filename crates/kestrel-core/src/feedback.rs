//! Feedback cells for define-own-property sites
//!
//! Each initializer site of a compiled class owns one [`FeedbackCell`] in the
//! class's [`FeedbackVector`]. A cell remembers the key the site defines and
//! up to `K` observed `(shape_before, shape_after)` transitions:
//!
//! ```text
//! Uninitialized -> Monomorphic -> Polymorphic -> Megamorphic
//! ```
//!
//! Megamorphic and GenericOnly are terminal until the feedback is reset.

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;

use kestrel_bytecode::FeedbackSlot;

use crate::config::MAX_POLYMORPHISM;
use crate::error::{VmError, VmResult};
use crate::object::PropertyKey;
use crate::shape::Shape;

/// Inline cache state of a define site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackState {
    /// Nothing observed yet
    #[default]
    Uninitialized,
    /// Exactly one transition cached
    Monomorphic,
    /// Two to `K` transitions cached
    Polymorphic,
    /// Too many transitions or keys; slow path only
    Megamorphic,
    /// Site must never cache (indirect brand installation)
    GenericOnly,
}

/// Key expected at a site
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetKey {
    /// No key observed yet
    #[default]
    Uninitialized,
    /// The site has only ever defined this key
    Key(PropertyKey),
    /// The site defined more than one key
    Megamorphic,
}

/// One cached transition
#[derive(Debug, Clone)]
pub struct TransitionFeedback {
    before: Arc<Shape>,
    after: Arc<Shape>,
    hits: u32,
}

impl TransitionFeedback {
    /// Shape the target must have for this entry to apply
    pub fn before(&self) -> &Arc<Shape> {
        &self.before
    }

    /// Shape the target has after the define
    pub fn after(&self) -> &Arc<Shape> {
        &self.after
    }

    /// Fast-path hits through this entry
    pub fn hits(&self) -> u32 {
        self.hits
    }
}

/// Feedback for one define site
#[derive(Debug, Default)]
pub struct FeedbackCell {
    target_key: TargetKey,
    entries: SmallVec<[TransitionFeedback; MAX_POLYMORPHISM]>,
    state: FeedbackState,
    slow_hits: u32,
}

impl FeedbackCell {
    /// Create an uninitialized cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> FeedbackState {
        self.state
    }

    /// Key recorded for the site
    pub fn target_key(&self) -> &TargetKey {
        &self.target_key
    }

    /// Cached transitions in the order they were recorded
    pub fn entries(&self) -> &[TransitionFeedback] {
        &self.entries
    }

    /// Whether the fast path may be consulted at all
    #[inline]
    pub fn is_cacheable(&self) -> bool {
        !matches!(
            self.state,
            FeedbackState::Megamorphic | FeedbackState::GenericOnly
        )
    }

    /// Cached successor of `before`, compared by shape identity
    pub fn lookup(&self, before: &Arc<Shape>) -> Option<&Arc<Shape>> {
        self.entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.before, before))
            .map(|entry| &entry.after)
    }

    /// Count a fast-path hit through the entry for `before`
    pub fn record_hit(&mut self, before: &Arc<Shape>) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| Arc::ptr_eq(&entry.before, before))
        {
            entry.hits = entry.hits.saturating_add(1);
        }
    }

    /// Count a slow-path execution
    #[inline]
    pub fn record_slow(&mut self) {
        self.slow_hits = self.slow_hits.saturating_add(1);
    }

    /// Fast-path hits across all entries
    pub fn fast_hits(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |sum, entry| sum.saturating_add(entry.hits))
    }

    /// Slow-path executions since the last reset
    pub fn slow_hits(&self) -> u32 {
        self.slow_hits
    }

    /// Check the key defined by this execution against the recorded one.
    ///
    /// The first key observed is adopted. A different key sends the cell
    /// megamorphic and returns false.
    pub fn observe_key(&mut self, key: &PropertyKey) -> bool {
        match &self.target_key {
            TargetKey::Uninitialized => {
                self.target_key = TargetKey::Key(key.clone());
                true
            }
            TargetKey::Key(expected) if expected == key => true,
            TargetKey::Key(_) => {
                self.mark_megamorphic();
                false
            }
            TargetKey::Megamorphic => false,
        }
    }

    /// Record a transition observed on the slow path.
    ///
    /// Pairs are deduplicated by `before` identity. Recording more than
    /// `max_polymorphism` distinct pairs sends the cell megamorphic.
    pub fn record(
        &mut self,
        key: &PropertyKey,
        before: Arc<Shape>,
        after: Arc<Shape>,
        max_polymorphism: usize,
    ) {
        if !self.is_cacheable() || !self.observe_key(key) {
            return;
        }
        if self.lookup(&before).is_some() {
            return;
        }
        if self.entries.len() >= max_polymorphism.clamp(1, MAX_POLYMORPHISM) {
            self.mark_megamorphic();
            return;
        }

        self.entries.push(TransitionFeedback {
            before,
            after,
            hits: 0,
        });
        let next = if self.entries.len() == 1 {
            FeedbackState::Monomorphic
        } else {
            FeedbackState::Polymorphic
        };
        if next != self.state {
            tracing::trace!(
                target: "kestrel::ic",
                from = ?self.state,
                to = ?next,
                key = %key,
                entries = self.entries.len(),
                "feedback state transition"
            );
            self.state = next;
        }
    }

    /// Give up caching for this site
    pub fn mark_megamorphic(&mut self) {
        if self.state == FeedbackState::Megamorphic {
            return;
        }
        tracing::debug!(
            target: "kestrel::ic",
            from = ?self.state,
            entries = self.entries.len(),
            "define site went megamorphic"
        );
        self.state = FeedbackState::Megamorphic;
        self.target_key = TargetKey::Megamorphic;
        self.entries.clear();
    }

    /// Forbid caching at this site
    pub fn mark_generic_only(&mut self) {
        self.state = FeedbackState::GenericOnly;
        self.entries.clear();
    }

    /// Return to the uninitialized state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Feedback cells of a compiled class, indexed by [`FeedbackSlot`]
#[derive(Debug, Default)]
pub struct FeedbackVector {
    cells: RwLock<Vec<FeedbackCell>>,
}

impl FeedbackVector {
    /// Create `len` uninitialized cells
    pub fn new(len: usize) -> Self {
        Self {
            cells: RwLock::new((0..len).map(|_| FeedbackCell::new()).collect()),
        }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// Whether the vector has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Run `f` with exclusive access to one cell
    pub fn with_cell<R>(
        &self,
        slot: FeedbackSlot,
        f: impl FnOnce(&mut FeedbackCell) -> R,
    ) -> VmResult<R> {
        let mut cells = self.cells.write();
        let cell = cells
            .get_mut(slot.index() as usize)
            .ok_or_else(|| VmError::internal(format!("unknown feedback slot {}", slot.index())))?;
        Ok(f(cell))
    }

    /// Run `f` with shared access to one cell
    pub fn read_cell<R>(&self, slot: FeedbackSlot, f: impl FnOnce(&FeedbackCell) -> R) -> VmResult<R> {
        let cells = self.cells.read();
        let cell = cells
            .get(slot.index() as usize)
            .ok_or_else(|| VmError::internal(format!("unknown feedback slot {}", slot.index())))?;
        Ok(f(cell))
    }

    /// State of one cell
    pub fn state(&self, slot: FeedbackSlot) -> VmResult<FeedbackState> {
        self.read_cell(slot, FeedbackCell::state)
    }

    /// States of all cells in slot order
    pub fn states(&self) -> Vec<FeedbackState> {
        self.cells.read().iter().map(FeedbackCell::state).collect()
    }

    /// Reset every cell to Uninitialized
    pub fn reset(&self) {
        for cell in self.cells.write().iter_mut() {
            cell.reset();
        }
    }
}

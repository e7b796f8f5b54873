//! Define-own-property inline cache
//!
//! Every field initializer runs through [`DefineOwnIc::define`]. When the
//! target's current shape matches a transition recorded in the site's
//! feedback cell, the value is written straight into the slot implied by
//! the cached successor shape. Anything else (an exotic target, an existing
//! key, a non-extensible target, an unseen shape) degrades to the generic
//! [`JsObject::define_own_property`], after which the observed transition is
//! recorded for next time.

use std::sync::Arc;

use kestrel_bytecode::FeedbackSlot;

use crate::error::VmResult;
use crate::feedback::FeedbackVector;
use crate::object::{JsObject, PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::Value;

/// Which path a define took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinePath {
    /// Cached transition, in-place slot write
    Fast,
    /// Generic define-own-property
    Slow,
}

enum Decision {
    Fast,
    Slow { record: bool, value: Value },
}

/// Inline cache bound to one site of a feedback vector
#[derive(Debug, Clone, Copy)]
pub struct DefineOwnIc<'a> {
    feedback: &'a FeedbackVector,
    slot: FeedbackSlot,
    max_polymorphism: usize,
}

impl<'a> DefineOwnIc<'a> {
    /// Bind the IC to `slot`, caching at most `max_polymorphism` transitions
    pub fn new(feedback: &'a FeedbackVector, slot: FeedbackSlot, max_polymorphism: usize) -> Self {
        Self {
            feedback,
            slot,
            max_polymorphism,
        }
    }

    /// Feedback slot of this site
    pub fn slot(&self) -> FeedbackSlot {
        self.slot
    }

    /// Define `key` on `target` with define semantics.
    ///
    /// Exactly one own property is added on success. Fails with
    /// `DuplicateKey` when the key already exists and leaves the target
    /// untouched.
    pub fn define(
        &self,
        target: &JsObject,
        key: PropertyKey,
        value: Value,
        attributes: PropertyAttributes,
    ) -> VmResult<DefinePath> {
        let before = target.shape();

        let decision = self.feedback.with_cell(self.slot, |cell| {
            if !cell.is_cacheable() || !cell.observe_key(&key) {
                cell.record_slow();
                return Decision::Slow {
                    record: false,
                    value,
                };
            }
            if target.is_exotic() || !target.is_extensible() || before.has_key(&key) {
                cell.record_slow();
                return Decision::Slow {
                    record: false,
                    value,
                };
            }

            let cached = cell.lookup(&before).cloned().filter(|after| {
                after.last_key() == Some(&key) && after.attributes_of(&key) == Some(attributes)
            });
            let Some(after) = cached else {
                cell.record_slow();
                return Decision::Slow {
                    record: true,
                    value,
                };
            };

            match target.write_transition(&before, &after, value) {
                Ok(()) => {
                    cell.record_hit(&before);
                    Decision::Fast
                }
                Err(value) => {
                    cell.record_slow();
                    Decision::Slow {
                        record: false,
                        value,
                    }
                }
            }
        })?;

        let (record, value) = match decision {
            Decision::Fast => return Ok(DefinePath::Fast),
            Decision::Slow { record, value } => (record, value),
        };

        target.define_own_property(
            key.clone(),
            PropertyDescriptor::data_with_attrs(value, attributes),
        )?;

        if record {
            let after = target.shape();
            if after
                .parent()
                .is_some_and(|parent| Arc::ptr_eq(parent, &before))
            {
                let limit = self.max_polymorphism;
                self.feedback.with_cell(self.slot, |cell| {
                    cell.record(&key, before, after, limit);
                })?;
            }
        }

        tracing::trace!(
            target: "kestrel::ic",
            slot = self.slot.index(),
            key = %key,
            "define took the slow path"
        );
        Ok(DefinePath::Slow)
    }
}

//! Class templates
//!
//! A `ClassTemplate` is what the front-end hands to the runtime for one
//! class body: the ordered initializer list, the private method names and
//! how the constructor reaches its base class.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::DESCRIPTOR_VERSION;
use crate::error::{BytecodeError, Result};
use crate::initializer::{InitializerDescriptor, InitializerKind, KeyExpr, ValueExpr};
use crate::operand::{ComputedKeyIndex, FeedbackSlot, ScopeDepth};

/// Where a derived constructor issues its `super()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SuperCallSite {
    /// `super()` in the constructor's own activation
    #[default]
    Direct,
    /// `super()` inside a nested closure (e.g. an arrow function) whose
    /// scope is `depth` levels below the class scope. The constructor
    /// itself sits at depth 1, so nested closures start at 2.
    Nested {
        /// Scope hops from the closure to the class scope
        depth: ScopeDepth,
    },
}

/// Front-end output for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTemplate {
    /// Descriptor format version
    pub version: u32,
    /// Class name (empty for anonymous classes)
    pub name: String,
    /// Whether the class has an `extends` clause
    pub derived: bool,
    /// Location of the `super()` call for derived classes
    pub super_call: SuperCallSite,
    /// Initializer sites in declaration order
    pub initializers: Vec<InitializerDescriptor>,
    /// Private method names, including the leading `#`
    pub private_methods: Vec<String>,
}

impl ClassTemplate {
    /// Create a new template builder
    pub fn builder(name: impl Into<String>) -> ClassTemplateBuilder {
        ClassTemplateBuilder::new(name)
    }

    /// Class name or `<anonymous>`
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }

    /// Number of feedback cells a compiled unit needs
    pub fn feedback_slot_count(&self) -> usize {
        self.initializers.len()
    }

    /// Whether instances carry a brand
    pub fn has_brand(&self) -> bool {
        self.initializers
            .first()
            .is_some_and(|i| i.kind == InitializerKind::PrivateMethodBrand)
    }

    /// Number of computed keys the class expects at evaluation
    pub fn computed_key_count(&self) -> usize {
        self.initializers
            .iter()
            .filter_map(|i| match i.key {
                KeyExpr::Computed(ComputedKeyIndex(idx)) => Some(idx as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Private field names in declaration order
    pub fn private_fields(&self) -> impl Iterator<Item = &str> {
        self.initializers.iter().filter_map(|i| match &i.key {
            KeyExpr::Private(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Check the invariants the runtime relies on
    pub fn validate(&self) -> Result<()> {
        if self.version != DESCRIPTOR_VERSION {
            return Err(BytecodeError::UnsupportedVersion(self.version));
        }

        let class = self.display_name().to_string();
        if let SuperCallSite::Nested { depth } = self.super_call
            && depth.depth() < 2
        {
            return Err(BytecodeError::InvalidScopeDepth(depth.depth()));
        }
        let mut private_names = FxHashSet::default();
        let mut computed_keys = FxHashSet::default();
        let mut brand_sites = 0usize;

        for (index, init) in self.initializers.iter().enumerate() {
            if init.slot.index() as usize != index {
                return Err(BytecodeError::InvalidFeedbackSlot(init.slot.index()));
            }
            if !init.key.matches_kind(init.kind) {
                return Err(BytecodeError::KindMismatch {
                    class: class.clone(),
                    index,
                });
            }
            match &init.key {
                KeyExpr::Brand => {
                    brand_sites += 1;
                    if brand_sites > 1 {
                        return Err(BytecodeError::DuplicateBrandSite(class));
                    }
                    if index != 0 {
                        return Err(BytecodeError::MisplacedBrandSite(class));
                    }
                }
                KeyExpr::Private(name) => check_private_name(&class, name, &mut private_names)?,
                KeyExpr::Computed(ComputedKeyIndex(idx)) => {
                    computed_keys.insert(*idx);
                }
                _ => {}
            }
        }

        if let Some(missing) =
            (0..self.computed_key_count() as u32).find(|idx| !computed_keys.contains(idx))
        {
            return Err(BytecodeError::SparseComputedKeys { class, missing });
        }

        for name in &self.private_methods {
            check_private_name(&class, name, &mut private_names)?;
        }
        if !self.private_methods.is_empty() && brand_sites == 0 {
            return Err(BytecodeError::MissingBrandSite(class));
        }

        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let template: Self = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }
}

fn check_private_name<'a>(
    class: &str,
    name: &'a str,
    seen: &mut FxHashSet<&'a str>,
) -> Result<()> {
    if !name.starts_with('#') || name.len() < 2 {
        return Err(BytecodeError::InvalidPrivateName(name.to_string()));
    }
    if !seen.insert(name) {
        return Err(BytecodeError::DuplicatePrivateName {
            class: class.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Builder for class templates
///
/// Feedback slots are assigned in declaration order when the template is
/// built. A brand site is emitted first whenever a private method exists.
#[derive(Debug, Default)]
pub struct ClassTemplateBuilder {
    name: String,
    derived: bool,
    super_call: SuperCallSite,
    fields: Vec<(InitializerKind, KeyExpr, ValueExpr)>,
    private_methods: Vec<String>,
}

impl ClassTemplateBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Mark the class as having an `extends` clause
    pub fn derived(mut self, value: bool) -> Self {
        self.derived = value;
        self
    }

    /// Issue `super()` from a nested closure at the given depth
    pub fn super_from_closure(mut self, depth: u16) -> Self {
        self.derived = true;
        self.super_call = SuperCallSite::Nested {
            depth: ScopeDepth(depth),
        };
        self
    }

    /// Add `name = value`
    pub fn field(mut self, name: impl Into<String>, value: ValueExpr) -> Self {
        self.fields.push((
            InitializerKind::PublicNamed,
            KeyExpr::Named(name.into()),
            value,
        ));
        self
    }

    /// Add `[computed] = value`
    pub fn computed_field(mut self, index: u32, value: ValueExpr) -> Self {
        self.fields.push((
            InitializerKind::PublicComputed,
            KeyExpr::Computed(ComputedKeyIndex(index)),
            value,
        ));
        self
    }

    /// Add `#name = value`
    pub fn private_field(mut self, name: impl Into<String>, value: ValueExpr) -> Self {
        self.fields.push((
            InitializerKind::PrivateField,
            KeyExpr::Private(name.into()),
            value,
        ));
        self
    }

    /// Add a private method `#name() {}`
    pub fn private_method(mut self, name: impl Into<String>) -> Self {
        self.private_methods.push(name.into());
        self
    }

    /// Build and validate the template
    pub fn build(self) -> Result<ClassTemplate> {
        let mut initializers = Vec::with_capacity(self.fields.len() + 1);
        if !self.private_methods.is_empty() {
            initializers.push(InitializerDescriptor::brand(FeedbackSlot(0)));
        }
        for (kind, key, value) in self.fields {
            let slot = FeedbackSlot(initializers.len() as u32);
            initializers.push(InitializerDescriptor::new(kind, key, value, slot));
        }

        let template = ClassTemplate {
            version: DESCRIPTOR_VERSION,
            name: self.name,
            derived: self.derived,
            super_call: self.super_call,
            initializers,
            private_methods: self.private_methods,
        };
        template.validate()?;
        Ok(template)
    }
}

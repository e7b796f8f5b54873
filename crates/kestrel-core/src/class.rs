//! Compiled and evaluated classes
//!
//! A [`CompiledClass`] is a validated template plus the feedback vector its
//! initializer sites share across every construction. Evaluating it yields a
//! [`JsClass`]: the per-evaluation [`ClassContext`] (brand, private names,
//! private methods, computed keys, host closures), the class scope, the
//! instance root shape and the heritage.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use kestrel_bytecode::{ClassTemplate, ComputedKeyIndex, HostClosureIndex};

use crate::context::ScopeRecord;
use crate::error::{VmError, VmResult};
use crate::feedback::FeedbackVector;
use crate::object::{ObjectRef, PropertyKey};
use crate::shape::Shape;
use crate::symbol::PrivateName;
use crate::value::{NativeFunction, Value};

/// Template with its feedback vector
#[derive(Debug)]
pub struct CompiledClass {
    template: ClassTemplate,
    feedback: FeedbackVector,
}

impl CompiledClass {
    /// Validate a template and allocate one feedback cell per site
    pub fn new(template: ClassTemplate) -> VmResult<Self> {
        template.validate()?;
        let feedback = FeedbackVector::new(template.feedback_slot_count());
        Ok(Self { template, feedback })
    }

    /// The template
    pub fn template(&self) -> &ClassTemplate {
        &self.template
    }

    /// Class name or `<anonymous>`
    pub fn name(&self) -> &str {
        self.template.display_name()
    }

    /// Feedback cells, one per initializer site
    pub fn feedback(&self) -> &FeedbackVector {
        &self.feedback
    }

    /// Drop all collected feedback, as a recompile would
    pub fn reset_feedback(&self) {
        tracing::debug!(
            target: "kestrel::ic",
            class = self.name(),
            sites = self.feedback.len(),
            "feedback reset"
        );
        self.feedback.reset();
    }
}

/// A private method bound in a class context
#[derive(Debug, Clone)]
pub struct PrivateMethod {
    name: Arc<str>,
    value: Value,
}

impl PrivateMethod {
    /// Source spelling, including `#`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method value
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Per-evaluation class state
pub struct ClassContext {
    name: Arc<str>,
    brand: Option<PrivateName>,
    private_fields: FxHashMap<String, PrivateName>,
    methods: Vec<PrivateMethod>,
    computed_keys: Vec<PropertyKey>,
    host_closures: Vec<NativeFunction>,
}

impl ClassContext {
    pub(crate) fn new(
        template: &ClassTemplate,
        methods: Vec<(String, NativeFunction)>,
        computed_keys: Vec<PropertyKey>,
        host_closures: Vec<NativeFunction>,
    ) -> Self {
        let name: Arc<str> = Arc::from(template.display_name());
        let brand = template.has_brand().then(|| PrivateName::brand(&name));
        let private_fields = template
            .private_fields()
            .map(|field| (field.to_string(), PrivateName::field(field)))
            .collect();
        let methods = methods
            .into_iter()
            .map(|(method, func)| PrivateMethod {
                name: Arc::from(method.as_str()),
                value: Value::function(func),
            })
            .collect();

        Self {
            name,
            brand,
            private_fields,
            methods,
            computed_keys,
            host_closures,
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Brand symbol, present when the class has private methods
    pub fn brand(&self) -> Option<&PrivateName> {
        self.brand.as_ref()
    }

    /// Private name bound to a `#field` spelling
    pub fn private_name(&self, spelling: &str) -> Option<&PrivateName> {
        self.private_fields.get(spelling)
    }

    /// Private methods in declaration order
    pub fn private_methods(&self) -> &[PrivateMethod] {
        &self.methods
    }

    /// Private method by spelling
    pub fn method(&self, spelling: &str) -> Option<&Value> {
        self.methods
            .iter()
            .find(|method| &*method.name == spelling)
            .map(|method| &method.value)
    }

    /// Computed key bound at evaluation
    pub fn computed_key(&self, index: ComputedKeyIndex) -> VmResult<&PropertyKey> {
        self.computed_keys.get(index.0 as usize).ok_or_else(|| {
            VmError::internal(format!(
                "class {} has no computed key {}",
                self.name, index.0
            ))
        })
    }

    /// Host closure bound at evaluation
    pub fn host_closure(&self, index: HostClosureIndex) -> VmResult<&NativeFunction> {
        self.host_closures.get(index.0 as usize).ok_or_else(|| {
            VmError::internal(format!(
                "class {} has no host closure {}",
                self.name, index.0
            ))
        })
    }
}

impl fmt::Debug for ClassContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassContext")
            .field("name", &self.name)
            .field("brand", &self.brand)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Constructor body, run after the instance's fields are initialized
pub type ConstructorBody = Arc<dyn Fn(&ObjectRef) -> VmResult<()> + Send + Sync>;

/// Non-class base constructor; may return any object
pub type BaseConstructor = Arc<dyn Fn(&Arc<JsClass>) -> VmResult<ObjectRef> + Send + Sync>;

/// What a class extends
#[derive(Clone, Default)]
pub enum Heritage {
    /// No `extends` clause
    #[default]
    Base,
    /// Another evaluated class
    Class(Arc<JsClass>),
    /// A host constructor receiving the `new.target` class
    Constructor(BaseConstructor),
}

impl fmt::Debug for Heritage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "Base"),
            Self::Class(parent) => write!(f, "Class({})", parent.name()),
            Self::Constructor(_) => write!(f, "Constructor"),
        }
    }
}

/// An evaluated class
pub struct JsClass {
    pub(crate) compiled: Arc<CompiledClass>,
    pub(crate) context: Arc<ClassContext>,
    pub(crate) scope: Arc<ScopeRecord>,
    pub(crate) heritage: Heritage,
    pub(crate) instance_root: Arc<Shape>,
    pub(crate) prototype: ObjectRef,
    pub(crate) body: Option<ConstructorBody>,
}

impl JsClass {
    /// Class name
    pub fn name(&self) -> &str {
        self.context.name()
    }

    /// Compiled unit this class was evaluated from
    pub fn compiled(&self) -> &Arc<CompiledClass> {
        &self.compiled
    }

    /// Per-evaluation context
    pub fn context(&self) -> &Arc<ClassContext> {
        &self.context
    }

    /// Class scope
    pub fn scope(&self) -> &Arc<ScopeRecord> {
        &self.scope
    }

    /// What the class extends
    pub fn heritage(&self) -> &Heritage {
        &self.heritage
    }

    /// Empty-instance shape of this class
    pub fn instance_root(&self) -> &Arc<Shape> {
        &self.instance_root
    }

    /// `C.prototype`
    pub fn prototype(&self) -> &ObjectRef {
        &self.prototype
    }
}

impl fmt::Debug for JsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsClass")
            .field("name", &self.name())
            .field("heritage", &self.heritage)
            .field("root", &self.instance_root.id())
            .finish()
    }
}

/// Evaluation-time inputs of a class
///
/// # Example
///
/// ```ignore
/// let setup = ClassSetup::new()
///     .computed_key(Value::string("k"))
///     .private_method("#m", NativeFunction::new("#m", |_, _| Ok(Value::int32(1))))
///     .extends(base);
/// ```
#[derive(Default)]
pub struct ClassSetup {
    pub(crate) computed_keys: Vec<Value>,
    pub(crate) host_closures: Vec<NativeFunction>,
    pub(crate) private_methods: Vec<(String, NativeFunction)>,
    pub(crate) heritage: Heritage,
    pub(crate) body: Option<ConstructorBody>,
    pub(crate) prototype: Option<ObjectRef>,
    pub(crate) scope: Option<Arc<ScopeRecord>>,
}

impl ClassSetup {
    /// Create an empty setup
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the next computed key
    pub fn computed_key(mut self, key: Value) -> Self {
        self.computed_keys.push(key);
        self
    }

    /// Bind the next host closure
    pub fn host_closure(mut self, func: NativeFunction) -> Self {
        self.host_closures.push(func);
        self
    }

    /// Provide the implementation of a private method
    pub fn private_method(mut self, name: impl Into<String>, func: NativeFunction) -> Self {
        self.private_methods.push((name.into(), func));
        self
    }

    /// Extend an evaluated class
    pub fn extends(mut self, parent: Arc<JsClass>) -> Self {
        self.heritage = Heritage::Class(parent);
        self
    }

    /// Extend a host constructor
    pub fn extends_constructor(
        mut self,
        ctor: impl Fn(&Arc<JsClass>) -> VmResult<ObjectRef> + Send + Sync + 'static,
    ) -> Self {
        self.heritage = Heritage::Constructor(Arc::new(ctor));
        self
    }

    /// Constructor body, run after initializers
    pub fn body(mut self, body: impl Fn(&ObjectRef) -> VmResult<()> + Send + Sync + 'static) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    /// Use a specific object as `C.prototype`
    pub fn prototype(mut self, prototype: ObjectRef) -> Self {
        self.prototype = Some(prototype);
        self
    }

    /// Evaluate the class inside an enclosing scope
    pub fn scope(mut self, scope: Arc<ScopeRecord>) -> Self {
        self.scope = Some(scope);
        self
    }
}

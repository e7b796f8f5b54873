//! Class evaluation and instance construction
//!
//! The runtime owns the shape table and drives construction: allocate the
//! instance (or obtain it from the base constructor), run the brand site and
//! every initializer site in declaration order through the define IC, then
//! run the constructor body.

use std::sync::Arc;

use kestrel_bytecode::{ClassTemplate, FeedbackSlot, KeyExpr, ScopeDepth, SuperCallSite, ValueExpr};

use crate::brand;
use crate::class::{ClassContext, ClassSetup, CompiledClass, Heritage, JsClass};
use crate::config::{ConfigError, IcConfig};
use crate::context::{ScopeKind, ScopeRecord};
use crate::define_ic::DefineOwnIc;
use crate::error::{VmError, VmResult};
use crate::object::{JsObject, ObjectRef, PropertyAttributes, PropertyKey};
use crate::proxy::{JsProxy, ProxyHandler};
use crate::shape::ShapeTable;
use crate::value::Value;

enum BrandSite {
    Direct,
    Scope(Arc<ScopeRecord>, ScopeDepth),
}

/// Runtime state shared by every class it evaluates
pub struct Runtime {
    config: IcConfig,
    shapes: Arc<ShapeTable>,
    object_prototype: ObjectRef,
    global_scope: Arc<ScopeRecord>,
}

impl Runtime {
    /// Create a runtime with the default configuration
    pub fn new() -> Self {
        Self::build(IcConfig::default())
    }

    /// Create a runtime with a validated configuration
    pub fn with_config(config: IcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: IcConfig) -> Self {
        let shapes = ShapeTable::with_limit(config.max_shapes);
        let object_prototype = Arc::new(JsObject::new(None, Arc::clone(&shapes)));
        Self {
            config,
            shapes,
            object_prototype,
            global_scope: ScopeRecord::global(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &IcConfig {
        &self.config
    }

    /// Shape table
    pub fn shapes(&self) -> &Arc<ShapeTable> {
        &self.shapes
    }

    /// `Object.prototype`
    pub fn object_prototype(&self) -> &ObjectRef {
        &self.object_prototype
    }

    /// Top-level scope
    pub fn global_scope(&self) -> &Arc<ScopeRecord> {
        &self.global_scope
    }

    /// Create an ordinary object inheriting from `Object.prototype`
    pub fn new_object(&self) -> ObjectRef {
        Arc::new(JsObject::new(
            Some(Arc::clone(&self.object_prototype)),
            Arc::clone(&self.shapes),
        ))
    }

    /// Create an ordinary object with an explicit prototype
    pub fn new_object_with_proto(&self, prototype: Option<ObjectRef>) -> ObjectRef {
        Arc::new(JsObject::new(prototype, Arc::clone(&self.shapes)))
    }

    /// Create a proxy object
    pub fn new_proxy(&self, target: ObjectRef, handler: Arc<dyn ProxyHandler>) -> ObjectRef {
        Arc::new(JsObject::proxy(
            JsProxy::new(target, handler),
            Arc::clone(&self.shapes),
        ))
    }

    /// Validate a template and allocate its feedback vector
    pub fn compile(&self, template: ClassTemplate) -> VmResult<Arc<CompiledClass>> {
        Ok(Arc::new(CompiledClass::new(template)?))
    }

    /// Define IC for one site of a compiled class
    pub fn define_ic<'a>(&self, compiled: &'a CompiledClass, slot: FeedbackSlot) -> DefineOwnIc<'a> {
        DefineOwnIc::new(compiled.feedback(), slot, self.config.max_polymorphism)
    }

    /// Evaluate a class: bind its context, scope, root shape and prototype
    pub fn evaluate_class(
        &self,
        compiled: &Arc<CompiledClass>,
        setup: ClassSetup,
    ) -> VmResult<Arc<JsClass>> {
        let template = compiled.template();
        let name = template.display_name();

        let has_heritage = !matches!(setup.heritage, Heritage::Base);
        if template.derived != has_heritage {
            return Err(VmError::internal(format!(
                "class {name}: extends clause does not match the supplied heritage"
            )));
        }
        if matches!(template.super_call, SuperCallSite::Nested { .. }) && !template.derived {
            return Err(VmError::internal(format!(
                "class {name}: nested super call in a base class"
            )));
        }

        let mut methods = Vec::with_capacity(template.private_methods.len());
        for method in &template.private_methods {
            let func = setup
                .private_methods
                .iter()
                .find(|(declared, _)| declared == method)
                .map(|(_, func)| func.clone())
                .ok_or_else(|| {
                    VmError::internal(format!(
                        "class {name}: no implementation for private method {method}"
                    ))
                })?;
            methods.push((method.clone(), func));
        }
        if let Some((extra, _)) = setup
            .private_methods
            .iter()
            .find(|(declared, _)| !template.private_methods.contains(declared))
        {
            return Err(VmError::internal(format!(
                "class {name}: private method {extra} is not declared"
            )));
        }

        if setup.computed_keys.len() != template.computed_key_count() {
            return Err(VmError::internal(format!(
                "class {name}: expected {} computed keys, got {}",
                template.computed_key_count(),
                setup.computed_keys.len()
            )));
        }
        let computed_keys = setup
            .computed_keys
            .iter()
            .map(PropertyKey::from_value)
            .collect::<VmResult<Vec<_>>>()?;

        let context = Arc::new(ClassContext::new(
            template,
            methods,
            computed_keys,
            setup.host_closures,
        ));
        let outer = setup
            .scope
            .unwrap_or_else(|| Arc::clone(&self.global_scope));
        let scope = ScopeRecord::class(&outer, Arc::clone(&context));
        let instance_root = self.shapes.new_root()?;

        let prototype = match setup.prototype {
            Some(prototype) => prototype,
            None => {
                let parent = match &setup.heritage {
                    Heritage::Class(parent) => Arc::clone(&parent.prototype),
                    Heritage::Base | Heritage::Constructor(_) => {
                        Arc::clone(&self.object_prototype)
                    }
                };
                self.new_object_with_proto(Some(parent))
            }
        };

        tracing::debug!(
            target: "kestrel::ic",
            class = name,
            sites = compiled.feedback().len(),
            root = instance_root.id(),
            "class evaluated"
        );

        Ok(Arc::new(JsClass {
            compiled: Arc::clone(compiled),
            context,
            scope,
            heritage: setup.heritage,
            instance_root,
            prototype,
            body: setup.body,
        }))
    }

    /// `new C()`
    pub fn construct(&self, class: &Arc<JsClass>) -> VmResult<ObjectRef> {
        self.construct_for(class, class)
    }

    fn construct_for(&self, class: &Arc<JsClass>, new_target: &Arc<JsClass>) -> VmResult<ObjectRef> {
        let instance = match &class.heritage {
            Heritage::Base => Arc::new(JsObject::with_shape(
                Arc::clone(&new_target.instance_root),
                Some(Arc::clone(&new_target.prototype)),
                Arc::clone(&self.shapes),
            )),
            Heritage::Class(parent) => self.construct_for(parent, new_target)?,
            Heritage::Constructor(ctor) => ctor(new_target)?,
        };

        let brand_site = match class.compiled.template().super_call {
            SuperCallSite::Nested { depth } => {
                let mut scope = ScopeRecord::child(&class.scope, ScopeKind::Function);
                for _ in 1..depth.depth() {
                    scope = ScopeRecord::child(&scope, ScopeKind::Closure);
                }
                BrandSite::Scope(scope, depth)
            }
            SuperCallSite::Direct => BrandSite::Direct,
        };

        self.initialize_instance(class, &instance, &brand_site)?;
        if let Some(body) = &class.body {
            body(&instance)?;
        }
        Ok(instance)
    }

    fn initialize_instance(
        &self,
        class: &JsClass,
        instance: &ObjectRef,
        brand_site: &BrandSite,
    ) -> VmResult<()> {
        let compiled = &class.compiled;
        let context = &class.context;

        for init in &compiled.template().initializers {
            let ic = self.define_ic(compiled, init.slot);
            match (&init.key, brand_site) {
                (KeyExpr::Brand, BrandSite::Scope(scope, depth)) => {
                    brand::install_brand_from_scope(
                        compiled.feedback(),
                        init.slot,
                        instance,
                        scope,
                        *depth,
                    )?;
                }
                (KeyExpr::Brand, BrandSite::Direct) => {
                    brand::install_brand(&ic, instance, context)?;
                }
                (key, _) => {
                    let key = resolve_key(context, key)?;
                    let value = evaluate_value(context, instance, &init.value)?;
                    let attributes = if key.is_private() {
                        PropertyAttributes::private_field()
                    } else {
                        PropertyAttributes::data()
                    };
                    ic.define(instance, key, value, attributes)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("shapes", &self.shapes)
            .finish()
    }
}

fn resolve_key(context: &ClassContext, key: &KeyExpr) -> VmResult<PropertyKey> {
    match key {
        KeyExpr::Named(name) => Ok(PropertyKey::string(name)),
        KeyExpr::Computed(index) => context.computed_key(*index).cloned(),
        KeyExpr::Private(spelling) => context
            .private_name(spelling)
            .cloned()
            .map(PropertyKey::Private)
            .ok_or_else(|| {
                VmError::internal(format!(
                    "class {} does not declare {spelling}",
                    context.name()
                ))
            }),
        KeyExpr::Brand => context
            .brand()
            .cloned()
            .map(PropertyKey::Private)
            .ok_or_else(|| VmError::internal(format!("class {} has no brand", context.name()))),
    }
}

fn evaluate_value(
    context: &Arc<ClassContext>,
    instance: &ObjectRef,
    value: &ValueExpr,
) -> VmResult<Value> {
    match value {
        ValueExpr::Literal(literal) => Ok(Value::from_literal(literal)),
        ValueExpr::ReadThis(key) => {
            let key = resolve_key(context, key)?;
            match key.as_private() {
                Some(name) => instance.get_private(name).ok_or_else(|| {
                    VmError::type_error(format!(
                        "Cannot read private member {name} from an object whose class did not declare it"
                    ))
                }),
                None => instance.get(&key),
            }
        }
        ValueExpr::Host(index) => context
            .host_closure(*index)?
            .call(&Value::Object(Arc::clone(instance)), &[]),
        ValueExpr::ClassContext => Ok(Value::class_context(Arc::clone(context))),
    }
}

//! The type registry: every class a configuration document may name.
//!
//! Classes are registered up front with [`ClassBuilder`], which records how to
//! construct an instance, which setters it has (in declaration order) and which
//! interfaces it can be viewed as.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::iface::{Inspector, WidgetBuilder};
use crate::resource::ResourceResolver;
use crate::setter::{Setter, SetterFn};
use crate::value::{Object, Value, View};

pub(crate) type Instance = Box<dyn Any + Send + Sync>;

type Construct = dyn Fn() -> Instance + Send + Sync;
type ConstructFromConfig = dyn Fn(Instance) -> std::result::Result<Instance, Instance> + Send + Sync;
type Seal = dyn Fn(Instance) -> std::result::Result<Vec<View>, Instance> + Send + Sync;
type Cast<T> = dyn Fn(&Arc<T>) -> View + Send + Sync;
type Inject = dyn Fn(&mut dyn Any, Arc<dyn ResourceResolver>) + Send + Sync;

/// Whether a class can be instantiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Concrete,
    /// A `dyn Trait`, registered with [`Registry::register_interface`].
    Interface,
}

struct ConfigConstructor {
    config_type: TypeId,
    config_type_name: &'static str,
    construct: Box<ConstructFromConfig>,
}

/// A registered class: the runtime description used in place of reflection.
pub struct ClassDef {
    name: String,
    kind: ClassKind,
    /// `TypeId` of `Arc<Self>`: the view this class hands out.
    view: TypeId,
    /// Views of every type this class is assignable to, its own first.
    assignable: Vec<TypeId>,
    instance_type: Option<TypeId>,
    constructor: Option<Box<Construct>>,
    config_constructor: Option<ConfigConstructor>,
    resource_hook: Option<Box<Inject>>,
    setters: Vec<Setter>,
    seal: Option<Box<Seal>>,
}

impl ClassDef {
    /// Fully-qualified dotted name, e.g. `org.example.Widget`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its package: `Widget` for `org.example.Widget`.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Package part of the name, empty for unqualified names.
    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map(|(package, _)| package).unwrap_or("")
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Whether instances of this class can be viewed as `Arc<I>`.
    pub fn is_assignable_to<I: ?Sized + 'static>(&self) -> bool {
        self.is_assignable_to_view(TypeId::of::<Arc<I>>())
    }

    /// Whether `other` is this class or an interface this class implements.
    pub fn is_assignable_to_class(&self, other: &ClassDef) -> bool {
        self.is_assignable_to_view(other.view)
    }

    pub(crate) fn is_assignable_to_view(&self, view: TypeId) -> bool {
        self.assignable.contains(&view)
    }

    pub fn has_default_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn has_config_constructor(&self) -> bool {
        self.config_constructor.is_some()
    }

    pub fn needs_resource_resolver(&self) -> bool {
        self.resource_hook.is_some()
    }

    /// Registered setter names, in declaration order (overloads repeat).
    pub fn setter_names(&self) -> impl Iterator<Item = &str> {
        self.setters.iter().map(Setter::property)
    }

    /// First setter, in declaration order, whose name, arity and parameter types accept `args`.
    ///
    /// `property` is tried as given, then with a leading `set` removed
    /// (`setName` finds `name`).
    pub(crate) fn find_setter(&self, property: &str, args: &[Value]) -> Option<&Setter> {
        let lookup = |name: &str| {
            self.setters
                .iter()
                .find(|setter| setter.property() == name && setter.accepts(args))
        };
        lookup(property).or_else(|| {
            let rest = property.strip_prefix("set")?;
            if !rest.starts_with(|c: char| c.is_uppercase()) {
                return None;
            }
            lookup(&lowercase_first(rest))
        })
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("setters", &self.setters)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a registered [`ClassDef`].
#[derive(Clone)]
pub struct ClassRef(Arc<ClassDef>);

impl ClassRef {
    pub(crate) fn view(&self) -> TypeId {
        self.view
    }

    /// Create a fresh instance with the default constructor.
    ///
    /// Classes that only have a config constructor fail with a hint naming the
    /// config class to declare instead.
    pub(crate) fn construct(&self, registry: &Registry) -> Result<Instance> {
        if let Some(constructor) = &self.constructor {
            return Ok(constructor());
        }
        match &self.config_constructor {
            Some(cc) => {
                let config = registry
                    .find_by_type_id(cc.config_type)
                    .map(|class| class.simple_name().to_owned())
                    .unwrap_or_else(|| short_type_name(cc.config_type_name).to_owned());
                Err(Error::construction(format!(
                    "{} does not have a default constructor. Did you mean config=\"{config}\"?",
                    self.name
                )))
            }
            None => Err(Error::construction(format!(
                "{} does not have a default constructor",
                self.name
            ))),
        }
    }

    /// Finish a configured type: pass the populated `config` (an instance of `config_class`)
    /// to this class's config constructor.
    pub(crate) fn construct_with_config(
        &self,
        config_class: &ClassRef,
        config: Instance,
    ) -> Result<Instance> {
        let cc = self
            .config_constructor
            .as_ref()
            .filter(|cc| Some(cc.config_type) == config_class.instance_type)
            .ok_or_else(|| {
                Error::construction(format!(
                    "{} does not have a constructor taking {}",
                    self.name, config_class.name
                ))
            })?;
        (cc.construct)(config).map_err(|_| {
            Error::construction(format!(
                "{} cannot be constructed from {}",
                self.name, config_class.name
            ))
        })
    }

    /// Hand a resolver to a freshly constructed instance, if the class asked for one.
    pub(crate) fn inject_resolver(&self, instance: &mut dyn Any, resolver: Arc<dyn ResourceResolver>) {
        if let Some(hook) = &self.resource_hook {
            hook(instance, resolver);
        }
    }

    /// Seal a constructed instance into a shareable [`Object`].
    pub(crate) fn seal(&self, instance: Instance) -> Result<Object> {
        let seal = self
            .seal
            .as_ref()
            .ok_or_else(|| Error::construction(format!("{} cannot be instantiated", self.name)))?;
        let views = seal(instance).map_err(|_| {
            Error::construction(format!("instance is not a {}", self.name))
        })?;
        Ok(Object::new(self.clone(), views))
    }

    pub fn ptr_eq(&self, other: &ClassRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ClassRef {
    type Target = ClassDef;

    fn deref(&self) -> &ClassDef {
        &self.0
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.name == other.name
    }
}

impl Eq for ClassRef {}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.name)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Describes one concrete class for registration.
///
/// # Example
///
/// ```
/// use metawidget_config::{ClassBuilder, Registry};
///
/// #[derive(Default)]
/// struct Widget {
///     name: String,
/// }
///
/// let registry = Registry::new().with(
///     ClassBuilder::<Widget>::new("org.example.Widget")
///         .default_constructor()
///         .setter("name", |w: &mut Widget, name: String| w.name = name),
/// );
/// assert!(registry.find("org.example.Widget").is_some());
/// ```
pub struct ClassBuilder<T> {
    name: String,
    constructor: Option<Box<Construct>>,
    config_constructor: Option<ConfigConstructor>,
    resource_hook: Option<Box<Inject>>,
    setters: Vec<Setter>,
    casts: Vec<(TypeId, Box<Cast<T>>)>,
}

impl<T: Send + Sync + 'static> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            config_constructor: None,
            resource_hook: None,
            setters: Vec::new(),
            casts: Vec::new(),
        }
    }

    /// Use `T::default()` as the zero-argument constructor.
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(T::default)
    }

    /// Zero-argument constructor.
    pub fn constructor(mut self, f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.constructor = Some(Box::new(move || Box::new(f()) as Instance));
        self
    }

    /// Single-argument constructor taking a populated config object of type `C`.
    ///
    /// `C` must be registered as a class of its own, with a default constructor and
    /// the setters the document will call on it.
    pub fn config_constructor<C: Send + Sync + 'static>(
        mut self,
        f: impl Fn(C) -> T + Send + Sync + 'static,
    ) -> Self {
        self.config_constructor = Some(ConfigConstructor {
            config_type: TypeId::of::<C>(),
            config_type_name: type_name::<C>(),
            construct: Box::new(move |config: Instance| -> std::result::Result<Instance, Instance> {
                let config = config.downcast::<C>()?;
                Ok(Box::new(f(*config)) as Instance)
            }),
        });
        self
    }

    /// Declare that `T` can be viewed as `Arc<I>`, typically a `dyn Trait`.
    pub fn implements<I: ?Sized + Send + Sync + 'static>(
        mut self,
        cast: impl Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    ) -> Self {
        self.casts.push((
            TypeId::of::<Arc<I>>(),
            Box::new(move |arc: &Arc<T>| View::new(cast(Arc::clone(arc)))),
        ));
        self
    }

    /// Shorthand for `implements(|it| it as Arc<dyn Inspector>)`.
    pub fn inspector(self) -> Self
    where
        T: Inspector,
    {
        self.implements(|it: Arc<T>| it as Arc<dyn Inspector>)
    }

    /// Shorthand for `implements(|it| it as Arc<dyn WidgetBuilder>)`.
    pub fn widget_builder(self) -> Self
    where
        T: WidgetBuilder,
    {
        self.implements(|it: Arc<T>| it as Arc<dyn WidgetBuilder>)
    }

    /// Receive the reader's resource resolver right after default construction.
    pub fn needs_resource_resolver(
        mut self,
        f: impl Fn(&mut T, Arc<dyn ResourceResolver>) + Send + Sync + 'static,
    ) -> Self {
        self.resource_hook = Some(Box::new(move |instance: &mut dyn Any, resolver| {
            if let Some(instance) = instance.downcast_mut::<T>() {
                f(instance, resolver);
            }
        }));
        self
    }

    /// Register a setter under `property`. Registering the same property again adds an
    /// overload; overloads are tried in registration order.
    pub fn setter<Args: 'static, F: SetterFn<T, Args>>(mut self, property: &str, f: F) -> Self {
        self.setters.push(Setter::new::<T, Args, F>(property, f));
        self
    }

    fn build(self) -> ClassDef {
        let view = TypeId::of::<Arc<T>>();
        let mut assignable = vec![view];
        assignable.extend(self.casts.iter().map(|(id, _)| *id));
        let casts = self.casts;
        let seal = move |instance: Instance| -> std::result::Result<Vec<View>, Instance> {
            let instance = instance.downcast::<T>()?;
            let arc: Arc<T> = Arc::from(instance);
            let mut views = Vec::with_capacity(casts.len() + 1);
            views.push(View::new(Arc::clone(&arc)));
            views.extend(casts.iter().map(|(_, cast)| cast(&arc)));
            Ok(views)
        };
        ClassDef {
            name: self.name,
            kind: ClassKind::Concrete,
            view,
            assignable,
            instance_type: Some(TypeId::of::<T>()),
            constructor: self.constructor,
            config_constructor: self.config_constructor,
            resource_hook: self.resource_hook,
            setters: self.setters,
            seal: Some(Box::new(seal)),
        }
    }
}

/// Every class and interface a configuration document may name.
///
/// `Registry::new()` already knows `String`, `i32` and `bool` (plus the aliases
/// `java.lang.String`, `java.lang.Integer`, `int`, `java.lang.Boolean` and
/// `boolean`), and the `Inspector` and `WidgetBuilder` interfaces.
#[derive(Clone, Default)]
pub struct Registry {
    classes: AHashMap<String, ClassRef>,
    by_view: AHashMap<TypeId, ClassRef>,
    by_type: AHashMap<TypeId, ClassRef>,
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(ClassBuilder::<String>::new("String").default_constructor());
        registry.register(ClassBuilder::<i32>::new("i32").default_constructor());
        registry.register(ClassBuilder::<bool>::new("bool").default_constructor());
        registry.alias("java.lang.String", "String");
        registry.alias("java.lang.Integer", "i32");
        registry.alias("int", "i32");
        registry.alias("java.lang.Boolean", "bool");
        registry.alias("boolean", "bool");
        registry.register_interface::<dyn Inspector>("org.metawidget.inspector.iface.Inspector");
        registry
            .register_interface::<dyn WidgetBuilder>("org.metawidget.widgetbuilder.iface.WidgetBuilder");
        registry
    }

    /// Register a class. A later registration under the same name replaces the earlier one.
    pub fn register<T: Send + Sync + 'static>(&mut self, builder: ClassBuilder<T>) -> ClassRef {
        let class = ClassRef(Arc::new(builder.build()));
        self.by_type.insert(TypeId::of::<T>(), class.clone());
        self.insert(class)
    }

    /// Builder-style [`Registry::register`].
    pub fn with<T: Send + Sync + 'static>(mut self, builder: ClassBuilder<T>) -> Self {
        self.register(builder);
        self
    }

    /// Register the interface `I` (a `dyn Trait`) under `name`.
    pub fn register_interface<I: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
    ) -> ClassRef {
        let view = TypeId::of::<Arc<I>>();
        let class = ClassRef(Arc::new(ClassDef {
            name: name.into(),
            kind: ClassKind::Interface,
            view,
            assignable: vec![view],
            instance_type: None,
            constructor: None,
            config_constructor: None,
            resource_hook: None,
            setters: Vec::new(),
            seal: None,
        }));
        self.insert(class)
    }

    /// Builder-style [`Registry::register_interface`].
    pub fn with_interface<I: ?Sized + Send + Sync + 'static>(mut self, name: impl Into<String>) -> Self {
        self.register_interface::<I>(name);
        self
    }

    /// Make `alias` resolve to the class registered as `name`. Unknown targets are ignored.
    pub fn alias(&mut self, alias: impl Into<String>, name: &str) {
        if let Some(class) = self.classes.get(name).cloned() {
            self.classes.insert(alias.into(), class);
        }
    }

    fn insert(&mut self, class: ClassRef) -> ClassRef {
        if self.classes.contains_key(class.name()) {
            debug!(class = class.name(), "replacing registered class");
        }
        self.by_view.insert(class.view, class.clone());
        self.classes.insert(class.name.clone(), class.clone());
        class
    }

    /// Look a class up by name; `None` when it is not registered.
    pub fn find(&self, name: &str) -> Option<ClassRef> {
        self.classes.get(name).cloned()
    }

    /// The class registered for the Rust type `T` (concrete) or `dyn Trait` (interface).
    pub fn find_by_type<T: ?Sized + 'static>(&self) -> Option<ClassRef> {
        self.by_view.get(&TypeId::of::<Arc<T>>()).cloned()
    }

    fn find_by_type_id(&self, id: TypeId) -> Option<ClassRef> {
        self.by_type.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_view.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("classes", &names).finish()
    }
}

/// `widget` becomes `Widget`.
pub(crate) fn uppercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `my_crate::config::WidgetConfig` becomes `WidgetConfig`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

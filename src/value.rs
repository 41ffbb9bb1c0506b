//! Dynamic values flowing through setter argument lists.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::bundle::ResourceBundle;
use crate::registry::ClassRef;
use crate::resource::ResourceStream;

/// A value produced by a native tag, a collection tag or an object declaration.
#[derive(Clone)]
pub enum Value {
    /// `<null/>`, or an empty `<class></class>`.
    Null,
    String(String),
    Int(i32),
    Bool(bool),
    /// A registered type, from `<class>`.
    Class(ClassRef),
    Pattern(Regex),
    /// An opened resource, from `<resource>` or `<url>`.
    Stream(ResourceStream),
    Bundle(ResourceBundle),
    List(Vec<Value>),
    /// Insertion-ordered, duplicates dropped by [`Value::push`].
    Set(Vec<Value>),
    Object(Object),
}

impl Value {
    /// Short type name used in diagnostics (`"String"`, `"i32"`, the class name of objects, ...).
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::String(_) => "String",
            Value::Int(_) => "i32",
            Value::Bool(_) => "bool",
            Value::Class(_) => "Class",
            Value::Pattern(_) => "Pattern",
            Value::Stream(_) => "ResourceStream",
            Value::Bundle(_) => "ResourceBundle",
            Value::List(_) => "List",
            Value::Set(_) => "Set",
            Value::Object(object) => object.class().name(),
        }
    }

    /// Append `item` to a collection value. Sets ignore items equal to one already present.
    ///
    /// Non-collection values are left untouched.
    pub(crate) fn push(&mut self, item: Value) {
        match self {
            Value::List(items) => items.push(item),
            Value::Set(items) => {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            _ => {}
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Scalars compare by value; patterns by source; streams, bundles and objects by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Pattern(a), Value::Pattern(b)) => a.as_str() == b.as_str(),
            (Value::Stream(a), Value::Stream(b)) => a.ptr_eq(b),
            (Value::Bundle(a), Value::Bundle(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Class(c) => f.debug_tuple("Class").field(&c.name()).finish(),
            Value::Pattern(p) => f.debug_tuple("Pattern").field(&p.as_str()).finish(),
            Value::Stream(s) => f.debug_tuple("Stream").field(&s.name()).finish(),
            Value::Bundle(b) => f.debug_tuple("Bundle").field(&b.name()).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Value::Object(o) => o.fmt(f),
        }
    }
}

/// One typed handle onto a sealed instance: an `Arc<T>` or `Arc<dyn Trait>`, type-erased.
pub(crate) struct View {
    id: TypeId,
    value: Box<dyn Any + Send + Sync>,
}

impl View {
    pub(crate) fn new<T: ?Sized + Send + Sync + 'static>(arc: Arc<T>) -> Self {
        Self {
            id: TypeId::of::<Arc<T>>(),
            value: Box::new(arc),
        }
    }
}

/// A constructed, sealed instance.
///
/// Cloning an `Object` shares the instance: every clone hands out the same `Arc`s,
/// so identity survives caching and can be checked with [`Object::ptr_eq`] or
/// [`Arc::ptr_eq`] on the views.
#[derive(Clone)]
pub struct Object {
    class: ClassRef,
    views: Arc<[View]>,
}

impl Object {
    pub(crate) fn new(class: ClassRef, views: Vec<View>) -> Self {
        Self {
            class,
            views: views.into(),
        }
    }

    /// The class this instance was declared and constructed as.
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// View the instance as `Arc<T>`: its own type, or any interface its class implements.
    pub fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.view_by_id(TypeId::of::<Arc<T>>())
            .and_then(|value| value.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Whether [`Object::get::<T>`](Object::get) would succeed.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.has_view(TypeId::of::<Arc<T>>())
    }

    pub(crate) fn has_view(&self, id: TypeId) -> bool {
        self.view_by_id(id).is_some()
    }

    fn view_by_id(&self, id: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        self.views
            .iter()
            .find(|view| view.id == id)
            .map(|view| view.value.as_ref())
    }

    /// `true` when both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.views, &other.views)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name())
            .field("views", &self.views.len())
            .finish()
    }
}

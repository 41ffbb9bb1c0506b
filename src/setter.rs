//! Setters: typed closures registered per class and invoked with dynamic arguments.
//!
//! Overload resolution is an instance-of check per argument, first match in
//! declaration order wins. A null argument matches every parameter.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::bundle::ResourceBundle;
use crate::error::{Error, Result};
use crate::registry::ClassRef;
use crate::resource::ResourceStream;
use crate::value::Value;

/// The declared type of one setter parameter, as seen by overload resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    /// Accepts anything ([`Value`] parameters).
    Any,
    String,
    Int,
    Bool,
    Class,
    Pattern,
    Stream,
    Bundle,
    /// Any `<list>` or `<set>`; element types are checked on conversion.
    Collection,
    /// An object exposing the `Arc<T>` view identified by `view`.
    Object {
        view: TypeId,
        name: &'static str,
    },
    /// `Option<T>`: accepts what the inner type accepts.
    Optional(Box<ParamType>),
}

impl ParamType {
    /// The instance-of check. Nulls are never type-checked.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (ParamType::Any, _) => true,
            (ParamType::Optional(inner), value) => inner.accepts(value),
            (ParamType::String, Value::String(_))
            | (ParamType::Int, Value::Int(_))
            | (ParamType::Bool, Value::Bool(_))
            | (ParamType::Class, Value::Class(_))
            | (ParamType::Pattern, Value::Pattern(_))
            | (ParamType::Stream, Value::Stream(_))
            | (ParamType::Bundle, Value::Bundle(_))
            | (ParamType::Collection, Value::List(_) | Value::Set(_)) => true,
            (ParamType::Object { view, .. }, Value::Object(object)) => object.has_view(*view),
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Any => f.write_str("Value"),
            ParamType::String => f.write_str("String"),
            ParamType::Int => f.write_str("i32"),
            ParamType::Bool => f.write_str("bool"),
            ParamType::Class => f.write_str("Class"),
            ParamType::Pattern => f.write_str("Pattern"),
            ParamType::Stream => f.write_str("ResourceStream"),
            ParamType::Bundle => f.write_str("ResourceBundle"),
            ParamType::Collection => f.write_str("Collection"),
            ParamType::Object { name, .. } => f.write_str(name),
            ParamType::Optional(inner) => write!(f, "Option<{inner}>"),
        }
    }
}

/// A Rust type usable as a setter (or config constructor) parameter.
pub trait Arg: Sized + 'static {
    fn param_type() -> ParamType;
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &ParamType, got: &Value) -> Error {
    Error::invocation(format!(
        "argument type mismatch: expected {expected}, got {}",
        got.type_name()
    ))
}

impl Arg for Value {
    fn param_type() -> ParamType {
        ParamType::Any
    }
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

macro_rules! scalar_arg {
    ($ty:ty, $param:ident, $variant:ident) => {
        impl Arg for $ty {
            fn param_type() -> ParamType {
                ParamType::$param
            }
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch(&Self::param_type(), &other)),
                }
            }
        }
    };
}

scalar_arg!(String, String, String);
scalar_arg!(i32, Int, Int);
scalar_arg!(bool, Bool, Bool);
scalar_arg!(ClassRef, Class, Class);
scalar_arg!(Regex, Pattern, Pattern);
scalar_arg!(ResourceStream, Stream, Stream);
scalar_arg!(ResourceBundle, Bundle, Bundle);

impl<T: Arg> Arg for Vec<T> {
    fn param_type() -> ParamType {
        ParamType::Collection
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) | Value::Set(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch(&Self::param_type(), &other)),
        }
    }
}

impl<T: Arg> Arg for Option<T> {
    fn param_type() -> ParamType {
        ParamType::Optional(Box::new(T::param_type()))
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Arg for Arc<T> {
    fn param_type() -> ParamType {
        ParamType::Object {
            view: TypeId::of::<Arc<T>>(),
            name: type_name::<T>(),
        }
    }
    fn from_value(value: Value) -> Result<Self> {
        let expected = Self::param_type();
        match &value {
            Value::Object(object) => object.get::<T>().ok_or_else(|| mismatch(&expected, &value)),
            Value::Null => Err(Error::invocation(format!(
                "null cannot be passed as {expected}"
            ))),
            _ => Err(mismatch(&expected, &value)),
        }
    }
}

/// What a setter closure may return: `()` or `Result<(), E>`.
pub trait SetterOutput {
    fn into_result(self) -> Result<()>;
}

impl SetterOutput for () {
    fn into_result(self) -> Result<()> {
        Ok(())
    }
}

/// Errors of this crate pass through unchanged; strings become [`Error::Invocation`].
impl<E: Into<Error>> SetterOutput for std::result::Result<(), E> {
    fn into_result(self) -> Result<()> {
        self.map_err(Into::into)
    }
}

/// Closures of arity 0 to 3 usable as setters on `T`.
///
/// `Args` is a marker tuple `(R, A, B, ..)` that lets one generic `setter` method
/// accept every arity; it is always inferred.
pub trait SetterFn<T, Args>: Send + Sync + 'static {
    fn params() -> Vec<ParamType>;
    fn call(&self, target: &mut T, args: Vec<Value>) -> Result<()>;
}

macro_rules! impl_setter_fn {
    ($($arg:ident $var:ident),*) => {
        impl<T, F, R, $($arg,)*> SetterFn<T, (R, $($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            R: SetterOutput,
            $($arg: Arg,)*
        {
            fn params() -> Vec<ParamType> {
                vec![$($arg::param_type()),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, target: &mut T, args: Vec<Value>) -> Result<()> {
                let mut args = args.into_iter();
                $(
                    let $var = $arg::from_value(args.next().unwrap_or(Value::Null))?;
                )*
                (self)(target, $($var),*).into_result()
            }
        }
    };
}

impl_setter_fn!();
impl_setter_fn!(A a);
impl_setter_fn!(A a, B b);
impl_setter_fn!(A a, B b, C c);

type Invoke = dyn Fn(&mut dyn Any, Vec<Value>) -> Result<()> + Send + Sync;

/// A type-erased setter, stored on its class in declaration order.
pub(crate) struct Setter {
    property: Arc<str>,
    params: Vec<ParamType>,
    invoke: Box<Invoke>,
}

impl Setter {
    pub(crate) fn new<T, Args, F>(property: &str, f: F) -> Self
    where
        T: 'static,
        Args: 'static,
        F: SetterFn<T, Args>,
    {
        Self {
            property: property.into(),
            params: F::params(),
            invoke: Box::new(move |target: &mut dyn Any, args| {
                let target = target.downcast_mut::<T>().ok_or_else(|| {
                    Error::invocation(format!(
                        "setter target is not a {}",
                        type_name::<T>()
                    ))
                })?;
                f.call(target, args)
            }),
        }
    }

    pub(crate) fn property(&self) -> &str {
        &self.property
    }

    pub(crate) fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Arity and per-argument instance-of check.
    pub(crate) fn accepts(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| param.accepts(arg))
    }

    pub(crate) fn invoke(&self, target: &mut dyn Any, args: Vec<Value>) -> Result<()> {
        (self.invoke)(target, args)
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.property, params.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Target {
        log: Vec<String>,
    }

    #[test]
    fn params_follow_closure_signature() {
        let setter = Setter::new("foo", |_: &mut Target, _: String, _: Option<i32>, _: Vec<bool>| {});
        assert_eq!(
            setter.params(),
            &[
                ParamType::String,
                ParamType::Optional(Box::new(ParamType::Int)),
                ParamType::Collection
            ]
        );
        assert_eq!(setter.property(), "foo");
    }

    #[test]
    fn accepts_checks_arity_types_and_nulls() {
        let setter = Setter::new("foo", |_: &mut Target, _: i32| {});
        assert!(setter.accepts(&[Value::Int(1)]));
        assert!(setter.accepts(&[Value::Null]));
        assert!(!setter.accepts(&[Value::String("1".into())]));
        assert!(!setter.accepts(&[]));
        assert!(!setter.accepts(&[Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn invoke_converts_and_calls() {
        let setter = Setter::new("foo", |t: &mut Target, s: String, n: Option<i32>| {
            t.log.push(format!("{s}/{n:?}"));
        });
        let mut target = Target::default();
        setter
            .invoke(&mut target, vec![Value::String("x".into()), Value::Null])
            .unwrap();
        assert_eq!(target.log, vec!["x/None"]);
    }

    #[test]
    fn null_into_required_parameter_fails_at_invocation() {
        let setter = Setter::new("foo", |_: &mut Target, _: String| {});
        let mut target = Target::default();
        let err = setter.invoke(&mut target, vec![Value::Null]).unwrap_err();
        assert!(err.to_string().contains("expected String, got null"), "{err}");
    }

    #[test]
    fn setter_errors_surface_their_own_message() {
        let setter = Setter::new("foo", |_: &mut Target, n: i32| {
            if n < 0 { Err("must not be negative") } else { Ok(()) }
        });
        let mut target = Target::default();
        let err = setter.invoke(&mut target, vec![Value::Int(-1)]).unwrap_err();
        assert!(matches!(err, Error::Invocation { .. }));
        assert_eq!(err.to_string(), "must not be negative");
    }

    #[test]
    fn setter_errors_of_this_crate_keep_their_variant() {
        let setter = Setter::new("foo", |_: &mut Target, name: String| -> Result<()> {
            Err(Error::ResourceNotFound { name })
        });
        let mut target = Target::default();
        let err = setter
            .invoke(&mut target, vec![Value::String("x".into())])
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { ref name } if name == "x"), "{err:?}");
    }

    #[test]
    fn collections_convert_element_wise() {
        let setter = Setter::new("names", |t: &mut Target, names: Vec<String>| {
            t.log.extend(names);
        });
        let mut target = Target::default();
        setter
            .invoke(
                &mut target,
                vec![Value::Set(vec![Value::String("a".into()), Value::String("b".into())])],
            )
            .unwrap();
        assert_eq!(target.log, vec!["a", "b"]);

        let err = setter
            .invoke(&mut target, vec![Value::List(vec![Value::Int(1)])])
            .unwrap_err();
        assert!(err.to_string().contains("expected String, got i32"));
    }

    #[test]
    fn zero_arity_setters() {
        let setter = Setter::new("reset", |t: &mut Target| t.log.clear());
        let mut target = Target {
            log: vec!["x".into()],
        };
        assert!(setter.accepts(&[]));
        setter.invoke(&mut target, Vec::new()).unwrap();
        assert!(target.log.is_empty());
    }
}

//! Extension points: which tags are natives, how their text converts, and which
//! classes are shared through the identity cache.

use std::path::Path;

use regex::Regex;
use url::Url;

use crate::bundle::ResourceBundle;
use crate::error::{Error, Result};
use crate::iface::{Inspector, WidgetBuilder};
use crate::reader::ConfigReader;
use crate::registry::ClassDef;
use crate::resource::{ResourceResolver, ResourceStream};
use crate::value::Value;

const NATIVES: &[&str] = &[
    "null", "string", "class", "pattern", "int", "boolean", "resource", "url", "bundle",
];

/// Overridable reader behaviour. Every method has a default; implement only what
/// you need and pass the hooks to [`ConfigReader::with_hooks`].
///
/// # Example
///
/// ```
/// use metawidget_config::{ConfigReader, Options, ReaderHooks, Registry, Result, Value};
///
/// struct Upper;
///
/// impl ReaderHooks for Upper {
///     fn is_native(&self, name: &str) -> bool {
///         name == "upper" || metawidget_config::DefaultHooks.is_native(name)
///     }
///
///     fn create_native(&self, reader: &ConfigReader, name: &str, text: &str) -> Result<Value> {
///         match name {
///             "upper" => Ok(Value::String(text.to_uppercase())),
///             _ => metawidget_config::create_default_native(reader, name, text),
///         }
///     }
/// }
///
/// let reader = ConfigReader::with_hooks(Registry::new(), Options::default(), Upper);
/// assert!(reader.hooks().is_native("upper"));
/// ```
pub trait ReaderHooks: Send + Sync {
    /// Whether `name` (an unqualified tag) is a native scalar.
    fn is_native(&self, name: &str) -> bool {
        NATIVES.contains(&name)
    }

    /// Convert the text recorded inside `<name>` into a value.
    fn create_native(&self, reader: &ConfigReader, name: &str, text: &str) -> Result<Value> {
        create_default_native(reader, name, text)
    }

    /// A fresh, empty collection for `<name>`, or `None` if `name` is not a collection tag.
    fn create_native_collection(&self, name: &str) -> Option<Value> {
        match name {
            "list" => Some(Value::List(Vec::new())),
            "set" => Some(Value::Set(Vec::new())),
            _ => None,
        }
    }

    /// Whether one instance of `class` may be shared by every read of the same document.
    fn is_immutable_threadsafe(&self, class: &ClassDef) -> bool {
        class.is_assignable_to::<dyn Inspector>() || class.is_assignable_to::<dyn WidgetBuilder>()
    }
}

/// The builtin natives and the Inspector/WidgetBuilder caching rule.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl ReaderHooks for DefaultHooks {}

/// The builtin native conversions, for custom hooks that fall back to them.
///
/// Arguments:
/// - `reader`: resolves classes, resources and bundles.
/// - `name`: the native tag.
/// - `text`: the recorded character data, untrimmed.
pub fn create_default_native(reader: &ConfigReader, name: &str, text: &str) -> Result<Value> {
    match name {
        "null" => Ok(Value::Null),
        "string" => Ok(Value::String(text.to_owned())),
        "class" => {
            if text.is_empty() {
                return Ok(Value::Null);
            }
            reader
                .registry()
                .find(text)
                .map(Value::Class)
                .ok_or_else(|| Error::unknown_class(text))
        }
        "pattern" => Regex::new(text)
            .map(Value::Pattern)
            .map_err(|e| Error::native(format!("Invalid pattern '{text}': {e}"))),
        "int" => text
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|e| Error::native(format!("Invalid int '{text}': {e}"))),
        "boolean" => Ok(Value::Bool(text.eq_ignore_ascii_case("true"))),
        "resource" => reader.open_resource(text).map(Value::Stream),
        "url" => open_url(text).map(Value::Stream),
        "bundle" => ResourceBundle::load(reader, text).map(Value::Bundle),
        _ => Err(Error::native(format!("Don't know how to convert '{text}' to a {name}"))),
    }
}

fn open_url(text: &str) -> Result<ResourceStream> {
    let url = Url::parse(text).map_err(|e| Error::native(format!("Invalid url '{text}': {e}")))?;
    if url.scheme() != "file" {
        return Err(Error::native(format!(
            "Unsupported url scheme '{}' in {text}",
            url.scheme()
        )));
    }
    let path = url
        .to_file_path()
        .map_err(|_| Error::native(format!("Invalid file url {text}")))?;
    read_file(&path, text)
}

fn read_file(path: &Path, name: &str) -> Result<ResourceStream> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(ResourceStream::new(name, bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::ResourceNotFound {
            name: name.to_owned(),
        }),
        Err(cause) => Err(Error::IOError { cause }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn reader() -> ConfigReader {
        ConfigReader::new(Registry::new())
    }

    #[test]
    fn scalars_convert() {
        let reader = reader();
        let native = |name, text| create_default_native(&reader, name, text).unwrap();
        assert_eq!(native("null", "ignored"), Value::Null);
        assert_eq!(native("string", " spaced "), Value::String(" spaced ".into()));
        assert_eq!(native("int", "-42"), Value::Int(-42));
        assert_eq!(native("boolean", "TRUE"), Value::Bool(true));
        assert_eq!(native("boolean", "yes"), Value::Bool(false));
        assert_eq!(native("class", ""), Value::Null);
        assert_eq!(native("class", "java.lang.String").type_name(), "Class");
    }

    #[test]
    fn int_parsing_is_strict() {
        let reader = reader();
        for text in [" 1", "1.0", "", "2147483648"] {
            let err = create_default_native(&reader, "int", text).unwrap_err();
            assert!(matches!(err, Error::Native { .. }), "{text}: {err}");
        }
    }

    #[test]
    fn unknown_class_is_reported() {
        let err = create_default_native(&reader(), "class", "org.example.Nope").unwrap_err();
        assert_eq!(err.to_string(), "No such class org.example.Nope");
    }

    #[test]
    fn patterns_compile() {
        let value = create_default_native(&reader(), "pattern", "^a+$").unwrap();
        let Value::Pattern(regex) = value else { panic!("not a pattern") };
        assert!(regex.is_match("aaa"));
        assert!(create_default_native(&reader(), "pattern", "(").is_err());
    }

    #[test]
    fn file_urls_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "hello").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let Value::Stream(stream) = create_default_native(&reader(), "url", url.as_str()).unwrap() else {
            panic!("not a stream")
        };
        assert_eq!(stream.bytes(), b"hello");

        let err = create_default_native(&reader(), "url", "http://example.com/x").unwrap_err();
        assert!(err.to_string().contains("Unsupported url scheme 'http'"));
    }

    #[test]
    fn unknown_native_names_fail() {
        let err = create_default_native(&reader(), "date", "2020").unwrap_err();
        assert_eq!(err.to_string(), "Don't know how to convert '2020' to a date");
    }

    #[test]
    fn collections_and_predicates() {
        let hooks = DefaultHooks;
        assert_eq!(hooks.create_native_collection("set"), Some(Value::Set(Vec::new())));
        assert_eq!(hooks.create_native_collection("list"), Some(Value::List(Vec::new())));
        assert!(hooks.create_native_collection("array").is_none());
        assert!(hooks.create_native_collection("map").is_none());
        assert!(hooks.is_native("bundle"));
        assert!(!hooks.is_native("list"));
    }
}

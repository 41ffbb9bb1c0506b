//! The element handler: a state machine over streaming XML callbacks that builds
//! the declared object graph.
//!
//! Every non-skipped start tag below the root pushes exactly one [`Frame`] and the
//! matching end tag pops it. Closed frames hand their value to the frame below
//! (a setter's argument list or a collection), or become the result when they
//! close at depth 1.

use std::any::{Any, TypeId};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::cache::DocumentEntries;
use crate::error::{Error, Result};
use crate::events::{ContentHandler, StartTag};
use crate::location::Location;
use crate::reader::ConfigReader;
use crate::registry::{ClassRef, Instance, uppercase_first};
use crate::resource::ResourceResolver;
use crate::value::{Object, Value};

/// Namespace marker introducing a package name: `java:org.example`.
const PACKAGE_NAMESPACE: &str = "java:";

/// What the next start tag may mean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Expecting {
    Root,
    /// A top-level declaration, to be matched against the target.
    Target,
    Object,
    /// A setter name.
    Method,
}

/// What the caller asked to be configured.
pub(crate) enum Target<'a> {
    /// Any single top-level declaration.
    Any,
    /// A declaration whose class can be viewed as the type with view id `view`.
    Type { view: TypeId, name: String },
    /// The caller's own instance, of registered class `class`.
    Instance {
        class: ClassRef,
        instance: Option<&'a mut dyn Any>,
    },
}

impl Target<'_> {
    fn describe(&self) -> String {
        match self {
            Target::Any => "any object".to_owned(),
            Target::Type { name, .. } => name.clone(),
            Target::Instance { class, .. } => class.name().to_owned(),
        }
    }
}

/// An instance whose setters are being called.
enum Building<'a> {
    Owned(Instance),
    Borrowed(&'a mut dyn Any),
}

impl Building<'_> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        match self {
            Building::Owned(instance) => &mut **instance,
            Building::Borrowed(instance) => &mut **instance,
        }
    }
}

/// One open element.
enum Frame<'a> {
    /// A setter call collecting its arguments.
    Method { name: String, args: Vec<Value> },
    /// A native scalar recording its text.
    Native { name: String, text: String },
    Collection { value: Value },
    /// A config object whose setters are being called; `class` is built from it on close.
    Configured {
        class: ClassRef,
        config_class: ClassRef,
        config: Instance,
    },
    Object {
        class: ClassRef,
        instance: Building<'a>,
    },
    /// An instance taken from the identity cache; its subtree is skipped.
    Cached { object: Object },
    /// A top-level declaration that does not match the target; its subtree is skipped.
    WrongType,
}

/// The outcome of a successful pass.
#[derive(Debug)]
pub(crate) enum Configured {
    Object(Object),
    /// The caller's instance was configured in place.
    Instance(ClassRef),
}

impl Configured {
    fn class_name(&self) -> &str {
        match self {
            Configured::Object(object) => object.class().name(),
            Configured::Instance(class) => class.name(),
        }
    }
}

pub(crate) struct ConfigHandler<'r, 'a> {
    reader: &'r ConfigReader,
    /// The document text: the identity cache key.
    xml: &'r Arc<str>,
    /// This document's identity cache entries, resolved on first use.
    entries: Option<DocumentEntries>,
    target: Target<'a>,
    expecting: Expecting,
    frames: SmallVec<[Frame<'a>; 16]>,
    result: Option<Configured>,
    /// 1-based index of the most recent start tag, counting skipped ones.
    element: usize,
    depth: usize,
    /// Start tags deeper than this are skipped.
    ignore_after_depth: Option<usize>,
    /// Element at which a cacheable instance began, until it is stored.
    store_as_element: Option<usize>,
    immutable_at_depth: Option<usize>,
}

impl<'r, 'a> ConfigHandler<'r, 'a> {
    pub(crate) fn new(reader: &'r ConfigReader, xml: &'r Arc<str>, target: Target<'a>) -> Self {
        Self {
            reader,
            xml,
            entries: None,
            target,
            expecting: Expecting::Root,
            frames: SmallVec::new(),
            result: None,
            element: 0,
            depth: 0,
            ignore_after_depth: None,
            store_as_element: None,
            immutable_at_depth: None,
        }
    }

    /// The configured result once the document has been fully read.
    pub(crate) fn finish(self) -> Result<Configured> {
        if !self.frames.is_empty() {
            return Err(Error::msg("Config still processing"));
        }
        self.result.ok_or_else(|| Error::NoMatch {
            target: self.target.describe(),
        })
    }

    /// Resolve a tag to a registered class: the namespace after `java:` is the
    /// package, the capitalised local name the simple name.
    fn class_for_name(&self, tag: &StartTag<'_>) -> Result<ClassRef> {
        let namespace = tag.namespace.unwrap_or("");
        let Some(at) = namespace.find(PACKAGE_NAMESPACE) else {
            return Err(Error::xml(format!(
                "Namespace must contain {PACKAGE_NAMESPACE}, found '{namespace}' on <{}>",
                tag.local_name
            )));
        };
        let package = &namespace[at + PACKAGE_NAMESPACE.len()..];
        let simple = uppercase_first(tag.local_name);
        let name = if package.is_empty() {
            simple
        } else {
            format!("{package}.{simple}")
        };
        self.reader
            .registry()
            .find(&name)
            .ok_or_else(|| Error::unknown_class(name))
    }

    fn cache_entries(&mut self) -> &DocumentEntries {
        let (cache, xml) = (self.reader.cache(), self.xml);
        self.entries.get_or_insert_with(|| cache.document(xml))
    }

    fn resolver(&self) -> Arc<dyn ResourceResolver> {
        self.reader.detached_resolver()
    }

    fn start_target(&mut self, tag: &StartTag<'_>) -> Result<()> {
        if self.depth != 2 {
            return Err(Error::xml(format!(
                "<{}> must be a direct child of the root element",
                tag.local_name
            )));
        }
        let class = self.class_for_name(tag)?;
        let matches = match &self.target {
            Target::Any => true,
            Target::Type { view, .. } => class.is_assignable_to_view(*view),
            Target::Instance { class: own, .. } => own.is_assignable_to_class(&class),
        };
        if !matches {
            debug!(
                class = class.name(),
                target = %self.target.describe(),
                line = tag.location.line(),
                "skipping top-level declaration of another type"
            );
            self.frames.push(Frame::WrongType);
            self.ignore_after_depth = Some(2);
            return Ok(());
        }
        if let Some(existing) = &self.result {
            return Err(Error::Ambiguous {
                existing: existing.class_name().to_owned(),
                candidate: class.name().to_owned(),
                location: tag.location,
            });
        }

        let frame = if let Target::Instance { class: own, instance } = &mut self.target {
            let instance = instance
                .take()
                .ok_or_else(|| Error::msg(format!("{} was already configured", own.name())))?;
            Frame::Object {
                class: own.clone(),
                instance: Building::Borrowed(instance),
            }
        } else {
            self.object_frame(tag)?
        };
        self.frames.push(frame);
        self.expecting = Expecting::Method;
        Ok(())
    }

    fn start_object(&mut self, tag: &StartTag<'_>) -> Result<()> {
        let hooks = self.reader.hooks();
        if hooks.is_native(tag.local_name) {
            self.frames.push(Frame::Native {
                name: tag.local_name.to_owned(),
                text: String::new(),
            });
            self.expecting = Expecting::Method;
            return Ok(());
        }
        if let Some(value) = hooks.create_native_collection(tag.local_name) {
            self.frames.push(Frame::Collection { value });
            self.expecting = Expecting::Object;
            return Ok(());
        }
        let frame = self.object_frame(tag)?;
        self.frames.push(frame);
        self.expecting = Expecting::Method;
        Ok(())
    }

    /// Frame for an object declaration: a cached instance, a config object, or a
    /// default-constructed instance.
    fn object_frame(&mut self, tag: &StartTag<'_>) -> Result<Frame<'a>> {
        let class = self.class_for_name(tag)?;
        let reader = self.reader;
        let registry = reader.registry();

        if self.store_as_element.is_none() && reader.hooks().is_immutable_threadsafe(&class) {
            let element = self.element;
            if let Some(object) = self.cache_entries().get(element) {
                debug!(class = class.name(), element, "reusing cached instance");
                self.ignore_after_depth = Some(self.depth);
                return Ok(Frame::Cached { object });
            }
            self.store_as_element = Some(self.element);
            self.immutable_at_depth = Some(self.depth);
        }

        if let Some(config) = tag.attribute("config") {
            let qualified = if config.contains('.') || class.package().is_empty() {
                config.to_owned()
            } else {
                format!("{}.{config}", class.package())
            };
            let config_class = registry.find(&qualified).ok_or_else(|| {
                Error::construction(format!("No such configuration class {qualified}"))
            })?;
            let mut config = config_class.construct(registry)?;
            if config_class.needs_resource_resolver() {
                config_class.inject_resolver(&mut *config, self.resolver());
            }
            trace!(class = class.name(), config = config_class.name(), "configuring through config object");
            return Ok(Frame::Configured {
                class,
                config_class,
                config,
            });
        }

        let mut instance = class.construct(registry)?;
        if class.needs_resource_resolver() {
            class.inject_resolver(&mut *instance, self.resolver());
        }
        Ok(Frame::Object {
            class,
            instance: Building::Owned(instance),
        })
    }

    /// Hand a finished value to the enclosing argument list or collection.
    fn append(&mut self, value: Value) -> Result<()> {
        match self.frames.last_mut() {
            Some(Frame::Method { args, .. }) => {
                args.push(value);
                Ok(())
            }
            Some(Frame::Collection { value: collection }) => {
                collection.push(value);
                Ok(())
            }
            _ => Err(Error::xml(format!(
                "{} is not inside a setter or collection",
                value.type_name()
            ))),
        }
    }

    fn close_object(&mut self, frame: Frame<'a>) -> Result<()> {
        let (object, cached) = match frame {
            Frame::Configured {
                class,
                config_class,
                config,
            } => {
                let instance = class.construct_with_config(&config_class, config)?;
                (class.seal(instance)?, false)
            }
            Frame::Object {
                class,
                instance: Building::Owned(instance),
            } => (class.seal(instance)?, false),
            Frame::Object {
                class,
                instance: Building::Borrowed(_),
            } => {
                self.result = Some(Configured::Instance(class));
                self.expecting = Expecting::Target;
                return Ok(());
            }
            Frame::Cached { object } => (object, true),
            _ => return Err(Error::xml("Unbalanced object frame")),
        };

        let object = match self.store_as_element {
            Some(element)
                if !cached
                    && self.immutable_at_depth == Some(self.depth + 1)
                    && self.reader.hooks().is_immutable_threadsafe(object.class()) =>
            {
                self.store_as_element = None;
                self.cache_entries().insert(element, object)
            }
            _ => object,
        };

        if self.depth == 1 {
            self.result = Some(Configured::Object(object));
            self.expecting = Expecting::Target;
        } else {
            self.append(Value::Object(object))?;
            self.expecting = Expecting::Object;
        }
        Ok(())
    }

    fn close_method(&mut self, name: String, args: Vec<Value>) -> Result<()> {
        let (class, target) = match self.frames.last_mut() {
            Some(Frame::Object { class, instance }) => (&*class, instance.as_any_mut()),
            Some(Frame::Configured {
                config_class,
                config,
                ..
            }) => (&*config_class, &mut **config as &mut dyn Any),
            _ => return Err(Error::xml(format!("<{name}> is not inside an object"))),
        };
        let Some(setter) = class.find_setter(&name, &args) else {
            let types: Vec<&str> = args.iter().map(Value::type_name).collect();
            return Err(Error::NoSuchSetter {
                signature: format!("{}.{name}( {} )", class.name(), types.join(", ")),
                location: Location::UNKNOWN,
            });
        };
        trace!(class = class.name(), setter = ?setter, "invoking setter");
        setter.invoke(target, args)?;
        self.expecting = Expecting::Method;
        Ok(())
    }
}

impl ContentHandler for ConfigHandler<'_, '_> {
    fn start_element(&mut self, tag: &StartTag<'_>) -> Result<()> {
        self.element += 1;
        self.depth += 1;
        if self.ignore_after_depth.is_some_and(|ignore| self.depth > ignore) {
            return Ok(());
        }
        if let Some(Frame::Native { name, .. }) = self.frames.last() {
            return Err(Error::xml(format!(
                "<{}> is not allowed inside <{name}>",
                tag.local_name
            )));
        }

        match self.expecting {
            Expecting::Root => {
                self.expecting = Expecting::Target;
                Ok(())
            }
            Expecting::Target => self.start_target(tag),
            Expecting::Object => self.start_object(tag),
            Expecting::Method => {
                self.frames.push(Frame::Method {
                    name: tag.local_name.to_owned(),
                    args: Vec::new(),
                });
                self.expecting = Expecting::Object;
                Ok(())
            }
        }
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.ignore_after_depth.is_some_and(|ignore| self.depth > ignore) {
            return Ok(());
        }
        if let Some(Frame::Native { text: recorded, .. }) = self.frames.last_mut() {
            recorded.push_str(text);
        }
        Ok(())
    }

    fn end_element(&mut self, _location: Location) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        if let Some(ignore) = self.ignore_after_depth {
            if self.depth >= ignore {
                return Ok(());
            }
            self.ignore_after_depth = None;
        }
        if self.depth == 0 {
            return Ok(());
        }

        let Some(frame) = self.frames.pop() else {
            return Err(Error::xml("Unbalanced end of element"));
        };
        match frame {
            Frame::Native { name, text } => {
                let value = self.reader.hooks().create_native(self.reader, &name, &text)?;
                self.append(value)?;
                self.expecting = Expecting::Object;
                Ok(())
            }
            Frame::Collection { value } => {
                self.append(value)?;
                self.expecting = Expecting::Object;
                Ok(())
            }
            Frame::Method { name, args } => self.close_method(name, args),
            Frame::WrongType => Ok(()),
            frame => self.close_object(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClassBuilder, Registry};
    use indoc::indoc;

    #[derive(Default)]
    struct Widget {
        name: String,
    }

    fn reader() -> ConfigReader {
        let registry = Registry::new().with(
            ClassBuilder::<Widget>::new("org.example.Widget")
                .default_constructor()
                .setter("name", |w: &mut Widget, name: String| w.name = name),
        );
        ConfigReader::with_options(registry, crate::options! { with_snippet: false })
    }

    fn run(reader: &ConfigReader, xml: &str, target: Target<'_>) -> Result<Configured> {
        let text: Arc<str> = Arc::from(xml);
        let mut handler = ConfigHandler::new(reader, &text, target);
        crate::events::drive(&text, reader.options(), &mut handler)?;
        handler.finish()
    }

    #[test]
    fn frames_balance_and_result_is_built() {
        let reader = reader();
        let xml = indoc! {r#"
            <root xmlns="java:org.example">
                <widget><name><string>w</string></name></widget>
            </root>
        "#};
        let Configured::Object(object) = run(&reader, xml, Target::Any).unwrap() else {
            panic!("expected an object")
        };
        assert_eq!(object.get::<Widget>().unwrap().name, "w");
    }

    #[test]
    fn elements_inside_natives_are_rejected() {
        let reader = reader();
        let xml = r#"<root xmlns="java:org.example"><widget><name><string>a<b/></string></name></widget></root>"#;
        let err = run(&reader, xml, Target::Any).unwrap_err();
        assert!(err.to_string().starts_with("<b> is not allowed inside <string>"), "{err}");
    }

    #[test]
    fn tags_outside_a_package_namespace_are_rejected() {
        let reader = reader();
        let err = run(&reader, "<root><widget/></root>", Target::Any).unwrap_err();
        assert!(err.to_string().starts_with("Namespace must contain java:"), "{err}");
    }

    #[test]
    fn no_declaration_is_no_match() {
        let reader = reader();
        let err = run(&reader, "<root/>", Target::Any).unwrap_err();
        assert_eq!(err.to_string(), "No match for any object within config");
    }

    #[test]
    fn ambiguity_points_at_the_second_declaration() {
        let reader = reader();
        let xml = indoc! {r#"
            <root xmlns="java:org.example">
                <widget/>
                <widget/>
            </root>
        "#};
        let err = run(&reader, xml, Target::Any).unwrap_err();
        assert!(matches!(err, Error::Ambiguous { .. }), "{err:?}");
        let location = err.location().unwrap();
        assert_eq!((location.line(), location.column()), (3, 5));
    }

    #[test]
    fn no_such_setter_names_the_signature() {
        let reader = reader();
        let xml = r#"<root xmlns="java:org.example"><widget><name><int>1</int><null/></name></widget></root>"#;
        let err = run(&reader, xml, Target::Any).unwrap_err();
        assert!(
            err.to_string().starts_with("No such setter org.example.Widget.name( i32, null )"),
            "{err}"
        );
    }
}

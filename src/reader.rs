//! The public entry point: reads a configuration document and returns the object it declares.

use std::any::{Any, type_name};
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::cache::ImmutableThreadsafeCache;
use crate::error::{Error, Result};
use crate::events;
use crate::handler::{ConfigHandler, Configured, Target};
use crate::hooks::{DefaultHooks, ReaderHooks};
use crate::input;
use crate::options::Options;
use crate::registry::Registry;
use crate::resource::{self, FileSystemLoader, MemoryLoader, ResourceLoader, ResourceResolver, ResourceStream};
use crate::value::Object;

/// Reads `metadata.xml`-style configuration documents.
///
/// A document declares objects by tag (namespace `java:<package>` plus the
/// capitalised tag name gives the registered class name), calls setters by
/// nested tag, and passes arguments as native scalars, collections or nested
/// objects:
///
/// ```
/// use metawidget_config::{ClassBuilder, ConfigReader, Registry};
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
/// let reader = ConfigReader::new(registry);
///
/// let xml = r#"<root xmlns:java="java:org.example">
///     <java:widget><java:setName><string>foo</string></java:setName></java:widget>
/// </root>"#;
/// let widget = reader.configure_reader::<Widget>(xml.as_bytes())?;
/// assert_eq!(widget.name, "foo");
/// # Ok::<(), metawidget_config::Error>(())
/// ```
///
/// Readers are cheap to clone; clones share the registry, the resources and the
/// identity cache, and may be used from several threads at once.
#[derive(Clone)]
pub struct ConfigReader {
    inner: Arc<ReaderInner>,
}

struct ReaderInner {
    registry: Registry,
    hooks: Box<dyn ReaderHooks>,
    options: Options,
    cache: ImmutableThreadsafeCache,
    memory: MemoryLoader,
    roots: Vec<FileSystemLoader>,
}

impl ConfigReader {
    /// A reader with default [`Options`] and [`DefaultHooks`].
    pub fn new(registry: Registry) -> Self {
        Self::with_options(registry, Options::default())
    }

    pub fn with_options(registry: Registry, options: Options) -> Self {
        Self::with_hooks(registry, options, DefaultHooks)
    }

    /// A reader with custom native conversions or caching rules.
    pub fn with_hooks(registry: Registry, options: Options, hooks: impl ReaderHooks + 'static) -> Self {
        let roots = options
            .resource_roots
            .iter()
            .cloned()
            .map(FileSystemLoader::new)
            .collect();
        Self {
            inner: Arc::new(ReaderInner {
                registry,
                hooks: Box::new(hooks),
                options,
                cache: ImmutableThreadsafeCache::new(),
                memory: MemoryLoader::new(),
                roots,
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn hooks(&self) -> &dyn ReaderHooks {
        &*self.inner.hooks
    }

    /// Instances shared across reads of identical documents.
    pub fn cache(&self) -> &ImmutableThreadsafeCache {
        &self.inner.cache
    }

    /// Register an in-memory resource, searched before the filesystem roots.
    pub fn add_resource(&self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.inner.memory.insert(name, bytes);
    }

    /// Read the resource `name` and return the single top-level declaration assignable to `T`.
    ///
    /// `T` is a registered concrete type or an interface such as `dyn Inspector`.
    /// Declarations of other types are skipped; zero matches fail with
    /// [`Error::NoMatch`], two or more with [`Error::Ambiguous`].
    pub fn configure<T: ?Sized + Send + Sync + 'static>(&self, resource: &str) -> Result<Arc<T>> {
        let stream = self.open_resource(resource)?;
        self.configure_named::<T>(stream, resource)
    }

    /// [`ConfigReader::configure`] for a document read from `reader`.
    pub fn configure_reader<T: ?Sized + Send + Sync + 'static>(&self, reader: impl Read) -> Result<Arc<T>> {
        self.configure_named::<T>(reader, "<input>")
    }

    fn configure_named<T: ?Sized + Send + Sync + 'static>(&self, reader: impl Read, path: &str) -> Result<Arc<T>> {
        let name = self
            .registry()
            .find_by_type::<T>()
            .map(|class| class.name().to_owned())
            .unwrap_or_else(|| type_name::<T>().to_owned());
        let target = Target::Type {
            view: std::any::TypeId::of::<Arc<T>>(),
            name,
        };
        match self.run(reader, path, target)? {
            Configured::Object(object) => object.get::<T>().ok_or_else(|| {
                Error::msg(format!(
                    "{} cannot be viewed as {}",
                    object.class().name(),
                    type_name::<T>()
                ))
            }),
            Configured::Instance(class) => Err(Error::msg(format!(
                "{} was configured in place",
                class.name()
            ))),
        }
    }

    /// Read the resource `name` and apply the matching top-level declaration's setters
    /// to `instance` in place.
    ///
    /// `T` must be registered. A declaration matches when it names `T`'s class or an
    /// interface that class implements.
    pub fn configure_instance<T: Send + Sync + 'static>(&self, resource: &str, instance: &mut T) -> Result<()> {
        let stream = self.open_resource(resource)?;
        self.configure_instance_named(stream, resource, instance)
    }

    /// [`ConfigReader::configure_instance`] for a document read from `reader`.
    pub fn configure_instance_reader<T: Send + Sync + 'static>(
        &self,
        reader: impl Read,
        instance: &mut T,
    ) -> Result<()> {
        self.configure_instance_named(reader, "<input>", instance)
    }

    fn configure_instance_named<T: Send + Sync + 'static>(
        &self,
        reader: impl Read,
        path: &str,
        instance: &mut T,
    ) -> Result<()> {
        let class = self
            .registry()
            .find_by_type::<T>()
            .ok_or_else(|| Error::unknown_class(type_name::<T>()))?;
        let target = Target::Instance {
            class,
            instance: Some(instance as &mut dyn Any),
        };
        self.run(reader, path, target).map(|_| ())
    }

    /// Read the resource `name` and construct its single top-level declaration, whatever its type.
    pub fn configure_object(&self, resource: &str) -> Result<Object> {
        let stream = self.open_resource(resource)?;
        self.configure_object_named(stream, resource)
    }

    /// [`ConfigReader::configure_object`] for a document read from `reader`.
    pub fn configure_object_reader(&self, reader: impl Read) -> Result<Object> {
        self.configure_object_named(reader, "<input>")
    }

    fn configure_object_named(&self, reader: impl Read, path: &str) -> Result<Object> {
        match self.run(reader, path, Target::Any)? {
            Configured::Object(object) => Ok(object),
            Configured::Instance(class) => Err(Error::msg(format!(
                "{} was configured in place",
                class.name()
            ))),
        }
    }

    /// Drain `reader`, then stream the text through a fresh handler.
    ///
    /// The input is closed before parsing starts, whatever the outcome.
    fn run(&self, reader: impl Read, path: &str, target: Target<'_>) -> Result<Configured> {
        let options = self.options();
        let text = input::read_to_string(reader, options.max_input_bytes)
            .map_err(|cause| Error::IOError { cause })?;
        let xml: Arc<str> = Arc::from(text);
        debug!(resource = path, bytes = xml.len(), "reading configuration");

        let mut handler = ConfigHandler::new(self, &xml, target);
        let result = events::drive(&xml, options, &mut handler).and_then(|()| handler.finish());

        result.map_err(|err| {
            if options.with_snippet && options.crop_radius > 0 {
                err.with_snippet(&xml, path, options.crop_radius)
            } else {
                err
            }
        })
    }
}

impl ConfigReader {
    /// The resolver handed to configured objects. It does not keep the reader, and
    /// so the identity cache holding those objects, alive.
    pub(crate) fn detached_resolver(&self) -> Arc<dyn ResourceResolver> {
        Arc::new(DetachedResolver {
            inner: Arc::downgrade(&self.inner),
        })
    }
}

impl ReaderInner {
    fn open_resource(&self, name: &str) -> Result<ResourceStream> {
        if name.trim().is_empty() {
            return Err(Error::msg("No resource specified"));
        }
        let context = resource::context_loader();
        let loaders = context
            .as_deref()
            .into_iter()
            .chain(std::iter::once(&self.memory as &dyn ResourceLoader))
            .chain(self.roots.iter().map(|root| root as &dyn ResourceLoader));
        for loader in loaders {
            if let Some(stream) = loader.load(name)? {
                return Ok(stream);
            }
        }
        Err(Error::ResourceNotFound {
            name: name.to_owned(),
        })
    }
}

impl ResourceResolver for ConfigReader {
    /// Search order: this thread's context loader, resources added with
    /// [`ConfigReader::add_resource`], then each of [`Options::resource_roots`].
    fn open_resource(&self, name: &str) -> Result<ResourceStream> {
        self.inner.open_resource(name)
    }
}

struct DetachedResolver {
    inner: Weak<ReaderInner>,
}

impl ResourceResolver for DetachedResolver {
    fn open_resource(&self, name: &str) -> Result<ResourceStream> {
        let inner = self.inner.upgrade().ok_or_else(|| {
            Error::msg(format!("Unable to open {name}: the configuration reader was dropped"))
        })?;
        inner.open_resource(name)
    }
}

impl fmt::Debug for ConfigReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigReader")
            .field("registry", &self.inner.registry)
            .field("options", &self.inner.options)
            .field("cache", &self.inner.cache)
            .field("memory", &self.inner.memory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::with_context_loader;

    #[test]
    fn blank_resource_names_are_rejected() {
        let reader = ConfigReader::new(Registry::new());
        let err = reader.open_resource("  ").unwrap_err();
        assert_eq!(err.to_string(), "No resource specified");
    }

    #[test]
    fn context_loader_comes_first() {
        let reader = ConfigReader::with_options(Registry::new(), crate::options! { resource_roots: Vec::new() });
        reader.add_resource("m.xml", b"memory".to_vec());
        let context: Arc<dyn ResourceLoader> = Arc::new(MemoryLoader::new().with("m.xml", b"context".to_vec()));

        let from_context = with_context_loader(context, || reader.open_resource("m.xml").unwrap());
        assert_eq!((&from_context).bytes(), b"context");
        assert_eq!((&reader.open_resource("m.xml").unwrap()).bytes(), b"memory");
    }

    #[test]
    fn missing_resources_are_reported() {
        let reader = ConfigReader::with_options(Registry::new(), crate::options! { resource_roots: Vec::new() });
        let err = reader.configure_object("missing.xml").unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "Unable to locate missing.xml");
    }

    #[test]
    fn filesystem_roots_are_searched_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("only-second.xml"), "2").unwrap();
        std::fs::write(first.path().join("both.xml"), "1").unwrap();
        std::fs::write(second.path().join("both.xml"), "2").unwrap();

        let reader = ConfigReader::with_options(
            Registry::new(),
            crate::options! {
                resource_roots: vec![first.path().to_path_buf(), second.path().to_path_buf()],
            },
        );
        assert_eq!((&reader.open_resource("both.xml").unwrap()).bytes(), b"1");
        assert_eq!((&reader.open_resource("only-second.xml").unwrap()).bytes(), b"2");
    }

    #[test]
    fn oversized_input_is_an_io_error() {
        let reader = ConfigReader::with_options(Registry::new(), crate::options! { max_input_bytes: Some(8) });
        let err = reader
            .configure_object_reader("<root>0123456789</root>".as_bytes())
            .unwrap_err();
        assert!(matches!(err, Error::IOError { .. }), "{err}");
    }
}

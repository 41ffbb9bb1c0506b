//! Named resources: loaders, the per-thread context loader, and opened streams.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::Result;

/// An opened resource.
///
/// The content is loaded eagerly; the stream reads from a shared buffer, so clones
/// are cheap and each clone keeps its own read position.
#[derive(Clone)]
pub struct ResourceStream {
    name: Arc<str>,
    bytes: Arc<[u8]>,
    position: usize,
}

impl ResourceStream {
    pub fn new(name: impl Into<Arc<str>>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            position: 0,
        }
    }

    /// The name the resource was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The whole content, regardless of how much has been read.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn ptr_eq(&self, other: &ResourceStream) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes) && self.position == other.position
    }
}

impl Read for ResourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.bytes.get(self.position..).unwrap_or(&[]);
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl fmt::Debug for ResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStream")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("position", &self.position)
            .finish()
    }
}

/// Resolves a resource name to an opened stream.
///
/// [`crate::ConfigReader`] implements this; classes registered with
/// [`crate::ClassBuilder::needs_resource_resolver`] receive one on construction.
pub trait ResourceResolver: Send + Sync {
    /// Open `name`, failing with [`crate::Error::ResourceNotFound`] when no loader has it.
    fn open_resource(&self, name: &str) -> Result<ResourceStream>;
}

/// One place resources can come from.
pub trait ResourceLoader: Send + Sync {
    /// `Ok(None)` when this loader does not have `name`.
    fn load(&self, name: &str) -> io::Result<Option<ResourceStream>>;
}

/// Loads resources from files below a root directory.
///
/// Names are relative paths; a leading `/` is ignored and `..` components never match.
#[derive(Clone, Debug)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ResourceLoader for FileSystemLoader {
    fn load(&self, name: &str) -> io::Result<Option<ResourceStream>> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        trace!(resource = name, path = %path.display(), "loaded resource from file");
        Ok(Some(ResourceStream::new(name, bytes)))
    }
}

/// Resources registered in memory, keyed by exact name.
#[derive(Default)]
pub struct MemoryLoader {
    resources: RwLock<AHashMap<String, Arc<[u8]>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) `name`.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.resources.write().insert(name.into(), bytes.into());
    }

    /// Builder-style [`MemoryLoader::insert`].
    pub fn with(self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ResourceLoader for MemoryLoader {
    fn load(&self, name: &str) -> io::Result<Option<ResourceStream>> {
        Ok(self
            .resources
            .read()
            .get(name)
            .map(|bytes| ResourceStream::new(name, Arc::clone(bytes))))
    }
}

impl fmt::Debug for MemoryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resources = self.resources.read();
        let mut names: Vec<&String> = resources.keys().collect();
        names.sort();
        f.debug_struct("MemoryLoader").field("resources", &names).finish()
    }
}

thread_local! {
    static CONTEXT_LOADERS: RefCell<Vec<Arc<dyn ResourceLoader>>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with `loader` installed as this thread's context loader.
///
/// The context loader is consulted before any reader's own loaders. Calls nest;
/// the previous loader is restored when `f` returns or unwinds.
pub fn with_context_loader<R>(loader: Arc<dyn ResourceLoader>, f: impl FnOnce() -> R) -> R {
    CONTEXT_LOADERS.with(|loaders| loaders.borrow_mut().push(loader));
    let guard = Guard;
    let result = f();
    drop(guard);
    result
}

struct Guard;

impl Drop for Guard {
    fn drop(&mut self) {
        CONTEXT_LOADERS.with(|loaders| {
            loaders.borrow_mut().pop();
        });
    }
}

/// The innermost loader installed by [`with_context_loader`] on this thread.
pub(crate) fn context_loader() -> Option<Arc<dyn ResourceLoader>> {
    CONTEXT_LOADERS.with(|loaders| loaders.borrow().last().cloned())
}

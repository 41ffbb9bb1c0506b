//! Identity cache for immutable, threadsafe instances.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::trace;

use crate::value::Object;

/// The instances cached for one document, keyed by element index.
///
/// A read resolves this once and reuses it for every declaration in the document.
#[derive(Clone, Default)]
pub(crate) struct DocumentEntries {
    positions: Arc<RwLock<AHashMap<usize, Object>>>,
}

impl DocumentEntries {
    pub(crate) fn get(&self, element: usize) -> Option<Object> {
        let found = self.positions.read().get(&element).cloned();
        if found.is_some() {
            trace!(element, "identity cache hit");
        }
        found
    }

    /// Store `object` unless another thread got there first, returning the stored instance.
    pub(crate) fn insert(&self, element: usize, object: Object) -> Object {
        let mut positions = self.positions.write();
        let cached = positions.entry(element).or_insert(object);
        trace!(element, class = cached.class().name(), "identity cache store");
        cached.clone()
    }

    fn len(&self) -> usize {
        self.positions.read().len()
    }
}

/// Instances shared across repeated reads of the same document text.
///
/// Keyed by the exact document text, then by the index of the element where
/// construction began. Owned by one [`crate::ConfigReader`]; clones of the reader
/// share it.
#[derive(Default)]
pub struct ImmutableThreadsafeCache {
    documents: RwLock<AHashMap<Arc<str>, DocumentEntries>>,
}

impl ImmutableThreadsafeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance constructed at `element` of `xml`, if any.
    pub fn get(&self, xml: &str, element: usize) -> Option<Object> {
        let entries = self.documents.read().get(xml).cloned()?;
        entries.get(element)
    }

    /// Store `object` unless another thread got there first.
    ///
    /// Returns the instance that is now cached, which callers should use in place of
    /// their own so that every reader of the document sees the same instance.
    pub fn insert(&self, xml: &Arc<str>, element: usize, object: Object) -> Object {
        self.document(xml).insert(element, object)
    }

    /// The entries for `xml`, created empty on first use.
    pub(crate) fn document(&self, xml: &Arc<str>) -> DocumentEntries {
        let documents = self.documents.upgradable_read();
        match documents.get(&**xml) {
            Some(entries) => entries.clone(),
            None => {
                let mut documents = RwLockUpgradableReadGuard::upgrade(documents);
                documents.entry(Arc::clone(xml)).or_default().clone()
            }
        }
    }

    /// Number of cached instances across all documents.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .values()
            .map(DocumentEntries::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct documents with at least one cached instance.
    pub fn documents(&self) -> usize {
        self.documents
            .read()
            .values()
            .filter(|entries| entries.len() > 0)
            .count()
    }

    pub fn clear(&self) {
        self.documents.write().clear();
    }
}

impl fmt::Debug for ImmutableThreadsafeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmutableThreadsafeCache")
            .field("documents", &self.documents())
            .field("instances", &self.len())
            .finish()
    }
}

//! Collaborator interfaces configured by documents.
//!
//! The reader never calls these; they exist so classes can be registered as
//! implementing them, which makes them immutable and threadsafe by default.

use std::any::Any;

use ahash::AHashMap;

use crate::error::Result;

/// Examines a domain object (or type) and describes it as an inspection-result XML document.
pub trait Inspector: Send + Sync {
    /// Inspect `to_inspect`, declared as `type_name`, optionally traversing into the
    /// property path `names`.
    ///
    /// Returns `None` when there is nothing to report.
    fn inspect(&self, to_inspect: Option<&dyn Any>, type_name: &str, names: &[&str]) -> Result<Option<String>>;
}

/// Builds a toolkit widget for one inspected element.
pub trait WidgetBuilder: Send + Sync {
    /// `None` lets the next builder in a chain try.
    fn build_widget(
        &self,
        element_name: &str,
        attributes: &AHashMap<String, String>,
    ) -> Option<Box<dyn Any>>;
}

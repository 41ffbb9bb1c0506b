use std::path::PathBuf;

use crate::budget::{Budget, BudgetReport};
use serde::{Deserialize, Serialize};

/// Reader configuration options.
///
/// Use this to configure the streaming [`Budget`], the input size cap, snippet
/// rendering of errors, and the filesystem roots searched for named resources.
///
/// Example: a reader that only looks for resources under `conf/`.
///
/// ```rust
/// use std::path::PathBuf;
///
/// use metawidget_config::{ConfigReader, Registry};
///
/// let options = metawidget_config::options! {
///     budget: Some(metawidget_config::budget! {
///         max_depth: 64,
///     }),
///     resource_roots: vec![PathBuf::from("conf")],
///     crop_radius: 32,
/// };
///
/// let reader = ConfigReader::with_options(Registry::new(), options);
/// assert_eq!(reader.options().crop_radius, 32);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Options {
    /// Optional XML budget enforced while the document streams through the handler.
    pub budget: Option<Budget>,
    /// Optional callback invoked with the final budget report after parsing.
    /// It is invoked both when parsing is successful and when budget was breached.
    #[serde(skip)]
    pub budget_report: Option<fn(&BudgetReport)>,

    /// Hard cap on the decoded size of one input document, in bytes.
    /// `None` disables the cap. Default: 16 MiB.
    pub max_input_bytes: Option<usize>,

    /// If true (default), public APIs that have access to the original XML input
    /// will wrap returned errors with a snippet wrapper, enabling rustc-like snippet
    /// rendering when a location is available.
    pub with_snippet: bool,

    /// Horizontal crop radius (in character columns) when rendering snippet diagnostics.
    ///
    /// If set to `0`, snippet wrapping is disabled (the original, unwrapped error is returned).
    pub crop_radius: usize,

    /// Directories searched, in order, by the reader's own resource loader after the
    /// in-memory resources. Default: the current directory.
    pub resource_roots: Vec<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            budget: Some(Budget::default()),
            budget_report: None,
            max_input_bytes: Some(16 * 1024 * 1024),
            with_snippet: true,
            crop_radius: 64,
            resource_roots: vec![PathBuf::from(".")],
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("budget", &self.budget)
            .field(
                "budget_report",
                &if self.budget_report.is_some() { "set" } else { "none" },
            )
            .field("max_input_bytes", &self.max_input_bytes)
            .field("with_snippet", &self.with_snippet)
            .field("crop_radius", &self.crop_radius)
            .field("resource_roots", &self.resource_roots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let opts = Options::default();
        assert!(opts.budget.is_some());
        assert!(opts.budget_report.is_none());
        assert_eq!(opts.max_input_bytes, Some(16 * 1024 * 1024));
        assert!(opts.with_snippet);
        assert_eq!(opts.crop_radius, 64);
        assert_eq!(opts.resource_roots, vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_options_debug_format() {
        let opts = Options::default();
        let debug_str = format!("{:?}", opts);
        assert!(debug_str.contains("Options"));
        assert!(debug_str.contains("budget_report: \"none\""));

        fn report(_: &BudgetReport) {}
        let with_cb = Options {
            budget_report: Some(report),
            ..Options::default()
        };
        assert!(format!("{:?}", with_cb).contains("budget_report: \"set\""));
    }

    #[test]
    fn test_macros_override_defaults() {
        let opts = crate::options! {
            budget: Some(crate::budget! { max_elements: 7 }),
            with_snippet: false,
        };
        assert!(!opts.with_snippet);
        let budget = opts.budget.unwrap();
        assert_eq!(budget.max_elements, 7);
        assert_eq!(budget.max_depth, Budget::default().max_depth);
    }
}

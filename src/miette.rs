//! `miette` integration.
//!
//! This module is feature-gated behind the `miette` feature.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};

use crate::Error;
use crate::Location;
use crate::snippet::sanitize_terminal_snippet_preserve_len;

/// Convert a configuration [`Error`] into a `miette::Report`.
///
/// This function takes the XML `source` and a display `file` name/path.
///
/// # Example
///
/// ```rust,no_run
/// use metawidget_config::{ConfigReader, Registry};
///
/// let xml = "<metawidget xmlns=\"java:org.example\">\n  <missing/>\n</metawidget>\n";
/// let reader = ConfigReader::new(Registry::new());
/// let err = reader.configure_object_reader(xml.as_bytes()).unwrap_err();
/// let report = metawidget_config::miette::to_miette_report(&err, xml, "metawidget.xml");
///
/// // `Debug` formatting uses miette's graphical reporter.
/// eprintln!("{report:?}");
/// ```
///
/// Notes:
/// - `Error` intentionally does not retain the full input text.
///   This helper owns a copy of `source` to build a standalone `miette::Report`.
/// - If the error has no known location, the report will not include labels.
pub fn to_miette_report(err: &Error, source: &str, file: &str) -> miette::Report {
    let sanitized_source = sanitize_terminal_snippet_preserve_len(source.to_owned());
    let inner = err.without_snippet();
    let message = inner.to_string();

    let mut labels = Vec::new();
    if let Some(loc) = inner.location()
        && let Some(span) = to_source_span(&sanitized_source, &loc)
    {
        labels.push(LabeledSpan::new_with_span(Some(message.clone()), span));
    }
    let src = Arc::new(NamedSource::new(file, sanitized_source));

    miette::Report::new(ErrorDiagnostic {
        message,
        src,
        labels,
    })
}

#[derive(Clone, Debug)]
struct ErrorDiagnostic {
    message: String,
    src: Arc<NamedSource<String>>,
    labels: Vec<LabeledSpan>,
}

impl fmt::Display for ErrorDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorDiagnostic {}

impl Diagnostic for ErrorDiagnostic {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        if self.labels.is_empty() {
            None
        } else {
            Some(Box::new(self.labels.clone().into_iter()))
        }
    }
}

/// Span covering the character at `location`, or `None` if it is outside `source`.
fn to_source_span(source: &str, location: &Location) -> Option<SourceSpan> {
    if !location.is_known() {
        return None;
    }
    let offset = location.offset();
    if offset > source.len() || !source.is_char_boundary(offset) {
        return None;
    }
    let len = source[offset..]
        .chars()
        .next()
        .map(char::len_utf8)
        .unwrap_or(0);
    Some(SourceSpan::new(offset.into(), len))
}

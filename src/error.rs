//! Defines error and its location
use std::fmt;

use annotate_snippets::Level;

use crate::budget::BudgetBreach;
use crate::location::Location;
use crate::snippet;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The single configuration-error kind raised by [`crate::ConfigReader`].
///
/// Nothing is retried internally: every variant is surfaced synchronously to the caller.
#[derive(Debug)]
pub enum Error {
    /// Free-form error with optional source location.
    Message {
        msg: String,
        location: Location,
    },
    /// Malformed XML, or XML that does not follow the `metadata.xml` grammar.
    Xml {
        msg: String,
        location: Location,
    },
    /// A named resource could not be located by any loader.
    ResourceNotFound {
        name: String,
    },
    /// A tag, `config=` attribute or `<class>` value named a type that is not registered.
    UnknownClass {
        name: String,
        location: Location,
    },
    /// A second top-level declaration satisfied the request.
    Ambiguous {
        existing: String,
        candidate: String,
        location: Location,
    },
    /// No top-level declaration satisfied the request.
    NoMatch {
        target: String,
    },
    /// A declared class could not be instantiated.
    Construction {
        msg: String,
        location: Location,
    },
    /// No setter matched the property name, arity and argument types.
    NoSuchSetter {
        signature: String,
        location: Location,
    },
    /// A setter or constructor failed while running. The message is the underlying cause.
    Invocation {
        msg: String,
        location: Location,
    },
    /// A native scalar could not be converted from its recorded text.
    Native {
        msg: String,
        location: Location,
    },
    /// A parsing budget limit was exceeded.
    Budget {
        breach: BudgetBreach,
        location: Location,
    },
    /// Unexpected I/O error while draining an input stream or opening a resource.
    IOError {
        cause: std::io::Error,
    },
    /// Wrap an error with a rendered excerpt of the input, for rustc-like display.
    WithSnippet {
        /// Pre-rendered snippet output (cropped) for display.
        ///
        /// Note: this intentionally does NOT store the full input text, to avoid
        /// retaining large documents inside errors.
        text: String,
        crop_radius: usize,
        error: Box<Error>,
    },
}

impl Error {
    /// Construct a `Message` error with no known location.
    pub(crate) fn msg<S: Into<String>>(s: S) -> Self {
        Error::Message {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    pub(crate) fn xml<S: Into<String>>(s: S) -> Self {
        Error::Xml {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    pub(crate) fn unknown_class<S: Into<String>>(name: S) -> Self {
        Error::UnknownClass {
            name: name.into(),
            location: Location::UNKNOWN,
        }
    }

    pub(crate) fn construction<S: Into<String>>(s: S) -> Self {
        Error::Construction {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Construct an `Invocation` error carrying the underlying failure message.
    ///
    /// Called by:
    /// - Setter closures registered through [`crate::ClassBuilder::setter`].
    /// - Argument conversion in [`crate::Arg`] implementations.
    pub fn invocation<S: Into<String>>(s: S) -> Self {
        Error::Invocation {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Construct a `Native` conversion error. Public so custom [`crate::ReaderHooks`]
    /// can report failures the same way the builtin conversions do.
    pub fn native<S: Into<String>>(s: S) -> Self {
        Error::Native {
            msg: s.into(),
            location: Location::UNKNOWN,
        }
    }

    /// Wrap this error with a snippet of `text`, unless it is already wrapped.
    ///
    /// Errors without a known location are returned unchanged.
    pub(crate) fn with_snippet(self, text: &str, path: &str, crop_radius: usize) -> Self {
        // Avoid nesting snippet wrappers: keep the innermost error and rebuild the
        // wrapper with freshly rendered/cropped snippet output.
        let inner = match self {
            Error::WithSnippet { error, .. } => *error,
            other => other,
        };

        let Some(location) = inner.location() else {
            return inner;
        };

        let rendered = snippet::render(
            Level::ERROR,
            &inner.to_string(),
            &location,
            text,
            path,
            crop_radius,
        );

        Error::WithSnippet {
            text: rendered,
            crop_radius,
            error: Box::new(inner),
        }
    }

    /// Attach a concrete location to this error, unless it already has one.
    ///
    /// Arguments:
    /// - `set_location`: location to store in the error.
    ///
    /// Called by:
    /// - The element handler, once the element that caused the failure is known.
    pub(crate) fn with_location(mut self, set_location: Location) -> Self {
        match &mut self {
            Error::Message { location, .. }
            | Error::Xml { location, .. }
            | Error::UnknownClass { location, .. }
            | Error::Ambiguous { location, .. }
            | Error::Construction { location, .. }
            | Error::NoSuchSetter { location, .. }
            | Error::Invocation { location, .. }
            | Error::Native { location, .. }
            | Error::Budget { location, .. } => {
                if !location.is_known() {
                    *location = set_location;
                }
            }
            Error::ResourceNotFound { .. } | Error::NoMatch { .. } | Error::IOError { .. } => {}
            Error::WithSnippet { error, .. } => {
                let inner = std::mem::replace(error.as_mut(), Error::msg(""));
                **error = inner.with_location(set_location);
            }
        }
        self
    }

    /// If the error has a known location, return it.
    ///
    /// Used by:
    /// - Callers that want to surface precise positions to users.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Message { location, .. }
            | Error::Xml { location, .. }
            | Error::UnknownClass { location, .. }
            | Error::Ambiguous { location, .. }
            | Error::Construction { location, .. }
            | Error::NoSuchSetter { location, .. }
            | Error::Invocation { location, .. }
            | Error::Native { location, .. }
            | Error::Budget { location, .. } => {
                if location.is_known() {
                    Some(*location)
                } else {
                    None
                }
            }
            Error::ResourceNotFound { .. } | Error::NoMatch { .. } | Error::IOError { .. } => None,
            Error::WithSnippet { error, .. } => error.location(),
        }
    }

    /// The error without any snippet wrapper.
    pub fn without_snippet(&self) -> &Error {
        match self {
            Error::WithSnippet { error, .. } => error.without_snippet(),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::WithSnippet {
                text,
                crop_radius,
                error,
            } => {
                if *crop_radius == 0 {
                    // Treat as "snippet disabled".
                    return write!(f, "{}", error);
                }
                // `text` is already the pre-rendered snippet output.
                write!(f, "{text}")
            }
            Error::Message { msg, location } => fmt_with_location(f, msg, location),
            Error::Xml { msg, location } => fmt_with_location(f, msg, location),
            Error::ResourceNotFound { name } => write!(f, "Unable to locate {name}"),
            Error::UnknownClass { name, location } => {
                fmt_with_location(f, &format!("No such class {name}"), location)
            }
            Error::Ambiguous {
                existing,
                candidate,
                location,
            } => fmt_with_location(
                f,
                &format!("Already configured a {existing}, ambiguous match with {candidate}"),
                location,
            ),
            Error::NoMatch { target } => write!(f, "No match for {target} within config"),
            Error::Construction { msg, location } => fmt_with_location(f, msg, location),
            Error::NoSuchSetter {
                signature,
                location,
            } => fmt_with_location(f, &format!("No such setter {signature}"), location),
            Error::Invocation { msg, location } => fmt_with_location(f, msg, location),
            Error::Native { msg, location } => fmt_with_location(f, msg, location),
            Error::Budget { breach, location } => {
                fmt_with_location(f, &format!("XML budget breached: {breach:?}"), location)
            }
            Error::IOError { cause } => write!(f, "IO error: {}", cause),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IOError { cause } => Some(cause),
            Error::WithSnippet { error, .. } => error.source(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(cause: std::io::Error) -> Self {
        Error::IOError { cause }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::invocation(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::invocation(msg)
    }
}

/// Print a message optionally suffixed with "at line X, column Y".
fn fmt_with_location(f: &mut fmt::Formatter<'_>, msg: &str, location: &Location) -> fmt::Result {
    if location.is_known() {
        write!(
            f,
            "{msg} at line {}, column {}",
            location.line, location.column
        )
    } else {
        write!(f, "{msg}")
    }
}

/// Convert a budget breach report into a user-facing error.
///
/// Called by:
/// - The event source when enforcing budgets during parsing.
pub(crate) fn budget_error(breach: BudgetBreach) -> Error {
    Error::Budget {
        breach,
        location: Location::UNKNOWN,
    }
}

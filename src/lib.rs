//! Builds object graphs from declarative XML configuration documents.
//!
//! Types are registered up front in a [`Registry`]; a [`ConfigReader`] then streams a
//! document once, constructs the declared objects, calls their setters and returns
//! the single top-level declaration matching what was asked for.

pub use budget::{Budget, BudgetBreach, BudgetReport, check_xml_budget};
pub use cache::ImmutableThreadsafeCache;
pub use error::{Error, Result};
pub use hooks::{DefaultHooks, ReaderHooks, create_default_native};
pub use iface::{Inspector, WidgetBuilder};
pub use location::Location;
pub use options::Options;
pub use reader::ConfigReader;
pub use registry::{ClassBuilder, ClassDef, ClassKind, ClassRef, Registry};
pub use resource::{FileSystemLoader, MemoryLoader, ResourceLoader, ResourceResolver, ResourceStream, with_context_loader};
pub use bundle::ResourceBundle;
pub use setter::{Arg, ParamType, SetterFn, SetterOutput};
pub use value::{Object, Value};

pub mod budget;
mod bundle;
mod cache;
mod error;
mod events;
mod handler;
mod hooks;
mod iface;
mod input;
mod location;
mod macros;
#[cfg(feature = "miette")]
pub mod miette;
mod options;
mod reader;
mod registry;
mod resource;
mod setter;
mod snippet;
mod value;

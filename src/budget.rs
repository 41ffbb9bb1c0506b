//! Streaming XML budget checker built on quick-xml.
//!
//! This inspects the reader's event stream and enforces simple budgets to
//! avoid pathological inputs (element floods, absurd nesting, attribute storms,
//! and multi-megabyte text nodes).

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::location::Location;

/// Budgets for a streaming XML scan.
///
/// The defaults are intentionally permissive for typical `metadata.xml` files
/// while stopping obvious resource-amplifying inputs.
///
/// Example: configuring a reader with a tight element limit.
///
/// ```rust
/// use metawidget_config::{ConfigReader, Error, Registry};
///
/// let options = metawidget_config::options! {
///     budget: Some(metawidget_config::budget! {
///         max_elements: 1,
///     }),
/// };
/// let reader = ConfigReader::with_options(Registry::new(), options);
///
/// let xml = "<metawidget><a/><b/><c/></metawidget>";
/// let err = reader.configure_object_reader(xml.as_bytes()).unwrap_err();
/// assert!(matches!(err.without_snippet(), Error::Budget { .. }));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum number of elements (start tags, including expanded empty tags).
    ///
    /// Default: 250,000
    pub max_elements: usize,
    /// Maximum element nesting depth.
    ///
    /// Default: 2,000
    pub max_depth: usize,
    /// Maximum number of attributes on a single element (namespace declarations included).
    ///
    /// Default: 256
    pub max_attributes: usize,
    /// Maximum total bytes of character data (text, CDATA and entity references).
    ///
    /// Default: 67,108,864 (64 MiB)
    pub max_total_text_bytes: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_elements: 250_000,
            max_depth: 2_000,                       // protects the frame stack
            max_attributes: 256,
            max_total_text_bytes: 64 * 1024 * 1024, // 64 MiB of text
        }
    }
}

/// What tripped the budget (if anything).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BudgetBreach {
    /// The number of elements exceeded [`Budget::max_elements`].
    Elements {
        /// Total elements observed at the moment of the breach.
        elements: usize,
    },

    /// The nesting depth exceeded [`Budget::max_depth`].
    Depth {
        /// Depth reached when the breach occurred.
        depth: usize,
    },

    /// One element carried more than [`Budget::max_attributes`] attributes.
    Attributes {
        /// Attributes on the offending element.
        attributes: usize,
    },

    /// The cumulative size of character data exceeded [`Budget::max_total_text_bytes`].
    TextBytes {
        /// Sum of text lengths seen so far.
        total_text_bytes: usize,
    },

    /// A closing tag was encountered without a matching opening tag.
    Unbalanced,
}

/// Summary of the scan (even if no breach).
#[derive(Clone, Debug, Default)]
pub struct BudgetReport {
    /// `Some(..)` if a limit was exceeded; `None` if all budgets were respected.
    pub breached: Option<BudgetBreach>,

    /// Total number of elements observed.
    pub elements: usize,

    /// Maximum nesting depth reached at any point in the document.
    pub max_depth: usize,

    /// Largest attribute count seen on a single element.
    pub max_attributes: usize,

    /// Sum of bytes across all character data, saturating on overflow.
    pub total_text_bytes: usize,
}

/// Stateful helper that enforces a [`Budget`] while consuming a stream of [`Event`]s.
#[derive(Debug)]
pub struct BudgetEnforcer {
    budget: Budget,
    report: BudgetReport,
    depth: usize,
}

impl BudgetEnforcer {
    /// Create a new enforcer for the provided `budget`.
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            report: BudgetReport::default(),
            depth: 0,
        }
    }

    /// Observe a reader [`Event`], updating the internal counters.
    ///
    /// Returns `Err(BudgetBreach)` as soon as a limit is exceeded.
    pub fn observe(&mut self, ev: &Event<'_>) -> std::result::Result<(), BudgetBreach> {
        match ev {
            Event::Start(e) | Event::Empty(e) => {
                self.report.elements += 1;
                if self.report.elements > self.budget.max_elements {
                    return Err(BudgetBreach::Elements {
                        elements: self.report.elements,
                    });
                }

                let attributes = e.attributes().with_checks(false).count();
                self.report.max_attributes = self.report.max_attributes.max(attributes);
                if attributes > self.budget.max_attributes {
                    return Err(BudgetBreach::Attributes { attributes });
                }

                let depth = self.depth.saturating_add(1);
                self.report.max_depth = self.report.max_depth.max(depth);
                if depth > self.budget.max_depth {
                    return Err(BudgetBreach::Depth { depth });
                }
                if matches!(ev, Event::Start(_)) {
                    self.depth = depth;
                }
            }
            Event::End(_) => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or(BudgetBreach::Unbalanced)?;
            }
            Event::Text(t) => self.add_text(t.len())?,
            Event::CData(t) => self.add_text(t.len())?,
            Event::GeneralRef(r) => self.add_text(r.len())?,
            Event::Decl(_)
            | Event::Comment(_)
            | Event::PI(_)
            | Event::DocType(_)
            | Event::Eof => {}
        }
        Ok(())
    }

    fn add_text(&mut self, len: usize) -> std::result::Result<(), BudgetBreach> {
        self.report.total_text_bytes = self.report.total_text_bytes.saturating_add(len);
        if self.report.total_text_bytes > self.budget.max_total_text_bytes {
            return Err(BudgetBreach::TextBytes {
                total_text_bytes: self.report.total_text_bytes,
            });
        }
        Ok(())
    }

    /// Consume the enforcer and return the accumulated [`BudgetReport`].
    pub fn into_report(self) -> BudgetReport {
        self.report
    }
}

/// Check an input `&str` against the given `Budget`.
///
/// Parameters:
/// - `input`: XML text. Transcode non-UTF-8 documents before calling.
/// - `budget`: limits to enforce (see [`Budget`]).
///
/// Returns:
/// - `Ok(report)`: `report.breached.is_none()` means **within budget**.
///   If `report.breached.is_some()`, you should **reject** the input.
/// - `Err(Error::Xml)`: the document is not well-formed.
///
/// Note:
/// - This is **streaming** and does not allocate a DOM.
pub fn check_xml_budget(input: &str, budget: &Budget) -> Result<BudgetReport> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);
    let mut enforcer = BudgetEnforcer::new(budget.clone());

    loop {
        let ev = reader.read_event().map_err(|e| {
            Error::xml(e.to_string())
                .with_location(Location::from_offset(input, reader.error_position() as usize))
        })?;
        if let Err(breach) = enforcer.observe(&ev) {
            let mut report = enforcer.into_report();
            report.breached = Some(breach);
            return Ok(report);
        }
        if matches!(ev, Event::Eof) {
            break;
        }
    }

    Ok(enforcer.into_report())
}

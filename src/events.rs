//! Event pump turning quick-xml's namespace-resolved events into handler callbacks.
//!
//! Empty elements are expanded into start/end pairs, text is never trimmed, and
//! CDATA sections and entity references are folded into character data. Budget
//! limits from [`crate::Options`] are enforced event by event.

use std::borrow::Cow;

use quick_xml::NsReader;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use tracing::{trace, warn};

use crate::budget::BudgetEnforcer;
use crate::error::{Error, Result, budget_error};
use crate::location::Location;
use crate::options::Options;

/// One opening tag, as seen by a [`ContentHandler`].
#[derive(Debug)]
pub(crate) struct StartTag<'a> {
    /// Namespace URI bound to the tag's prefix (or the default namespace).
    pub namespace: Option<&'a str>,
    pub local_name: &'a str,
    /// Unprefixed, non-`xmlns` attributes with their values unescaped.
    pub attributes: &'a [(String, String)],
    /// Position of the opening `<`.
    pub location: Location,
}

impl StartTag<'_> {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Streaming callbacks, one per XML construct.
pub(crate) trait ContentHandler {
    fn start_element(&mut self, tag: &StartTag<'_>) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn end_element(&mut self, location: Location) -> Result<()>;
}

/// Incremental offset to line/column translation for monotonically advancing offsets.
struct Positions<'t> {
    text: &'t str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'t> Positions<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn locate(&mut self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        if offset < self.offset || !self.text.is_char_boundary(offset) {
            return Location::from_offset(self.text, offset);
        }
        for ch in self.text[self.offset..offset].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = offset;
        Location::new(self.line, self.column, offset)
    }
}

/// Stream `text` through `handler`.
///
/// Arguments:
/// - `text`: the whole decoded document.
/// - `options`: supplies the optional budget and budget report callback.
/// - `handler`: receives start/characters/end callbacks in document order.
///
/// Errors raised by the handler are positioned at the element being processed
/// unless they already carry a location.
pub(crate) fn drive<H: ContentHandler>(
    text: &str,
    options: &Options,
    handler: &mut H,
) -> Result<()> {
    let mut reader = NsReader::from_str(text);
    {
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.trim_text(false);
    }
    let mut enforcer = options.budget.clone().map(BudgetEnforcer::new);

    let result = pump(&mut reader, text, enforcer.as_mut(), handler);

    if let (Some(callback), Some(enforcer)) = (options.budget_report, enforcer) {
        let mut report = enforcer.into_report();
        if let Err(Error::Budget { breach, .. }) = &result {
            report.breached = Some(breach.clone());
        }
        callback(&report);
    }
    result
}

fn pump<H: ContentHandler>(
    reader: &mut NsReader<&[u8]>,
    text: &str,
    mut enforcer: Option<&mut BudgetEnforcer>,
    handler: &mut H,
) -> Result<()> {
    let mut positions = Positions::new(text);
    let mut attributes: Vec<(String, String)> = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        let (namespace, event) = match reader.read_resolved_event() {
            Ok((resolve, event)) => (resolve_namespace(resolve), event),
            Err(e) => {
                let at = reader.error_position() as usize;
                return Err(Error::xml(e.to_string()).with_location(positions.locate(at)));
            }
        };
        let location = positions.locate(start);

        if let Some(enforcer) = enforcer.as_deref_mut() {
            enforcer
                .observe(&event)
                .map_err(|breach| budget_error(breach).with_location(location))?;
        }

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                collect_attributes(reader, e, &mut attributes)
                    .map_err(|err| err.with_location(location))?;
                let local = std::str::from_utf8(e.local_name().into_inner())
                    .map_err(|err| Error::xml(err.to_string()).with_location(location))?;
                let tag = StartTag {
                    namespace: namespace.as_deref(),
                    local_name: local,
                    attributes: &attributes,
                    location,
                };
                handler
                    .start_element(&tag)
                    .map_err(|err| err.with_location(location))?;
                if matches!(event, Event::Empty(_)) {
                    handler
                        .end_element(location)
                        .map_err(|err| err.with_location(location))?;
                }
            }
            Event::End(_) => {
                handler
                    .end_element(location)
                    .map_err(|err| err.with_location(location))?;
            }
            Event::Text(e) => {
                let chunk = e
                    .decode()
                    .map_err(|err| Error::xml(err.to_string()).with_location(location))?;
                handler
                    .characters(&chunk)
                    .map_err(|err| err.with_location(location))?;
            }
            Event::CData(e) => {
                let chunk = std::str::from_utf8(e.as_ref())
                    .map_err(|err| Error::xml(err.to_string()).with_location(location))?;
                handler
                    .characters(chunk)
                    .map_err(|err| err.with_location(location))?;
            }
            Event::GeneralRef(e) => {
                let raw = e
                    .decode()
                    .map_err(|err| Error::xml(err.to_string()).with_location(location))?;
                let resolved = resolve_entity(&raw).map_err(|err| err.with_location(location))?;
                handler
                    .characters(&resolved)
                    .map_err(|err| err.with_location(location))?;
            }
            Event::DocType(_) => {
                warn!(
                    line = location.line(),
                    "DOCTYPE declaration ignored; entities it declares are not expanded"
                );
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Eof => {
                trace!(bytes = text.len(), "end of document");
                return Ok(());
            }
        }
    }
}

fn collect_attributes(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    out: &mut Vec<(String, String)>,
) -> Result<()> {
    out.clear();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::xml(err.to_string()))?;
        let key = attr.key;
        // Namespace declarations and prefixed attributes are not properties.
        if key.as_ref() == b"xmlns" || key.prefix().is_some() {
            continue;
        }
        let name = std::str::from_utf8(key.local_name().into_inner())
            .map_err(|err| Error::xml(err.to_string()))?
            .to_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| Error::xml(err.to_string()))?
            .into_owned();
        out.push((name, value));
    }
    Ok(())
}

fn resolve_namespace(resolve: ResolveResult<'_>) -> Option<String> {
    match resolve {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            warn!(
                prefix = %String::from_utf8_lossy(&prefix),
                "undeclared namespace prefix, treating element as unqualified"
            );
            None
        }
    }
}

/// Resolve a general entity reference (`lt`, `#10`, `#x9`, ...) to its text.
fn resolve_entity(raw: &str) -> Result<Cow<'static, str>> {
    if let Some(resolved) = resolve_xml_entity(raw) {
        return Ok(Cow::Borrowed(resolved));
    }

    if let Some(rest) = raw.strip_prefix('#') {
        let code = match rest.strip_prefix('x').or_else(|| rest.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => rest.parse::<u32>(),
        }
        .map_err(|_| Error::xml(format!("Invalid numeric character reference &{raw};")))?;
        let ch = char::from_u32(code)
            .ok_or_else(|| Error::xml(format!("Invalid Unicode code point {code}")))?;
        return Ok(Cow::Owned(ch.to_string()));
    }

    warn!(entity = raw, "unknown entity reference kept verbatim");
    Ok(Cow::Owned(format!("&{raw};")))
}

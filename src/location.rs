//! Source location utilities.

use serde::{Deserialize, Serialize};

/// Row/column location within the source XML document (1-indexed, character-based).
///
/// Every positioned [`crate::Error`] carries one of these. Elements are located at their
/// opening `<`; parser errors at the byte the underlying reader stopped on.
///
/// # Example
///
/// ```
/// use metawidget_config::{ConfigReader, Registry};
///
/// let reader = ConfigReader::new(Registry::new());
/// let xml = "<root xmlns=\"java:org.example\">\n  <missing/>\n</root>";
/// let err = reader.configure_object_reader(xml.as_bytes()).unwrap_err();
///
/// let loc = err.location().expect("unknown classes are positioned");
/// assert_eq!(loc.line(), 2);
/// assert_eq!(loc.column(), 3);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// 1-indexed row number in the input stream.
    pub(crate) line: u32,
    /// 1-indexed column number in the input stream.
    pub(crate) column: u32,
    /// Byte offset of the location within the decoded document.
    #[serde(default)]
    pub(crate) offset: usize,
}

impl Location {
    /// Sentinel value meaning "location unknown".
    ///
    /// Used when a precise position is not yet available at error creation time.
    pub const UNKNOWN: Self = Self {
        line: 0,
        column: 0,
        offset: 0,
    };

    /// Create a new location record.
    ///
    /// Arguments:
    /// - `line`: 1-indexed row.
    /// - `column`: 1-indexed column.
    /// - `offset`: byte offset in the decoded text.
    pub(crate) const fn new(line: usize, column: usize, offset: usize) -> Self {
        // 4 Gb is larger than any configuration file I can imagine, and also this is
        // error reporting only.
        Self {
            line: line as u32,
            column: column as u32,
            offset,
        }
    }

    /// Translate a byte offset within `text` to a line/column location.
    ///
    /// Columns count Unicode scalar values, not bytes. Offsets past the end of `text`
    /// clamp to the end; offsets inside a multi-byte character snap back to its start.
    pub(crate) fn from_offset(text: &str, offset: usize) -> Self {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self::new(line, column, offset)
    }

    /// 1-indexed line number.
    #[inline]
    pub fn line(&self) -> u64 {
        self.line as u64
    }

    /// 1-indexed column number.
    #[inline]
    pub fn column(&self) -> u64 {
        self.column as u64
    }

    /// Byte offset within the decoded document.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn is_known(&self) -> bool {
        self.line != 0 && self.column != 0
    }
}

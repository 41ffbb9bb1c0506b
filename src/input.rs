//! Draining byte streams into decoded document text.
//!
//! `encoding_rs_io` sniffs a byte-order mark and transcodes UTF-16 inputs to
//! UTF-8 on the fly; inputs without a BOM pass through and must already be UTF-8.

use encoding_rs_io::DecodeReaderBytesBuilder;
use std::io::{self, Read};

/// Read `reader` to the end and return its decoded text.
///
/// The reader is consumed and dropped before this returns, on success and on error alike.
///
/// Arguments:
/// - `reader`: raw document bytes.
/// - `max_bytes`: optional cap on the decoded size; exceeding it fails with
///   [`io::ErrorKind::FileTooLarge`].
///
/// Called by:
/// - [`crate::ConfigReader`] before any parsing starts.
pub(crate) fn read_to_string<R: Read>(reader: R, max_bytes: Option<usize>) -> io::Result<String> {
    // Auto-detect encoding (BOM or guess), decode to UTF-8 on the fly.
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(None) // None = sniff BOM; set Some(encoding) to force
        .build(reader);

    let mut bytes = Vec::new();
    let mut tmp = vec![0u8; 8 * 1024];
    loop {
        let n = match decoder.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if let Some(limit) = max_bytes
            && bytes.len().saturating_add(n) > limit
        {
            return Err(io::Error::new(
                io::ErrorKind::FileTooLarge,
                format!("input size limit of {limit} bytes exceeded"),
            ));
        }
        bytes.extend_from_slice(&tmp[..n]);
    }
    drop(decoder);

    let mut text =
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if text.starts_with('\u{FEFF}') {
        text.drain(..'\u{FEFF}'.len_utf8());
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn utf8_passes_through() {
        let text = read_to_string(Cursor::new("<a>ü</a>"), None).unwrap();
        assert_eq!(text, "<a>ü</a>");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<a/>");
        assert_eq!(read_to_string(Cursor::new(bytes), None).unwrap(), "<a/>");
    }

    #[test]
    fn utf16le_with_bom_is_transcoded() {
        let mut bytes = vec![0xFF, 0xFE];
        for cu in "<root>x</root>".encode_utf16() {
            bytes.extend_from_slice(&cu.to_le_bytes());
        }
        assert_eq!(
            read_to_string(Cursor::new(bytes), None).unwrap(),
            "<root>x</root>"
        );
    }

    #[test]
    fn size_cap_is_enforced() {
        let err = read_to_string(Cursor::new("x".repeat(100)), Some(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::FileTooLarge);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = read_to_string(Cursor::new(vec![b'<', 0xFF, b'>']), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

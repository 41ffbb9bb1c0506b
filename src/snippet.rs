//! Rustc-like source excerpts for positioned errors.
//!
//! Rendering is best-effort: whenever the location cannot be mapped back onto the
//! text, the plain message is returned instead.

use annotate_snippets::{
    AnnotationKind, Level, Renderer, Snippet as AnnotateSnippet, renderer::DecorStyle,
};

use crate::location::Location;

/// Number of context lines rendered above and below the error line.
const CONTEXT_LINES: usize = 2;

/// Render `msg` against a small window of `text` around `location`.
///
/// Arguments:
/// - `level`: severity shown in the title.
/// - `msg`: message used both as title and as the caret label.
/// - `location`: where to point. Its byte offset must refer to `text`.
/// - `text`: the full decoded document.
/// - `path`: display name for the snippet header (e.g. `"<input>"`, `"metawidget.xml"`).
/// - `crop_radius`: columns kept on each side of the error column; `0` disables rendering.
///
/// Called by:
/// - [`crate::Error::with_snippet`].
#[cold]
#[inline(never)]
pub(crate) fn render(
    level: Level<'_>,
    msg: &str,
    location: &Location,
    text: &str,
    path: &str,
    crop_radius: usize,
) -> String {
    if crop_radius == 0 || !location.is_known() || text.is_empty() {
        return msg.to_owned();
    }

    let starts = line_starts(text);
    let row = location.line as usize;
    if row == 0 || row > starts.len() {
        return msg.to_owned();
    }
    let col = location.column as usize;

    let window_start_row = row.saturating_sub(CONTEXT_LINES).max(1);
    let window_end_row = row.saturating_add(CONTEXT_LINES).min(starts.len());
    let window_start = starts[window_start_row - 1];
    let window_end = if window_end_row < starts.len() {
        starts[window_end_row]
    } else {
        text.len()
    };

    let mut window = String::with_capacity((window_end - window_start).min(4096));
    let mut span = 0..0;
    let left_col = col.saturating_sub(crop_radius).max(1);
    let right_col = col.saturating_add(crop_radius);

    for (idx, raw) in text[window_start..window_end].split_inclusive('\n').enumerate() {
        let line = raw.trim_end_matches('\n').trim_end_matches('\r');
        let (cropped, prefix_chars) = crop_line(line, left_col, right_col);
        if window_start_row + idx == row {
            // Caret position in characters within the cropped line.
            let caret_chars = col.saturating_sub(left_col.min(col)) + prefix_chars;
            let start = window.len() + char_to_byte(&cropped, caret_chars);
            let end = start + cropped[start - window.len()..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(0);
            span = start..end;
        }
        window.push_str(&cropped);
        if raw.ends_with('\n') {
            window.push('\n');
        }
    }

    let window = sanitize_terminal_snippet_preserve_len(window);

    let report = &[level
        .primary_title(format!("line {row} column {col}: {msg}"))
        .element(
            AnnotateSnippet::source(&window)
                .line_start(window_start_row)
                .path(path)
                .fold(false)
                .annotation(AnnotationKind::Primary.span(span).label(msg)),
        )];

    // Prefer rustc-like caret markers and avoid ANSI colors in `Display` output.
    // This keeps error strings stable (e.g. for tests) and avoids emitting escape
    // sequences when the output is not a TTY.
    let renderer = Renderer::plain().decor_style(DecorStyle::Ascii);
    renderer.render(report).to_string()
}

/// Crop one line to the 1-based, inclusive column window `[left, right]`.
///
/// Returns the rendered line and the number of marker characters prepended to it.
fn crop_line(line: &str, left: usize, right: usize) -> (String, usize) {
    let len = line.chars().count();
    if left >= len + 1 || (left <= 1 && right >= len) {
        // Keep short context lines intact.
        return (line.to_owned(), 0);
    }
    let mut out = String::new();
    let mut prefix = 0;
    if left > 1 {
        out.push('…');
        prefix = 1;
    }
    out.extend(line.chars().skip(left - 1).take(right + 1 - left));
    if right < len {
        out.push('…');
    }
    (out, prefix)
}

fn char_to_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Byte offsets of every line start in `source`.
fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in source.as_bytes().iter().enumerate() {
        if *b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Sanitize snippet text for terminal/log display *without changing the byte length*.
///
/// We:
/// - Replace ASCII control bytes (except '\n' and '\t') and DEL with space (0x20).
/// - Replace UTF-8 encoded C1 controls (0xC2 0x80..=0x9F) with NBSP (0xC2 0xA0).
pub(crate) fn sanitize_terminal_snippet_preserve_len(s: String) -> String {
    let mut bytes = s.into_bytes();

    for x in &mut bytes {
        let b = *x;
        if (b < 0x20 && b != b'\n' && b != b'\t') || b == 0x7F {
            *x = b' ';
        }
    }

    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] == 0xC2 && (0x80..=0x9F).contains(&bytes[i + 1]) {
            bytes[i + 1] = 0xA0;
            i += 2;
            continue;
        }
        i += 1;
    }

    // This should never fail because we preserved UTF-8 validity.
    match String::from_utf8(bytes) {
        Ok(out) => out,
        Err(e) => String::from_utf8_lossy(&e.into_bytes()).into_owned(),
    }
}

//! Properties-file resource bundles for `<bundle>` arguments.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::resource::ResourceResolver;

/// Key/value messages loaded from `<name with dots as slashes>.properties`.
#[derive(Clone)]
pub struct ResourceBundle {
    name: Arc<str>,
    entries: Arc<AHashMap<String, String>>,
}

impl ResourceBundle {
    /// Open `name` (e.g. `org.example.Messages`) through `resolver` and parse it.
    ///
    /// Called by:
    /// - The default `<bundle>` conversion in [`crate::ReaderHooks::create_native`].
    pub fn load(resolver: &dyn ResourceResolver, name: &str) -> Result<Self> {
        let path = format!("{}.properties", name.replace('.', "/"));
        let stream = resolver.open_resource(&path)?;
        let text = std::str::from_utf8(stream.bytes())
            .map_err(|e| Error::native(format!("Bundle {name} is not valid UTF-8: {e}")))?;
        Ok(Self::parse(name, text))
    }

    /// Parse properties-file text.
    ///
    /// Supports `#`/`!` comments, `=`, `:` or whitespace separators, backslash line
    /// continuations and the `\t \n \r \f \uXXXX` escapes. Later keys replace earlier ones.
    pub fn parse(name: &str, text: &str) -> Self {
        let mut entries = AHashMap::new();
        let mut lines = text.lines();
        while let Some(first) = lines.next() {
            let mut logical = first.trim_start().to_owned();
            if logical.is_empty() || logical.starts_with('#') || logical.starts_with('!') {
                continue;
            }
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }
            let (key, value) = split_entry(&logical);
            entries.insert(unescape(key), unescape(value));
        }
        Self {
            name: name.into(),
            entries: Arc::new(entries),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn ptr_eq(&self, other: &ResourceBundle) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for ResourceBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceBundle")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_separators_comments_and_escapes() {
        let bundle = ResourceBundle::parse(
            "org.example.Messages",
            indoc! {r"
                # comment
                ! also a comment
                greeting = Hello, World
                colon:value
                spaced   value here
                tab=a\tb
                unicode=caf\u00e9
                escaped\=key=v
                empty
            "},
        );
        assert_eq!(bundle.get("greeting"), Some("Hello, World"));
        assert_eq!(bundle.get("colon"), Some("value"));
        assert_eq!(bundle.get("spaced"), Some("value here"));
        assert_eq!(bundle.get("tab"), Some("a\tb"));
        assert_eq!(bundle.get("unicode"), Some("café"));
        assert_eq!(bundle.get("escaped=key"), Some("v"));
        assert_eq!(bundle.get("empty"), Some(""));
        assert_eq!(bundle.len(), 7);
        assert_eq!(bundle.name(), "org.example.Messages");
    }

    #[test]
    fn continuation_lines_are_joined() {
        let bundle = ResourceBundle::parse("b", "long = one \\\n    two\nnext=x\n");
        assert_eq!(bundle.get("long"), Some("one two"));
        assert_eq!(bundle.get("next"), Some("x"));
    }

    #[test]
    fn double_backslash_is_not_a_continuation() {
        let bundle = ResourceBundle::parse("b", "path=c:\\\\\nnext=x\n");
        assert_eq!(bundle.get("path"), Some("c:\\"));
        assert_eq!(bundle.get("next"), Some("x"));
    }

    #[test]
    fn later_keys_win() {
        let bundle = ResourceBundle::parse("b", "k=1\nk=2\n");
        assert_eq!(bundle.get("k"), Some("2"));
    }
}

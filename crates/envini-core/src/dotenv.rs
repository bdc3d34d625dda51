//! `.env` config-file codec.
//!
//! Parsing is deliberately forgiving: blank lines, `#` comments and lines
//! without `=` are skipped rather than rejected. Only non-UTF-8 or oversized
//! content is a [`ValidationError`].
//!
//! [`serialize`] produces the canonical form that is encrypted and stored.
//! Parsing the canonical form gives back exactly the entries it was built
//! from.

use std::borrow::Cow;

use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Maximum raw upload size (1 MiB).
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// An ordered set of `KEY=value` entries.
///
/// Keys keep the order in which they first appeared; inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvFile {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut file = Self::new();
        for (k, v) in iter {
            file.insert(k, v);
        }
        file
    }
}

/// Parse one line into `(key, value)`, or `None` if it carries no entry.
///
/// Inside a double-quoted value `\"` stands for `"`, which makes the
/// canonical form produced by [`serialize`] parse back to the same value.
/// Single-quoted and bare values are taken literally.
fn parse_line(line: &str) -> Option<(&str, Cow<'_, str>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        return Some((key, unescape_quotes(inner)));
    }
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);

    Some((key, Cow::Borrowed(value)))
}

fn unescape_quotes(inner: &str) -> Cow<'_, str> {
    if inner.contains("\\\"") {
        Cow::Owned(inner.replace("\\\"", "\""))
    } else {
        Cow::Borrowed(inner)
    }
}

/// Parse raw upload bytes.
///
/// # Errors
///
/// Returns [`ValidationError::TooLarge`] above [`MAX_UPLOAD_BYTES`] and
/// [`ValidationError::NotUtf8`] for non-UTF-8 content.
pub fn parse(raw: &[u8]) -> Result<EnvFile, ValidationError> {
    if raw.len() > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            limit: MAX_UPLOAD_BYTES,
            actual: raw.len(),
        });
    }

    let text = std::str::from_utf8(raw).map_err(|e| ValidationError::NotUtf8 {
        reason: e.to_string(),
    })?;

    Ok(text.split('\n').filter_map(parse_line).collect())
}

/// Canonical form: `KEY="value"` lines joined by `\n`, no trailing newline.
#[must_use]
pub fn serialize(file: &EnvFile) -> String {
    file.iter()
        .map(|(key, value)| format!("{key}=\"{}\"", value.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase hex SHA-256 of the raw upload bytes.
#[must_use]
pub fn checksum(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_file() {
        let file = parse(b"A=1\nB=\"two\"\n#comment\n").unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(file.get("A"), Some("1"));
        assert_eq!(file.get("B"), Some("two"));
    }

    #[test]
    fn skips_noise_lines() {
        let raw = b"\n   \n  # indented comment\nNO_EQUALS_HERE\n=orphan\n  KEY = spaced value  \n";
        let file = parse(raw).unwrap();
        assert_eq!(file.iter().collect::<Vec<_>>(), vec![("KEY", "spaced value")]);
    }

    #[test]
    fn splits_on_first_equals_only() {
        let file = parse(b"URL=postgres://u:p@h/db?sslmode=require").unwrap();
        assert_eq!(file.get("URL"), Some("postgres://u:p@h/db?sslmode=require"));
    }

    #[test]
    fn strips_exactly_one_matching_quote_pair() {
        let file = parse(b"A='single'\nB=\"\"double\"\"\nC=\"\nD='mixed\"\nE=\"\"").unwrap();
        assert_eq!(file.get("A"), Some("single"));
        assert_eq!(file.get("B"), Some("\"double\""));
        assert_eq!(file.get("C"), Some("\""));
        assert_eq!(file.get("D"), Some("'mixed\""));
        assert_eq!(file.get("E"), Some(""));
    }

    #[test]
    fn handles_crlf_line_endings() {
        let file = parse(b"A=1\r\nB='2'\r\n").unwrap();
        assert_eq!(file.get("A"), Some("1"));
        assert_eq!(file.get("B"), Some("2"));
    }

    #[test]
    fn later_duplicate_overwrites_in_place() {
        let file = parse(b"A=1\nB=2\nA=3").unwrap();
        assert_eq!(file.iter().collect::<Vec<_>>(), vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(matches!(
            parse(&[b'A', b'=', 0xFF, 0xFE]),
            Err(ValidationError::NotUtf8 { .. })
        ));
    }

    #[test]
    fn rejects_oversized_upload() {
        let raw = vec![b'#'; MAX_UPLOAD_BYTES + 1];
        assert!(matches!(
            parse(&raw),
            Err(ValidationError::TooLarge { .. })
        ));
        assert!(parse(&raw[..MAX_UPLOAD_BYTES]).unwrap().is_empty());
    }

    #[test]
    fn serialize_quotes_and_escapes() {
        let file: EnvFile = [("A", "1"), ("MSG", "say \"hi\"")].into_iter().collect();
        assert_eq!(serialize(&file), "A=\"1\"\nMSG=\"say \\\"hi\\\"\"");
        assert_eq!(serialize(&EnvFile::new()), "");
    }

    #[test]
    fn canonical_form_reparses_to_same_entries() {
        let raw: &[u8] = b"Z=last\nA='first'\n# note\nM = \"mid dle\"\nEMPTY=\n\
JSON={\"a\":1}\nMSG='say \"hi\"'\nESC=\"quote \\\" inside\"\nBS=ends\\\nBSQ=a\\\"b\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.get("JSON"), Some("{\"a\":1}"));
        assert_eq!(parsed.get("MSG"), Some("say \"hi\""));
        assert_eq!(parsed.get("ESC"), Some("quote \" inside"));
        assert_eq!(parsed.get("BS"), Some("ends\\"));
        assert_eq!(parsed.get("BSQ"), Some("a\\\"b"));

        let reparsed = parse(serialize(&parsed).as_bytes()).unwrap();
        assert_eq!(reparsed, parsed);
        let again = parse(serialize(&reparsed).as_bytes()).unwrap();
        assert_eq!(again, parsed);
    }

    #[test]
    fn escaped_quotes_are_literal_outside_double_quotes() {
        let file = parse(b"A='x\\\"y'\nB=x\\\"y").unwrap();
        assert_eq!(file.get("A"), Some("x\\\"y"));
        assert_eq!(file.get("B"), Some("x\\\"y"));
    }

    #[test]
    fn checksum_is_hex_sha256_of_raw_bytes() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(checksum(b"A=1").len(), 64);
        assert_ne!(checksum(b"A=1"), checksum(b"A=1\n"));
    }
}

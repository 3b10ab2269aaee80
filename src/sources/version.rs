//! Decoding of the `frida_version` field.
//!
//! The detail endpoint reports the runtime version either as a plain string
//! (`"16.0.0"`) or as a string holding a list literal
//! (`"['16.0.0', '15.2.0']"`). Newer payloads sometimes carry a real JSON
//! array instead. All three decode into [`RuntimeVersion`].

use std::fmt;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Runtime version as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeVersion {
    /// Ordered list of versions, most recent first.
    List { raw: String, versions: Vec<String> },
    /// Anything that is not a list literal, kept verbatim.
    Scalar(String),
}

/// Reasons a list literal was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("not a bracketed list")]
    NotAList,

    #[error("expected a quoted string at offset {0}")]
    ExpectedString(usize),

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("expected ',' or ']' at offset {0}")]
    ExpectedSeparator(usize),

    #[error("trailing characters after list at offset {0}")]
    TrailingInput(usize),
}

impl RuntimeVersion {
    /// Decode a raw field value. Never fails: anything that does not parse as
    /// a list of strings becomes [`RuntimeVersion::Scalar`].
    pub fn parse(raw: &str) -> Self {
        match parse_string_list(raw) {
            Ok(versions) => RuntimeVersion::List {
                raw: raw.to_string(),
                versions,
            },
            Err(e) => {
                tracing::trace!(raw = %raw, error = %e, "version is not a list literal");
                RuntimeVersion::Scalar(raw.to_string())
            }
        }
    }

    /// The value stored on a record: the first list element, or the raw text
    /// when there is no usable element.
    pub fn normalized(&self) -> &str {
        match self {
            RuntimeVersion::List { raw, versions } => {
                versions.first().map(String::as_str).unwrap_or(raw)
            }
            RuntimeVersion::Scalar(raw) => raw,
        }
    }
}

impl Default for RuntimeVersion {
    fn default() -> Self {
        RuntimeVersion::Scalar(String::new())
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.normalized())
    }
}

impl<'de> Deserialize<'de> for RuntimeVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Text(String),
            Array(Vec<String>),
            Null(()),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Text(raw) => RuntimeVersion::parse(&raw),
            Wire::Array(versions) => RuntimeVersion::List {
                raw: versions.join(", "),
                versions,
            },
            Wire::Null(()) => RuntimeVersion::default(),
        })
    }
}

/// Parse a bracketed list of single- or double-quoted strings.
///
/// Accepts whitespace around elements and a single trailing comma.
pub fn parse_string_list(input: &str) -> Result<Vec<String>, LiteralError> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = skip_ws(&chars, 0);

    if chars.get(pos) != Some(&'[') {
        return Err(LiteralError::NotAList);
    }
    pos += 1;

    let mut items = Vec::new();
    loop {
        pos = skip_ws(&chars, pos);
        match chars.get(pos) {
            Some(']') => {
                pos += 1;
                break;
            }
            Some(&quote) if quote == '\'' || quote == '"' => {
                let (item, next) = read_quoted(&chars, pos, quote)?;
                items.push(item);
                pos = skip_ws(&chars, next);
                match chars.get(pos) {
                    Some(',') => pos += 1,
                    Some(']') => {
                        pos += 1;
                        break;
                    }
                    _ => return Err(LiteralError::ExpectedSeparator(pos)),
                }
            }
            _ => return Err(LiteralError::ExpectedString(pos)),
        }
    }

    let end = skip_ws(&chars, pos);
    if end != chars.len() {
        return Err(LiteralError::TrailingInput(end));
    }
    Ok(items)
}

fn skip_ws(chars: &[char], mut pos: usize) -> usize {
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    pos
}

/// Read a quoted string starting at `start` (the opening quote). Returns the
/// unescaped contents and the offset just past the closing quote.
fn read_quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), LiteralError> {
    let mut out = String::new();
    let mut pos = start + 1;
    while let Some(&c) = chars.get(pos) {
        match c {
            '\\' => {
                let Some(&escaped) = chars.get(pos + 1) else {
                    return Err(LiteralError::UnterminatedString(start));
                };
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' | '\'' | '"' => out.push(escaped),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                pos += 2;
            }
            c if c == quote => return Ok((out, pos + 1)),
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }
    Err(LiteralError::UnterminatedString(start))
}

//! Typed keyword values and the quoting rules of the wire format

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed value of a keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Integer (decimal or `0x` hex on the wire)
    Int(i64),
    /// Floating point, including NaN
    Float(f64),
    /// Quoted string or bare word
    Str(String),
}

impl Scalar {
    /// Parse one value token as it appears on the wire
    pub fn parse(token: &str) -> Result<Self, String> {
        let token = token.trim();
        if let Some(quote) = token.chars().next().filter(|c| *c == '"' || *c == '\'') {
            return unquote(token, quote).map(Scalar::Str);
        }

        if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            if let Ok(value) = i64::from_str_radix(hex, 16) {
                return Ok(Scalar::Int(value));
            }
        }

        if let Ok(value) = token.parse::<i64>() {
            return Ok(Scalar::Int(value));
        }

        if let Ok(value) = token.parse::<f64>() {
            return Ok(Scalar::Float(value));
        }

        Ok(Scalar::Str(token.to_string()))
    }

    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(value) => Some(*value as f64),
            Scalar::Float(value) => Some(*value),
            Scalar::Str(_) => None,
        }
    }

    /// Integer view of the value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// String view of the value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Equality that treats NaN as equal to NaN
    pub fn same(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Float(a), Scalar::Float(b)) if a.is_nan() && b.is_nan() => true,
            _ => self == other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Float(value) if value.is_nan() => write!(f, "NaN"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Str(value) => write!(f, "{}", quote(value)),
        }
    }
}

/// Quote a string for the wire if it cannot travel as a bare word
pub fn quote(text: &str) -> String {
    let bare = !text.is_empty()
        && !text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ';' | '=' | '\\'));
    if bare {
        return text.to_string();
    }

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

fn unquote(token: &str, quote: char) -> Result<String, String> {
    if token.len() < 2 || !token.ends_with(quote) {
        return Err(format!("unterminated string {token}"));
    }

    let inner = &token[1..token.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else if ch == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

/// Split `text` on `sep`, ignoring separators inside quoted strings.
pub(crate) fn split_unquoted(text: &str, sep: char) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }

        if ch == '"' || ch == '\'' {
            quote = Some(ch);
        } else if ch == sep {
            parts.push(&text[start..idx]);
            start = idx + ch.len_utf8();
        }
    }

    if quote.is_some() {
        return Err("unterminated quoted string".to_string());
    }
    parts.push(&text[start..]);
    Ok(parts)
}

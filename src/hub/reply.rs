//! Reply lines received from the hub
//!
//! A reply line has the form
//! `<commander> <cmdId> <actor> <code> kw1=v1,v2; kw2; ...`.
//! Unsolicited broadcasts may also arrive in the short form `<actor> kw=...`,
//! which is treated as an informational reply with command id 0.

use super::error::ProtocolParseError;
use super::log::Severity;
use super::value::{Scalar, split_unquoted};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message code of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgCode {
    /// `>` command queued or started
    Queued,
    /// `i` information
    Info,
    /// `w` warning
    Warning,
    /// `d` debug
    Debug,
    /// `:` command finished successfully
    Done,
    /// `f` command failed
    Failed,
    /// `!` command failed fatally
    Fatal,
}

impl MsgCode {
    /// Decode a single-character code token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            ">" => Some(MsgCode::Queued),
            "i" => Some(MsgCode::Info),
            "w" => Some(MsgCode::Warning),
            "d" => Some(MsgCode::Debug),
            ":" => Some(MsgCode::Done),
            "f" => Some(MsgCode::Failed),
            "!" => Some(MsgCode::Fatal),
            _ => None,
        }
    }

    /// Wire character for this code
    pub fn as_char(self) -> char {
        match self {
            MsgCode::Queued => '>',
            MsgCode::Info => 'i',
            MsgCode::Warning => 'w',
            MsgCode::Debug => 'd',
            MsgCode::Done => ':',
            MsgCode::Failed => 'f',
            MsgCode::Fatal => '!',
        }
    }

    /// True if this code ends the command it belongs to
    pub fn is_terminal(self) -> bool {
        matches!(self, MsgCode::Done | MsgCode::Failed | MsgCode::Fatal)
    }

    /// True if this code ends the command unsuccessfully
    pub fn is_failure(self) -> bool {
        matches!(self, MsgCode::Failed | MsgCode::Fatal)
    }

    /// Severity used when the reply is shown in the log
    pub fn severity(self) -> Severity {
        match self {
            MsgCode::Failed | MsgCode::Fatal => Severity::Error,
            MsgCode::Warning => Severity::Warning,
            _ => Severity::Normal,
        }
    }
}

impl fmt::Display for MsgCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One `name=value,value` assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Keyword name
    pub name: String,
    /// Values in wire order (empty for valueless keywords)
    pub values: Vec<Scalar>,
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.values.is_empty() {
            let values: Vec<String> = self.values.iter().map(ToString::to_string).collect();
            write!(f, "={}", values.join(", "))?;
        }
        Ok(())
    }
}

/// A parsed reply line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Commander that issued the command (absent for short-form broadcasts)
    pub commander: Option<String>,
    /// Command identifier; 0 for unsolicited broadcasts
    pub cmd_id: u64,
    /// Actor that produced the reply
    pub actor: String,
    /// Message code
    pub code: MsgCode,
    /// Keywords in wire order
    pub keywords: Vec<Keyword>,
}

impl Reply {
    /// Parse one protocol line
    pub fn parse(line: &str) -> Result<Self, ProtocolParseError> {
        let err = |detail: &str| ProtocolParseError::new(line, detail);

        let (first, rest) = next_token(line).ok_or_else(|| err("empty line"))?;

        if let Some(reply) = parse_header(first, rest) {
            let (commander, cmd_id, actor, code, body) = reply;
            let keywords = parse_keywords(body).map_err(|detail| err(&detail))?;
            return Ok(Reply {
                commander: Some(commander.to_string()),
                cmd_id,
                actor: actor.to_string(),
                code,
                keywords,
            });
        }

        if first.contains('=') || first.contains(';') {
            return Err(err("missing actor name"));
        }

        let keywords = parse_keywords(rest).map_err(|detail| err(&detail))?;
        Ok(Reply {
            commander: None,
            cmd_id: 0,
            actor: first.to_string(),
            code: MsgCode::Info,
            keywords,
        })
    }

    /// Look up a keyword by name
    pub fn keyword(&self, name: &str) -> Option<&Keyword> {
        self.keywords.iter().find(|kw| kw.name == name)
    }

    /// Human-readable text for the failure or message this reply carries
    pub fn text(&self) -> String {
        for name in ["text", "Text", "why"] {
            if let Some(value) = self.keyword(name).and_then(|kw| kw.values.first()) {
                return match value {
                    Scalar::Str(text) => text.clone(),
                    other => other.to_string(),
                };
            }
        }
        self.keyword_text()
    }

    /// Keywords formatted back into wire form
    pub fn keyword_text(&self) -> String {
        let parts: Vec<String> = self.keywords.iter().map(ToString::to_string).collect();
        parts.join("; ")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let commander = self.commander.as_deref().unwrap_or(".");
        write!(
            f,
            "{} {} {} {} {}",
            commander,
            self.cmd_id,
            self.actor,
            self.code,
            self.keyword_text()
        )
    }
}

type Header<'a> = (&'a str, u64, &'a str, MsgCode, &'a str);

fn parse_header<'a>(commander: &'a str, rest: &'a str) -> Option<Header<'a>> {
    let (cmd_id, rest) = next_token(rest)?;
    let cmd_id = cmd_id.parse::<u64>().ok()?;
    let (actor, rest) = next_token(rest)?;
    let (code, rest) = next_token(rest)?;
    let code = MsgCode::from_token(code)?;
    Some((commander, cmd_id, actor, code, rest))
}

fn next_token(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.find(char::is_whitespace) {
        Some(end) => Some((&text[..end], &text[end..])),
        None => Some((text, "")),
    }
}

fn parse_keywords(body: &str) -> Result<Vec<Keyword>, String> {
    let mut keywords = Vec::new();
    for assignment in split_unquoted(body, ';')? {
        let assignment = assignment.trim();
        if assignment.is_empty() {
            continue;
        }

        let (name, values) = match split_assignment(assignment) {
            Some((name, values)) => (name.trim(), Some(values)),
            None => (assignment, None),
        };

        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(format!("invalid keyword name {name:?}"));
        }

        let values = match values {
            Some(values) if !values.trim().is_empty() => split_unquoted(values, ',')?
                .into_iter()
                .map(Scalar::parse)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        keywords.push(Keyword {
            name: name.to_string(),
            values,
        });
    }
    Ok(keywords)
}

fn split_assignment(assignment: &str) -> Option<(&str, &str)> {
    let eq = assignment.find('=')?;
    let quote = assignment.find(['"', '\'']);
    if quote.is_some_and(|q| q < eq) {
        return None;
    }
    Some((&assignment[..eq], &assignment[eq + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reply() {
        let reply = Reply::parse("alice.bob 12 tcc : AxePos=-340.009, 45, NaN; SlewEnd").unwrap();
        assert_eq!(reply.commander.as_deref(), Some("alice.bob"));
        assert_eq!(reply.cmd_id, 12);
        assert_eq!(reply.actor, "tcc");
        assert_eq!(reply.code, MsgCode::Done);
        assert_eq!(reply.keywords.len(), 2);
        assert_eq!(reply.keywords[0].values.len(), 3);
        assert!(reply.keywords[1].values.is_empty());
    }

    #[test]
    fn test_parse_short_form() {
        let reply = Reply::parse("tcc AxePos=-340.009, 45, NaN").unwrap();
        assert_eq!(reply.commander, None);
        assert_eq!(reply.cmd_id, 0);
        assert_eq!(reply.actor, "tcc");
        assert_eq!(reply.code, MsgCode::Info);
        assert_eq!(reply.keywords[0].name, "AxePos");
    }

    #[test]
    fn test_parse_header_without_keywords() {
        let reply = Reply::parse(".hub 7 apogeecal f").unwrap();
        assert_eq!(reply.code, MsgCode::Failed);
        assert!(reply.keywords.is_empty());
    }

    #[test]
    fn test_spaced_assignment() {
        let reply = Reply::parse("tcc AxisCmdState = Slewing, Slewing, Halting").unwrap();
        assert_eq!(reply.keywords[0].name, "AxisCmdState");
        assert_eq!(reply.keywords[0].values[2], Scalar::Str("Halting".into()));
    }

    #[test]
    fn test_reply_text_prefers_text_keyword() {
        let reply = Reply::parse(".hub 3 apogee f text=\"shutter jammed\"").unwrap();
        assert_eq!(reply.text(), "shutter jammed");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Reply::parse("").is_err());
        assert!(Reply::parse("   ").is_err());
        assert!(Reply::parse("AxePos=1,2").is_err());
        assert!(Reply::parse("tcc Obj Name=1").is_err());
        assert!(Reply::parse("tcc ObjName='unterminated").is_err());
    }
}

//! The command language of `Function` event actions.
//!
//! A script is a list of statements separated by `;` or newlines. `#`
//! starts a comment. A statement may begin with `@target` to act on the
//! pens whose id or tag is `target` instead of the pen owning the event.
//!
//! ```text
//! set text $value.temp; set font.color "#ff0000"
//! @pumps animate start
//! emit alarm {"level": $value}
//! publish plant/ack $params
//! ```
//!
//! Before a statement's arguments are parsed, `$value` (or `$value.path`)
//! and `$params` (or `$params.path`) are replaced by the JSON text of the
//! message payload and the event parameters.

use serde_json::Value;

use crate::error::{Error, Result};

use super::props::lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimateOp {
    Start,
    Pause,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Assign a property path. The value is JSON, or a plain string when
    /// it does not parse.
    Set { path: String, value: String },
    Show,
    Hide,
    Animate { op: AnimateOp, tag: Option<String> },
    Emit { name: String, payload: Option<String> },
    /// Send text on the diagram's WebSocket.
    Send { payload: String },
    /// Publish on the diagram's MQTT connection.
    Publish { topic: String, payload: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: Option<String>,
    pub command: Command,
}

/// A parsed script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self> {
        let statements = split_statements(source)
            .into_iter()
            .map(|text| parse_statement(&text))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { statements })
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Parse a `set` value or `emit` payload: JSON when possible, else text.
pub fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Split on `;` and newlines outside of quotes and brackets, dropping
/// comments and blank statements.
fn split_statements(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut escaped = false;
    let mut comment = false;

    for c in source.chars() {
        if comment {
            if c == '\n' {
                comment = false;
                push_statement(&mut out, &mut current);
            }
            continue;
        }
        if quoted {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                quoted = false;
            }
            continue;
        }
        match c {
            '"' => {
                quoted = true;
                current.push(c);
            }
            '{' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' => {
                depth -= 1;
                current.push(c);
            }
            '#' if depth <= 0 && current.trim().is_empty() => comment = true,
            ';' | '\n' if depth <= 0 => push_statement(&mut out, &mut current),
            _ => current.push(c),
        }
    }
    push_statement(&mut out, &mut current);
    out
}

fn push_statement(out: &mut Vec<String>, current: &mut String) {
    let text = current.trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
    current.clear();
}

/// Next whitespace-separated word and the trimmed remainder.
fn word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    }
}

fn parse_statement(text: &str) -> Result<Statement> {
    let (mut head, mut rest) = word(text);
    let mut target = None;
    if let Some(t) = head.strip_prefix('@') {
        if t.is_empty() {
            return Err(Error::Script(format!("Empty target in {:?}", text)));
        }
        target = Some(t.to_string());
        (head, rest) = word(rest);
    }

    let command = match head {
        "set" => {
            let (path, value) = word(rest);
            if path.is_empty() || value.is_empty() {
                return Err(Error::Script(format!("Usage: set <path> <value>, got {:?}", text)));
            }
            Command::Set {
                path: path.to_string(),
                value: value.to_string(),
            }
        }
        "show" => Command::Show,
        "hide" => Command::Hide,
        "animate" => {
            let (op, tag) = word(rest);
            let op = match op {
                "start" => AnimateOp::Start,
                "pause" => AnimateOp::Pause,
                "stop" => AnimateOp::Stop,
                other => return Err(Error::Script(format!("Unknown animate operation {:?}", other))),
            };
            Command::Animate {
                op,
                tag: (!tag.is_empty()).then(|| tag.to_string()),
            }
        }
        "emit" => {
            let (name, payload) = word(rest);
            if name.is_empty() {
                return Err(Error::Script("Usage: emit <name> [payload]".to_string()));
            }
            Command::Emit {
                name: name.to_string(),
                payload: (!payload.is_empty()).then(|| payload.to_string()),
            }
        }
        "send" => Command::Send {
            payload: rest.to_string(),
        },
        "publish" => {
            let (topic, payload) = word(rest);
            if topic.is_empty() {
                return Err(Error::Script("Usage: publish <topic> <payload>".to_string()));
            }
            Command::Publish {
                topic: topic.to_string(),
                payload: payload.to_string(),
            }
        }
        other => return Err(Error::Script(format!("Unknown command {:?}", other))),
    };
    Ok(Statement { target, command })
}

/// Replace `$value[.path]` and `$params[.path]` with JSON text. Missing
/// paths become `null`.
pub fn substitute(text: &str, value: &Value, params: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(i) = rest.find('$') {
        out.push_str(&rest[..i]);
        let tail = &rest[i + 1..];
        let (root, after) = if let Some(after) = tail.strip_prefix("value") {
            (Some(value), after)
        } else if let Some(after) = tail.strip_prefix("params") {
            (Some(params), after)
        } else {
            (None, tail)
        };
        let Some(root) = root else {
            out.push('$');
            rest = tail;
            continue;
        };
        let (path, after) = match after.strip_prefix('.') {
            Some(p) => {
                let end = p.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')).unwrap_or(p.len());
                let path = p[..end].trim_end_matches('.');
                (path, &p[path.len()..])
            }
            None => ("", after),
        };
        let found = if path.is_empty() { Some(root) } else { lookup(root, path) };
        out.push_str(&found.map_or_else(|| "null".to_string(), Value::to_string));
        rest = after;
    }
    out.push_str(rest);
    out
}

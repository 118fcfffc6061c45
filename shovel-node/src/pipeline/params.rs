//! Parameter handling for task execution
//!
//! Two concerns live here:
//! - resolving back-references (`outputs[0]["x"]`) against the outputs of
//!   tasks that already ran in the same execution
//! - flattening a keyword map into command line tokens for script and shell
//!   tasks

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use shovel_core::domain::task::TaskParams;

const ROOT: &str = "outputs";

/// One step of a back-reference path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Positional index; negative values count from the end
    Index(i64),
    /// Key into an object output
    Key(String),
}

/// A parsed `outputs[...]` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackReference {
    pub segments: Vec<PathSegment>,
}

impl BackReference {
    /// Parses a parameter value
    ///
    /// Returns `Ok(None)` when the text is not a back-reference at all, and an
    /// error when it starts like one but is malformed.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        let Some(mut rest) = text.strip_prefix(ROOT) else {
            return Ok(None);
        };
        if !rest.starts_with('[') {
            return Ok(None);
        }

        let mut segments = Vec::new();
        while !rest.is_empty() {
            let Some(body) = rest.strip_prefix('[') else {
                bail!("malformed reference '{}': expected '[' at '{}'", text, rest);
            };
            let (segment, tail) = parse_segment(body)
                .ok_or_else(|| anyhow!("malformed reference '{}'", text))?;
            segments.push(segment);
            rest = tail;
        }

        Ok(Some(Self { segments }))
    }

    /// Looks the path up in `outputs`
    pub fn resolve(&self, outputs: &[Value]) -> Result<Value> {
        let mut segments = self.segments.iter();
        let first = segments
            .next()
            .ok_or_else(|| anyhow!("empty reference"))?;

        let mut current = match first {
            PathSegment::Index(i) => index_slice(outputs, *i)
                .ok_or_else(|| anyhow!("no output at index {} (only {} so far)", i, outputs.len()))?,
            PathSegment::Key(key) => bail!("outputs must be indexed by position, not '{}'", key),
        };

        for segment in segments {
            current = match (segment, current) {
                (PathSegment::Index(i), Value::Array(items)) => index_slice(items, *i)
                    .ok_or_else(|| anyhow!("index {} out of range", i))?,
                (PathSegment::Key(key), Value::Object(map)) => map
                    .get(key)
                    .ok_or_else(|| anyhow!("key '{}' not found", key))?,
                (PathSegment::Index(i), other) => {
                    bail!("cannot index {} with position {}", kind_of(other), i)
                }
                (PathSegment::Key(key), other) => {
                    bail!("cannot index {} with key '{}'", kind_of(other), key)
                }
            };
        }

        Ok(current.clone())
    }
}

/// Splits `<token>]...` into a segment and the remaining text
fn parse_segment(body: &str) -> Option<(PathSegment, &str)> {
    let body = body.trim_start();
    if let Some(quote) = body.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let inner = &body[1..];
        let end = inner.find(quote)?;
        let key = inner[..end].to_string();
        let tail = inner[end + 1..].trim_start().strip_prefix(']')?;
        return Some((PathSegment::Key(key), tail));
    }

    let end = body.find(']')?;
    let token = body[..end].trim();
    if token.is_empty() {
        return None;
    }
    let segment = match token.parse::<i64>() {
        Ok(i) => PathSegment::Index(i),
        Err(_) => PathSegment::Key(token.to_string()),
    };
    Some((segment, &body[end + 1..]))
}

fn index_slice(items: &[Value], index: i64) -> Option<&Value> {
    let len = items.len() as i64;
    let position = if index < 0 { len + index } else { index };
    if position < 0 {
        return None;
    }
    items.get(position as usize)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Replaces every top-level back-reference in `params` with the value it
/// points at
pub(crate) fn resolve_params(params: TaskParams, outputs: &[Value]) -> Result<TaskParams> {
    params
        .into_iter()
        .map(|(key, value)| -> Result<(String, Value)> {
            let reference = match &value {
                Value::String(text) => BackReference::parse(text)
                    .map_err(|e| anyhow!("parameter '{}': {}", key, e))?,
                _ => None,
            };
            let resolved = match reference {
                Some(reference) => reference
                    .resolve(outputs)
                    .map_err(|e| anyhow!("parameter '{}': {}", key, e))?,
                None => value,
            };
            Ok((key, resolved))
        })
        .collect()
}

/// Flattens keyword params into command line tokens, in the order given
///
/// Each pair becomes `key value`; a value that already contains `=` is
/// passed as a single `key=value` token, and an empty value as bare `key`.
pub fn flatten_params(params: &TaskParams) -> Vec<String> {
    let mut tokens = Vec::with_capacity(params.len() * 2);
    for (key, value) in params {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if value.is_empty() {
            tokens.push(key.clone());
        } else if value.contains('=') {
            tokens.push(format!("{}={}", key, value));
        } else {
            tokens.push(key.clone());
            tokens.push(value);
        }
    }
    tokens
}

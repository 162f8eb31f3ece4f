//! JSON-RPC envelope codec
//!
//! Requests are read with a lenient field scanner instead of a schema-bound
//! deserializer: only `method`, `id` and `params` are located, and `params`
//! is kept as the raw JSON text so arbitrary nested structures pass through
//! unvalidated. Responses are assembled as text around serialized results.

use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestId {
    String(String),
    /// Numeric ids are echoed back exactly as the caller wrote them. Tokens
    /// that are not valid JSON numbers read as an absent id.
    Number(String),
}

impl RequestId {
    fn from_raw(raw: &str) -> Option<Self> {
        match raw.as_bytes().first()? {
            b'"' => string_value(raw).map(Self::String),
            b'-' | b'0'..=b'9' => serde_json::from_str::<serde_json::Number>(raw)
                .ok()
                .map(|_| Self::Number(raw.to_string())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        match self {
            Self::String(value) => quote(value),
            Self::Number(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcRequest {
    pub method: Option<String>,
    pub id: Option<RequestId>,
    /// Raw JSON text of `params`, if present and not `null`.
    pub params: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unbalanced brackets at byte {0}")]
    Unbalanced(usize),
    #[error("unterminated string literal")]
    UnterminatedString,
}

/// Decodes a request envelope. Missing fields come back as `None`; only
/// structurally broken text (unbalanced brackets, open strings) fails.
pub fn decode(text: &str) -> Result<RpcRequest, CodecError> {
    check_balanced(text)?;

    Ok(RpcRequest {
        method: find_field(text, "method").and_then(scalar_value),
        id: find_field(text, "id").and_then(RequestId::from_raw),
        params: find_field(text, "params")
            .filter(|raw| *raw != "null")
            .map(str::to_string),
    })
}

/// Extracts just the request id, without validating the rest of the body.
pub fn peek_id(text: &str) -> Option<RequestId> {
    find_field(text, "id").and_then(RequestId::from_raw)
}

pub fn encode_success(id: Option<&RequestId>, result: &Value) -> String {
    format!(
        r#"{{"jsonrpc":"{JSONRPC_VERSION}","id":{},"result":{result}}}"#,
        id_json(id)
    )
}

pub fn encode_error(id: Option<&RequestId>, code: i32, message: &str) -> String {
    format!(
        r#"{{"jsonrpc":"{JSONRPC_VERSION}","id":{},"error":{{"code":{code},"message":{}}}}}"#,
        id_json(id),
        quote(message)
    )
}

pub fn encode_notification(method: &str, params: &Value) -> String {
    format!(
        r#"{{"jsonrpc":"{JSONRPC_VERSION}","method":{},"params":{params}}}"#,
        quote(method)
    )
}

fn id_json(id: Option<&RequestId>) -> String {
    id.map_or_else(|| "null".to_string(), RequestId::to_json)
}

/// Returns the raw JSON token stored under `key` in the top-level object.
///
/// Keys of nested objects are never matched. Empty tokens count as absent.
pub fn find_field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let bytes = text.as_bytes();
    let mut pos = skip_whitespace(bytes, 0);
    if bytes.get(pos) != Some(&b'{') {
        return None;
    }
    pos += 1;

    loop {
        while matches!(bytes.get(pos), Some(b',' | b' ' | b'\t' | b'\n' | b'\r')) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'"') {
            return None;
        }

        let key_end = string_end(bytes, pos)?;
        let key_raw = &text[pos..key_end];
        pos = skip_whitespace(bytes, key_end);
        if bytes.get(pos) != Some(&b':') {
            return None;
        }

        let value_start = skip_whitespace(bytes, pos + 1);
        let value_end = value_end(bytes, value_start)?;
        if string_value(key_raw).as_deref() == Some(key) {
            let raw = text[value_start..value_end].trim_end();
            return (!raw.is_empty()).then_some(raw);
        }
        pos = value_end;
    }
}

/// Decodes a quoted JSON string token.
pub fn string_value(raw: &str) -> Option<String> {
    if raw.starts_with('"') {
        serde_json::from_str::<String>(raw).ok()
    } else {
        None
    }
}

/// Decodes a string token, or returns a bare primitive as written.
fn scalar_value(raw: &str) -> Option<String> {
    match raw.as_bytes().first()? {
        b'"' => string_value(raw),
        b'{' | b'[' => None,
        _ if raw == "null" => None,
        _ => Some(raw.to_string()),
    }
}

fn check_balanced(text: &str) -> Result<(), CodecError> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(byte),
            b'}' if stack.pop() != Some(b'{') => return Err(CodecError::Unbalanced(index)),
            b']' if stack.pop() != Some(b'[') => return Err(CodecError::Unbalanced(index)),
            _ => {}
        }
    }

    if in_string {
        Err(CodecError::UnterminatedString)
    } else if !stack.is_empty() {
        Err(CodecError::Unbalanced(text.len()))
    } else {
        Ok(())
    }
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while matches!(bytes.get(pos), Some(b' ' | b'\t' | b'\n' | b'\r')) {
        pos += 1;
    }
    pos
}

/// Index just past the closing quote of the string starting at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start + 1;
    loop {
        match bytes.get(pos)? {
            b'\\' => pos += 2,
            b'"' => return Some(pos + 1),
            _ => pos += 1,
        }
    }
}

/// Index just past the bracket closing the object or array at `start`.
fn span_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = start;
    loop {
        match bytes.get(pos)? {
            b'"' => {
                pos = string_end(bytes, pos)?;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
            _ => {}
        }
        pos += 1;
    }
}

fn value_end(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes.get(start) {
        Some(b'"') => string_end(bytes, start),
        Some(b'{' | b'[') => span_end(bytes, start),
        _ => {
            let mut pos = start;
            while !matches!(bytes.get(pos), None | Some(b',' | b'}' | b']')) {
                pos += 1;
            }
            Some(pos)
        }
    }
}

/// Quotes and escapes `value` as a JSON string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for character in value.chars() {
        match character {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

//! Flat `?a.b=<base64url>&…` encoding used in deep links and mailbox files.
//!
//! A value is first serialized to JSON, where every byte field is already a
//! base64url string. Nested objects are flattened into dotted keys. Since
//! both keys and values stay inside the URL-safe alphabet, no percent
//! encoding is needed and the text survives copy and paste verbatim.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("value cannot be flattened: {0}")]
    Unsupported(String),

    #[error("malformed query pair: {0}")]
    MalformedPair(String),

    #[error("conflicting query key: {0}")]
    Conflict(String),

    #[error("invalid payload: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Serialize `value` into a query string, including the leading `?`.
pub fn to_b64url_query<T: Serialize>(value: &T) -> Result<String, QueryError> {
    let json = serde_json::to_value(value)?;
    let mut pairs = Vec::new();
    flatten("", &json, &mut pairs)?;
    let body = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    Ok(format!("?{body}"))
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) -> Result<(), QueryError> {
    match value {
        Value::Null => Ok(()),
        Value::String(s) if !prefix.is_empty() => {
            out.push((prefix.to_string(), s.clone()));
            Ok(())
        }
        Value::Object(map) => {
            for (key, child) in map {
                if key.contains(['.', '&', '=']) {
                    return Err(QueryError::Unsupported(format!("key `{key}`")));
                }
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out)?;
            }
            Ok(())
        }
        other => Err(QueryError::Unsupported(format!("{prefix}: {other}"))),
    }
}

/// Parse a query string (leading `?` optional) back into `T`.
pub fn from_b64url_query<T: DeserializeOwned>(query: &str) -> Result<T, QueryError> {
    let query = query.trim().trim_start_matches('?');
    let mut root = Map::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (path, value) = pair
            .split_once('=')
            .ok_or_else(|| QueryError::MalformedPair(pair.to_string()))?;
        insert(&mut root, path, value)?;
    }
    Ok(serde_json::from_value(Value::Object(root))?)
}

fn insert(root: &mut Map<String, Value>, path: &str, value: &str) -> Result<(), QueryError> {
    let mut node = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segment.is_empty() {
            return Err(QueryError::MalformedPair(path.to_string()));
        }
        if segments.peek().is_none() {
            if node.insert(segment.to_string(), Value::String(value.to_string())).is_some() {
                return Err(QueryError::Conflict(path.to_string()));
            }
            return Ok(());
        }
        let child = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = child
            .as_object_mut()
            .ok_or_else(|| QueryError::Conflict(path.to_string()))?;
    }
    Ok(())
}

/// Pull the query out of whatever text a mailbox item holds.
///
/// Accepts a bare query (with or without `?`), a full link, or a markdown
/// link such as `# [Log in](https://host/login?…)`. Whitespace and line
/// breaks inside the text are dropped first, since wiki editors wrap long
/// lines.
pub fn extract_query(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let query = match compact.find('?') {
        Some(start) => &compact[start..],
        None => compact.as_str(),
    };
    query.trim_end_matches(')').to_string()
}

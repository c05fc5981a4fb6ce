//! Purpose: Shared JSON shapes for errors and bridge stats.
//! Exports: `error_json`, `error_message`, `stats_json`.
//! Role: Keep CLI stderr envelopes and script per-op failures aligned.
//! Invariants: Error envelopes are `{"error": {...}}`; fields are additive-only.
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

use crate::api::{BridgeStats, Error, ErrorKind};

pub fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::InvalidHandle => "invalid handle".to_string(),
        ErrorKind::OutOfBounds => "out of bounds".to_string(),
        ErrorKind::OutOfMemory => "out of memory".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

pub fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

pub fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(handle) = err.handle() {
        inner.insert("handle".to_string(), json!(handle));
    }
    if let Some(ptr) = err.ptr() {
        inner.insert("ptr".to_string(), json!(ptr));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

pub fn stats_json(stats: &BridgeStats) -> Value {
    serde_json::to_value(stats).unwrap_or_else(|_| json!({}))
}

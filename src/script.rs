//! Purpose: Replay sequences of bridge operations described as JSON.
//! Exports: `ScriptOp`, `ScriptSummary`, `parse_script`, `apply_op`, `run_script`.
//! Role: Drives `heapbridge run`; lets a host exercise the boundary without a sandbox.
//! Invariants: Handles appear as raw `u64` bits (generation high, index low).
//! Invariants: One result object per op, emitted in script order.
#![allow(clippy::result_large_err)]

use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{Bridge, Error, ErrorKind, Handle, HostValue, LinearMemory, Utf16Text};
use crate::hex::to_hex;
use crate::report_json::error_json;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Store { value: Value },
    Load { handle: u64 },
    Release { handle: u64 },
    Push { list: u64, elem: u64 },
    Encode { text: String },
    Export { handle: u64 },
    Decode { ptr: u32, count: u32 },
    Import { ptr: u32, count: u32 },
    Free { ptr: u32 },
    Read { ptr: u32, len: u32 },
}

impl ScriptOp {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptOp::Store { .. } => "store",
            ScriptOp::Load { .. } => "load",
            ScriptOp::Release { .. } => "release",
            ScriptOp::Push { .. } => "push",
            ScriptOp::Encode { .. } => "encode",
            ScriptOp::Export { .. } => "export",
            ScriptOp::Decode { .. } => "decode",
            ScriptOp::Import { .. } => "import",
            ScriptOp::Free { .. } => "free",
            ScriptOp::Read { .. } => "read",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScriptSummary {
    pub ops: usize,
    pub failures: usize,
    pub first_failure: Option<ErrorKind>,
}

/// Accepts either a JSON array of ops or one op per line (JSONL).
pub fn parse_script(input: &str) -> Result<Vec<ScriptOp>, Error> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(invalid_script);
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(invalid_script))
        .collect()
}

fn invalid_script(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message("invalid script")
        .with_hint("Each op is an object like {\"op\":\"store\",\"value\":\"hi\"}.")
        .with_source(err)
}

fn text_json(text: &Utf16Text) -> Value {
    json!({
        "text": text.to_string_lossy(),
        "units": text.units(),
    })
}

pub fn apply_op<M: LinearMemory>(bridge: &mut Bridge<M>, op: &ScriptOp) -> Result<Value, Error> {
    let result = match op {
        ScriptOp::Store { value } => {
            let handle = bridge.store(HostValue::from_json(value)?)?;
            json!({
                "handle": handle.to_bits(),
                "index": handle.index(),
                "generation": handle.generation(),
            })
        }
        ScriptOp::Load { handle } => {
            let value = bridge.load(Handle::from_bits(*handle))?;
            json!({ "handle": handle, "value": value.to_json() })
        }
        ScriptOp::Release { handle } => {
            let value = bridge.release(Handle::from_bits(*handle))?;
            json!({ "handle": handle, "value": value.to_json() })
        }
        ScriptOp::Push { list, elem } => {
            bridge.push(Handle::from_bits(*list), Handle::from_bits(*elem))?;
            json!({ "list": list, "elem": elem })
        }
        ScriptOp::Encode { text } => {
            let text = Utf16Text::from(text.as_str());
            let ptr = bridge.encode_to_heap(&text)?;
            json!({ "ptr": ptr, "count": text.len() })
        }
        ScriptOp::Export { handle } => {
            let ptr = bridge.export_text(Handle::from_bits(*handle))?;
            let count = bridge.memory().read_u32(ptr)?;
            json!({ "handle": handle, "ptr": ptr, "count": count })
        }
        ScriptOp::Decode { ptr, count } => {
            let text = bridge.decode_from_heap(*ptr, *count)?;
            let mut value = text_json(&text);
            value["ptr"] = json!(ptr);
            value
        }
        ScriptOp::Import { ptr, count } => {
            let handle = bridge.import_text(*ptr, *count)?;
            json!({ "ptr": ptr, "handle": handle.to_bits() })
        }
        ScriptOp::Free { ptr } => {
            bridge.free(*ptr)?;
            json!({ "ptr": ptr })
        }
        ScriptOp::Read { ptr, len } => {
            let bytes = bridge.memory().read_bytes(*ptr, *len)?;
            json!({ "ptr": ptr, "hex": to_hex(bytes) })
        }
    };
    Ok(with_op(op.name(), result))
}

fn with_op(name: &str, mut result: Value) -> Value {
    if let Some(obj) = result.as_object_mut() {
        obj.insert("op".to_string(), json!(name));
    }
    result
}

/// Runs `ops` in order, passing each result to `emit`.
///
/// Without `keep_going` the first failing op aborts the run with its error; with it, failures
/// are emitted as `{"op", "index", "error"}` objects and counted in the summary.
pub fn run_script<M: LinearMemory>(
    bridge: &mut Bridge<M>,
    ops: &[ScriptOp],
    keep_going: bool,
    mut emit: impl FnMut(Value),
) -> Result<ScriptSummary, Error> {
    let mut summary = ScriptSummary::default();
    for (index, op) in ops.iter().enumerate() {
        summary.ops += 1;
        match apply_op(bridge, op) {
            Ok(result) => emit(result),
            Err(err) if keep_going => {
                tracing::debug!(index, op = op.name(), error = %err, "script op failed");
                summary.failures += 1;
                summary.first_failure.get_or_insert(err.kind());
                let mut failure = error_json(&err);
                failure["op"] = json!(op.name());
                failure["index"] = json!(index);
                emit(failure);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{ScriptOp, apply_op, parse_script, run_script};
    use crate::api::{Bridge, ErrorKind};
    use serde_json::json;

    #[test]
    fn parses_array_and_jsonl() {
        let array = parse_script(r#"[{"op":"store","value":1},{"op":"free","ptr":8}]"#)
            .expect("array");
        let lines = parse_script("{\"op\":\"store\",\"value\":1}\n\n{\"op\":\"free\",\"ptr\":8}\n")
            .expect("jsonl");
        assert_eq!(array, lines);
        assert_eq!(array[1], ScriptOp::Free { ptr: 8 });
    }

    #[test]
    fn unknown_op_is_usage_error() {
        let err = parse_script(r#"[{"op":"explode"}]"#).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
    }

    #[test]
    fn export_import_script_round_trips() {
        let ops = parse_script(
            r#"[
                {"op":"store","value":"AB"},
                {"op":"export","handle":0},
                {"op":"read","ptr":8,"len":8},
                {"op":"import","ptr":8,"count":2},
                {"op":"load","handle":1}
            ]"#,
        )
        .expect("parse");
        let mut bridge: Bridge = Bridge::default();
        let mut out = Vec::new();
        let summary = run_script(&mut bridge, &ops, false, |v| out.push(v)).expect("run");

        assert_eq!(summary.ops, 5);
        assert_eq!(summary.failures, 0);
        assert_eq!(out[1]["ptr"], 8);
        assert_eq!(out[1]["count"], 2);
        assert_eq!(out[2]["hex"], "0200000041004200");
        assert_eq!(out[3]["handle"], 1);
        assert_eq!(out[4]["value"], "AB");
        assert_eq!(bridge.stats().live_buffers, Some(0));
    }

    #[test]
    fn keep_going_reports_failures_in_place() {
        let ops = vec![
            ScriptOp::Store { value: json!(true) },
            ScriptOp::Release { handle: 0 },
            ScriptOp::Load { handle: 0 },
            ScriptOp::Store { value: json!(null) },
        ];
        let mut bridge: Bridge = Bridge::default();
        let mut out = Vec::new();
        let summary = run_script(&mut bridge, &ops, true, |v| out.push(v)).expect("run");

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.first_failure, Some(ErrorKind::InvalidHandle));
        assert_eq!(out[2]["op"], "load");
        assert_eq!(out[2]["index"], 2);
        assert_eq!(out[2]["error"]["kind"], "InvalidHandle");
        assert_eq!(out[3]["index"], 0);
        assert_eq!(out[3]["generation"], 1);
    }

    #[test]
    fn without_keep_going_first_failure_aborts() {
        let ops = vec![ScriptOp::Free { ptr: 64 }, ScriptOp::Store { value: json!(1) }];
        let mut bridge: Bridge = Bridge::default();
        let mut out = Vec::new();
        let err = run_script(&mut bridge, &ops, false, |v| out.push(v)).expect_err("abort");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(out.is_empty());
        assert!(bridge.table().is_empty());
    }

    #[test]
    fn decode_result_lists_units() {
        let mut bridge: Bridge = Bridge::default();
        let encoded = apply_op(&mut bridge, &ScriptOp::Encode { text: "hi".to_string() })
            .expect("encode");
        let ptr = encoded["ptr"].as_u64().expect("ptr") as u32;
        let decoded = apply_op(&mut bridge, &ScriptOp::Decode { ptr, count: 2 }).expect("decode");
        assert_eq!(decoded["op"], "decode");
        assert_eq!(decoded["text"], "hi");
        assert_eq!(decoded["units"], json!([104, 105]));
    }
}

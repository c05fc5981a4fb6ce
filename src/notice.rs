//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`, `leak_notice`.
//! Role: Shared contract helper for CLI diagnostics (non-error events).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is stable once published; fields are additive-only.
use serde_json::{Map, Value, json};

use crate::api::{BridgeStats, Handle};
use crate::report_json::stats_json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// Builds a `leak` notice when handles or heap buffers are still live; `None` when clean.
///
/// `handles` lists the live handles; their bits land in `details.handles`.
pub fn leak_notice(
    cmd: &str,
    time: String,
    stats: &BridgeStats,
    handles: &[Handle],
) -> Option<Notice> {
    let buffers = stats.live_buffers.unwrap_or(0);
    if stats.live_handles == 0 && buffers == 0 {
        return None;
    }
    let mut details = match stats_json(stats) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if !handles.is_empty() {
        let bits: Vec<u64> = handles.iter().map(|handle| handle.to_bits()).collect();
        details.insert("handles".to_string(), json!(bits));
    }
    Some(Notice {
        kind: "leak".to_string(),
        time,
        cmd: cmd.to_string(),
        message: format!(
            "{} handle(s) and {buffers} heap buffer(s) still live",
            stats.live_handles
        ),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::{Notice, leak_notice, notice_json};
    use crate::api::{BridgeStats, Handle};
    use serde_json::{Map, Value};

    #[test]
    fn notice_json_has_required_fields() {
        let mut details = Map::new();
        details.insert("live_buffers".to_string(), Value::from(3));

        let notice = Notice {
            kind: "leak".to_string(),
            time: "2026-02-01T00:00:00Z".to_string(),
            cmd: "run".to_string(),
            message: "3 buffers".to_string(),
            details,
        };

        let value = notice_json(&notice);
        let obj = value
            .get("notice")
            .and_then(|v| v.as_object())
            .expect("notice object");

        assert_eq!(obj.get("kind").and_then(|v| v.as_str()), Some("leak"));
        assert_eq!(
            obj.get("time").and_then(|v| v.as_str()),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(obj.get("cmd").and_then(|v| v.as_str()), Some("run"));
        assert_eq!(obj.get("message").and_then(|v| v.as_str()), Some("3 buffers"));
        assert!(obj.get("details").and_then(|v| v.as_object()).is_some());
    }

    #[test]
    fn leak_notice_only_when_something_is_live() {
        let clean = BridgeStats {
            live_buffers: Some(0),
            live_bytes: Some(0),
            ..BridgeStats::default()
        };
        assert!(leak_notice("run", String::new(), &clean, &[]).is_none());

        let leaky = BridgeStats {
            live_handles: 1,
            slots: 1,
            live_buffers: Some(2),
            live_bytes: Some(16),
            ..BridgeStats::default()
        };
        let live = [Handle::from_parts(0, 1)];
        let notice = leak_notice("run", "t".to_string(), &leaky, &live).expect("notice");
        assert_eq!(notice.message, "1 handle(s) and 2 heap buffer(s) still live");
        assert_eq!(notice.details.get("live_bytes"), Some(&Value::from(16)));
        assert_eq!(
            notice.details.get("handles"),
            Some(&Value::from(vec![1u64 << 32]))
        );
    }
}

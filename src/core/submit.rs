//! Submit Engine (C7, §4.7).
//!
//! Packages a built payload and index into a request message, frame-sends it
//! to the native host, and records the outcome on the intent's state. Any
//! transport failure leaves the state untouched — only a confirmed send is
//! persisted.

use crate::core::error::CoreError;
use crate::core::model::IntentKind;
use crate::core::state_store;
use crate::core::time;
use crate::core::transport;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Default connection timeout for a submit (§4.7, §5).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SubmitRequest {
    pub intent_uuid: String,
    pub provider: String,
    pub payload: Value,
    pub profile: Option<String>,
}

/// Build the request message `{id, command, payload, timestamp}` per §4.7/§6.
pub fn build_message(req: &SubmitRequest) -> Value {
    serde_json::json!({
        "id": req.intent_uuid,
        "command": format!("{}.submit", req.provider),
        "payload": {
            "provider": req.provider,
            "text": req.payload,
            "profile": req.profile,
        },
        "timestamp": chrono::Utc::now().timestamp(),
    })
}

/// Frame-send the submit request and, only on success, mark the `submit`
/// step and persist `last_submitted_at`/`last_provider` on the intent.
pub fn submit(
    intent_dir: &Path,
    kind: IntentKind,
    host: &str,
    port: u16,
    req: &SubmitRequest,
    connect_timeout: Duration,
) -> Result<(), CoreError> {
    let message = build_message(req);
    let mut conn = transport::dial(host, port, connect_timeout)?;
    transport::send(&mut conn, &message)?;

    let now = time::now_iso();
    let provider = req.provider.clone();
    state_store::update(intent_dir, kind, |state| {
        state.last_submitted_at = Some(now.clone());
        state.last_provider = Some(provider.clone());
        state.steps.insert("submit".to_string(), true);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message_shape() {
        let req = SubmitRequest {
            intent_uuid: "abc-123".to_string(),
            provider: "claude".to_string(),
            payload: serde_json::json!({"files": []}),
            profile: Some("P1".to_string()),
        };
        let msg = build_message(&req);
        assert_eq!(msg["id"], "abc-123");
        assert_eq!(msg["command"], "claude.submit");
        assert_eq!(msg["payload"]["provider"], "claude");
        assert!(msg["timestamp"].is_i64());
    }
}

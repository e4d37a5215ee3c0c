//! Response Receiver (C8, §4.8).
//!
//! Accepts an AI response via socket listen or local file, persists the raw
//! envelope atomically, and extracts referenced files into `.files/`.

use crate::core::error::CoreError;
use crate::core::hydration;
use crate::core::transport;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default socket-mode accept timeout (§5).
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Receive one envelope over the socket, accepting exactly one connection.
pub fn receive_socket(host: &str, port: u16, accept_timeout: Duration) -> Result<Value, CoreError> {
    let mut conn = transport::listen(host, port, accept_timeout)?;
    transport::recv(&mut conn, Duration::from_secs(60))
}

/// Read one envelope from a local file.
pub fn receive_file(path: &Path) -> Result<Value, CoreError> {
    let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::InvalidProtocol(e.to_string()))
}

/// Persist `envelope` to `<response_dir>/.raw_output.json`, atomic-by-rename.
pub fn persist_raw_output(response_dir: &Path, envelope: &Value) -> Result<(), CoreError> {
    fs::create_dir_all(response_dir).map_err(|e| CoreError::io(response_dir, e))?;
    let target = response_dir.join(".raw_output.json");
    let tmp = response_dir.join(".raw_output.json.tmp");
    let body =
        serde_json::to_vec_pretty(envelope).map_err(|e| CoreError::InvalidProtocol(e.to_string()))?;
    fs::write(&tmp, &body).map_err(|e| CoreError::io(&tmp, e))?;
    fs::rename(&tmp, &target).map_err(|e| CoreError::io(&target, e))?;
    Ok(())
}

/// Outcome of extracting `content.files` into `.files/`.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub written: Vec<String>,
    /// `file_ref` entries that were missing or had no retrievable content;
    /// recorded but not fatal (§4.8).
    pub missing: Vec<String>,
}

/// Decode each `content.files[].c` (or trust on-disk bytes delivered
/// out-of-band) and write it to `<response_dir>/.files/{file_ref}`.
pub fn extract_files(response_dir: &Path, envelope: &Value) -> Result<ExtractionReport, CoreError> {
    let files_dir = response_dir.join(".files");
    fs::create_dir_all(&files_dir).map_err(|e| CoreError::io(&files_dir, e))?;

    let mut report = ExtractionReport::default();
    let entries = envelope
        .get("content")
        .and_then(|c| c.get("files"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for entry in entries {
        let Some(file_ref) = entry.get("file_ref").and_then(Value::as_str) else {
            report.missing.push("<no file_ref>".to_string());
            continue;
        };
        let target = files_dir.join(file_ref);
        if let Some(content) = entry.get("c").and_then(Value::as_str) {
            let decoded = hydration::decode_content(content)?;
            fs::write(&target, decoded).map_err(|e| CoreError::io(&target, e))?;
            report.written.push(file_ref.to_string());
        } else if target.is_file() {
            // Out-of-band delivery: trust the bytes already on disk.
            report.written.push(file_ref.to_string());
        } else {
            report.missing.push(file_ref.to_string());
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_raw_output_then_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let envelope = serde_json::json!({"bloom_protocol": {"version": "1.0"}});
        persist_raw_output(tmp.path(), &envelope).unwrap();
        let read_back: Value =
            serde_json::from_slice(&fs::read(tmp.path().join(".raw_output.json")).unwrap())
                .unwrap();
        assert_eq!(read_back, envelope);
    }

    #[test]
    fn test_extract_files_decodes_inline_content() {
        let tmp = tempfile::tempdir().unwrap();
        let envelope = serde_json::json!({
            "content": {
                "files": [
                    {"file_ref": "a.txt", "path": "src/a.txt", "action": "create", "c": "hello"}
                ]
            }
        });
        let report = extract_files(tmp.path(), &envelope).unwrap();
        assert_eq!(report.written, vec!["a.txt"]);
        let bytes = fs::read(tmp.path().join(".files/a.txt")).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_extract_files_records_missing_without_failing() {
        let tmp = tempfile::tempdir().unwrap();
        let envelope = serde_json::json!({
            "content": {"files": [{"path": "src/a.txt", "action": "create"}]}
        });
        let report = extract_files(tmp.path(), &envelope).unwrap();
        assert_eq!(report.missing, vec!["<no file_ref>".to_string()]);
        assert!(report.written.is_empty());
    }
}

//! Decoding and persistence of job results.
//!
//! The endpoint's response shape has drifted across worker versions: images
//! may sit at `output.images` or one level deeper at `output.message.images`,
//! and each entry is either a bare base64 string or a map carrying it under
//! `image` or `data`. Everything is normalized here to raw bytes; nothing
//! downstream branches on the wire shape.
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Local;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Outcome of a submission, normalized from the raw status payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Decoded image buffers, in response order.
    Completed(Vec<Vec<u8>>),
    /// The endpoint reported FAILED; carries its error message verbatim.
    Failed(String),
    /// Any other top-level status, with the raw payload for diagnostics.
    Unknown(Value),
}

impl JobResult {
    /// Collapse into a hard result for callers that treat anything short of
    /// completion as an error.
    pub fn into_images(self) -> AppResult<Vec<Vec<u8>>> {
        match self {
            JobResult::Completed(images) => Ok(images),
            JobResult::Failed(message) => Err(AppError::JobFailed(message)),
            JobResult::Unknown(payload) => Err(AppError::JobFailed(format!(
                "unexpected terminal status: {}",
                payload.get("status").cloned().unwrap_or(Value::Null)
            ))),
        }
    }
}

/// Normalize a raw status payload into a [`JobResult`].
///
/// A non-COMPLETED status short-circuits without attempting extraction. A
/// completed payload with no recognizable image field decodes to zero images;
/// the job may legitimately not produce any.
pub fn decode(response: &Value) -> JobResult {
    match response.get("status").and_then(Value::as_str) {
        Some("COMPLETED") => JobResult::Completed(extract_images(response)),
        Some("FAILED") => {
            let message = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            JobResult::Failed(message)
        }
        _ => JobResult::Unknown(response.clone()),
    }
}

/// Decode a base64 image string, stripping a data-URI prefix if present.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    BASE64.decode(payload)
}

fn image_entries(output: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = output.get("images").and_then(Value::as_array) {
        return Some(arr);
    }
    output
        .get("message")
        .and_then(|m| m.get("images"))
        .and_then(Value::as_array)
}

fn extract_images(response: &Value) -> Vec<Vec<u8>> {
    let Some(entries) = response.get("output").and_then(image_entries) else {
        tracing::warn!("Completed response carries no recognizable image field");
        return Vec::new();
    };

    let mut images = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let encoded = match entry {
            Value::String(s) => s.as_str(),
            Value::Object(map) => {
                match map.get("image").or_else(|| map.get("data")).and_then(Value::as_str) {
                    Some(s) => s,
                    None => {
                        tracing::warn!(
                            index = idx,
                            "Skipping image entry with unknown keys: {:?}",
                            map.keys().collect::<Vec<_>>()
                        );
                        continue;
                    }
                }
            }
            _ => {
                tracing::warn!(index = idx, "Skipping non-string image entry");
                continue;
            }
        };
        match decode_base64_image(encoded) {
            Ok(bytes) => images.push(bytes),
            Err(e) => tracing::warn!(index = idx, "Skipping undecodable image entry: {}", e),
        }
    }
    images
}

/// Timestamp-and-index naming to avoid collisions in the output directory.
pub fn timestamped_filename(prefix: &str, index: usize) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{prefix}_{timestamp}_{index}.png")
}

/// Write each decoded image under `dir`, creating it as needed.
pub async fn save_images(images: &[Vec<u8>], dir: &Path, prefix: &str) -> AppResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut saved = Vec::with_capacity(images.len());
    for (idx, bytes) in images.iter().enumerate() {
        let path = dir.join(timestamped_filename(prefix, idx));
        tokio::fs::write(&path, bytes).await?;
        tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
        saved.push(path);
    }
    Ok(saved)
}

/// Bound an error message for display contexts with length limits.
pub fn truncate_for_display(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        message.to_string()
    } else {
        let mut cut: String = message.chars().take(limit).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(encoded: &str) -> Value {
        json!({ "status": "COMPLETED", "output": { "images": [encoded] } })
    }

    #[test]
    fn round_trip_single_image() {
        let bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];
        let payload = wrap(&BASE64.encode(&bytes));
        match decode(&payload) {
            JobResult::Completed(images) => assert_eq!(images, vec![bytes]),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn both_historical_shapes_decode_identically() {
        let encoded = BASE64.encode(b"pixels");
        let flat = json!({ "status": "COMPLETED", "output": { "images": [encoded.clone()] } });
        let nested = json!({
            "status": "COMPLETED",
            "output": { "message": { "images": [{ "image": encoded }] } }
        });
        assert_eq!(decode(&flat), decode(&nested));
        match decode(&flat) {
            JobResult::Completed(images) => assert_eq!(images, vec![b"pixels".to_vec()]),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        let encoded = BASE64.encode(b"pixels");
        let with_prefix = wrap(&format!("data:image/png;base64,{encoded}"));
        let bare = wrap(&encoded);
        assert_eq!(decode(&with_prefix), decode(&bare));
    }

    #[test]
    fn dict_entries_accept_image_and_data_keys() {
        let encoded = BASE64.encode(b"pixels");
        let payload = json!({
            "status": "COMPLETED",
            "output": { "images": [{ "image": encoded.clone() }, { "data": encoded }] }
        });
        match decode(&payload) {
            JobResult::Completed(images) => assert_eq!(images.len(), 2),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_entries_are_skipped_not_fatal() {
        let encoded = BASE64.encode(b"pixels");
        let payload = json!({
            "status": "COMPLETED",
            "output": { "images": [
                { "mystery": "keys" },
                42,
                "%%% not base64 %%%",
                encoded
            ] }
        });
        match decode(&payload) {
            JobResult::Completed(images) => assert_eq!(images, vec![b"pixels".to_vec()]),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn completed_without_image_field_is_zero_images() {
        let payload = json!({ "status": "COMPLETED", "output": { "text": "no pictures here" } });
        match decode(&payload) {
            JobResult::Completed(images) => assert!(images.is_empty()),
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn failed_status_carries_error_verbatim() {
        let payload = json!({ "status": "FAILED", "error": "CUDA out of memory" });
        assert_eq!(decode(&payload), JobResult::Failed("CUDA out of memory".to_string()));

        let no_message = json!({ "status": "FAILED" });
        assert_eq!(decode(&no_message), JobResult::Failed("Unknown error".to_string()));
    }

    #[test]
    fn other_statuses_are_unknown_with_payload() {
        let payload = json!({ "status": "IN_QUEUE", "id": "abc" });
        match decode(&payload) {
            JobResult::Unknown(raw) => assert_eq!(raw["id"], "abc"),
            other => panic!("Expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn into_images_maps_failure_to_error() {
        let failed = JobResult::Failed("CUDA out of memory".to_string());
        match failed.into_images() {
            Err(crate::error::AppError::JobFailed(msg)) => assert_eq!(msg, "CUDA out of memory"),
            other => panic!("Expected JobFailed, got {other:?}"),
        }
        let ok = JobResult::Completed(vec![vec![1]]);
        assert_eq!(ok.into_images().unwrap(), vec![vec![1]]);
    }

    #[test]
    fn truncation_bounds_long_messages() {
        assert_eq!(truncate_for_display("short", 10), "short");
        let long = "x".repeat(300);
        let shown = truncate_for_display(&long, 200);
        assert_eq!(shown.chars().count(), 203);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn timestamped_filenames_carry_prefix_and_index() {
        let name = timestamped_filename("flux_output", 2);
        assert!(name.starts_with("flux_output_"));
        assert!(name.ends_with("_2.png"));
    }
}

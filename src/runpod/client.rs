//! HTTP client for a RunPod serverless endpoint.
//!
//! - `submit_sync` posts to `/runsync` and blocks until the engine answers.
//! - `submit_async` posts to `/run` and returns a [`JobHandle`] immediately.
//! - `check_status` performs a single poll of `/status/{id}`.
//! - `wait_for_completion` wraps `check_status` in a bounded poll loop.
//!
//! Submissions are stateless HTTPS POSTs with a bearer credential; the only
//! state kept between calls is the pooled `reqwest` connection.
use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::workflow::graph::Workflow;
use crate::workflow::params::InputImage;

/// Bound on a blocking `/runsync` call.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(300);
/// Bound on async submission and status checks.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct RunPodClient {
    client: Client,
    api_base: String,
    api_key: String,
    endpoint_id: String,
}

/// Handle to an asynchronously submitted job, consumed by the poll loop.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl RunPodClient {
    pub fn new(api_key: String, endpoint_id: String) -> Self {
        Self::with_base("https://api.runpod.ai", api_key, endpoint_id)
    }

    pub fn with_base(api_base: &str, api_key: String, endpoint_id: String) -> Self {
        RunPodClient {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            endpoint_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}/{}", self.api_base, self.endpoint_id, path)
    }

    /// Submit a job and block until the engine returns a finished result or
    /// the connection times out. Transport errors and non-2xx statuses are
    /// surfaced, never retried.
    pub async fn submit_sync(&self, workflow: &Workflow, images: &[InputImage]) -> AppResult<Value> {
        let url = self.url("runsync");
        tracing::info!(endpoint_id = %self.endpoint_id, "Submitting synchronous job to {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(SYNC_TIMEOUT)
            .json(&request_body(workflow, images))
            .send()
            .await
            .map_err(|e| log_transport("submit_sync", e))?;
        Self::parse_json(response).await
    }

    /// Submit a job and return immediately with its handle.
    pub async fn submit_async(
        &self,
        workflow: &Workflow,
        images: &[InputImage],
    ) -> AppResult<JobHandle> {
        let url = self.url("run");
        tracing::info!(endpoint_id = %self.endpoint_id, "Submitting asynchronous job to {}", url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(SHORT_TIMEOUT)
            .json(&request_body(workflow, images))
            .send()
            .await
            .map_err(|e| log_transport("submit_async", e))?;
        let status = response.status().as_u16();
        let body = Self::parse_json(response).await?;
        match body.get("id").and_then(Value::as_str) {
            Some(id) => Ok(JobHandle {
                job_id: id.to_string(),
                submitted_at: Utc::now(),
            }),
            None => {
                tracing::error!("Async submission returned no job id: {}", body);
                Err(AppError::Remote {
                    status,
                    body: body.to_string(),
                })
            }
        }
    }

    /// Perform a single status poll for an async job.
    pub async fn check_status(&self, handle: &JobHandle) -> AppResult<Value> {
        let url = self.url(&format!("status/{}", handle.job_id));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await
            .map_err(|e| log_transport("check_status", e))?;
        Self::parse_json(response).await
    }

    /// Poll until the job reaches a terminal state or `max_wait` elapses.
    pub async fn wait_for_completion(
        &self,
        handle: &JobHandle,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> AppResult<Value> {
        poll_until_terminal(&handle.job_id, poll_interval, max_wait, || {
            self.check_status(handle)
        })
        .await
    }

    /// Liveness probe against the endpoint.
    pub async fn health(&self) -> AppResult<Value> {
        let url = self.url("health");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await
            .map_err(|e| log_transport("health", e))?;
        Self::parse_json(response).await
    }

    async fn parse_json(response: reqwest::Response) -> AppResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::error!("RunPod API error ({}): {}", status, body);
            return Err(AppError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Build the request body `{"input": {"workflow": ..., "images": [...]}}`.
/// The `images` array is omitted entirely when there are no attachments.
fn request_body(workflow: &Workflow, images: &[InputImage]) -> Value {
    let mut input = json!({ "workflow": workflow });
    if !images.is_empty() {
        let encoded: Vec<Value> = images
            .iter()
            .map(|img| json!({ "name": img.name, "image": BASE64.encode(&img.data) }))
            .collect();
        input["images"] = Value::Array(encoded);
    }
    json!({ "input": input })
}

fn log_transport(operation: &str, e: reqwest::Error) -> AppError {
    tracing::error!("Transport failure during {}: {}", operation, e);
    AppError::HttpClient(e)
}

/// Terminal statuses are exactly COMPLETED and FAILED; anything else keeps
/// the poll loop running.
fn is_terminal(status: Option<&str>) -> bool {
    matches!(status, Some("COMPLETED") | Some("FAILED"))
}

async fn poll_until_terminal<F, Fut>(
    job_id: &str,
    poll_interval: Duration,
    max_wait: Duration,
    mut fetch: F,
) -> AppResult<Value>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Value>>,
{
    let started = tokio::time::Instant::now();
    loop {
        if started.elapsed() >= max_wait {
            return Err(AppError::PollTimeout {
                job_id: job_id.to_string(),
                waited: started.elapsed(),
            });
        }
        let payload = fetch().await?;
        let status = payload.get("status").and_then(Value::as_str);
        if is_terminal(status) {
            return Ok(payload);
        }
        tracing::info!(
            job_id,
            status = status.unwrap_or("<missing>"),
            "Job not finished, waiting {}s",
            poll_interval.as_secs()
        );
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::template::embedded_text_to_image;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn terminal_statuses_are_exactly_completed_and_failed() {
        assert!(is_terminal(Some("COMPLETED")));
        assert!(is_terminal(Some("FAILED")));
        assert!(!is_terminal(Some("IN_QUEUE")));
        assert!(!is_terminal(Some("IN_PROGRESS")));
        assert!(!is_terminal(None));
    }

    #[test]
    fn request_body_omits_empty_images() {
        let wf = embedded_text_to_image();
        let body = request_body(&wf, &[]);
        assert!(body["input"].get("images").is_none());
        assert!(body["input"]["workflow"].get("31").is_some());
    }

    #[test]
    fn request_body_encodes_attachments() {
        let wf = embedded_text_to_image();
        let images = vec![InputImage {
            name: "input_a.png".to_string(),
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        }];
        let body = request_body(&wf, &images);
        let entry = &body["input"]["images"][0];
        assert_eq!(entry["name"], "input_a.png");
        let round_trip = BASE64.decode(entry["image"].as_str().unwrap()).unwrap();
        assert_eq!(round_trip, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_performs_n_plus_one_checks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let payload = poll_until_terminal(
            "job-1",
            Duration::from_secs(5),
            Duration::from_secs(600),
            move || {
                let seen = seen.clone();
                async move {
                    let n = seen.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Ok(serde_json::json!({ "status": "IN_PROGRESS" }))
                    } else {
                        Ok(serde_json::json!({ "status": "COMPLETED", "output": {} }))
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(payload["status"], "COMPLETED");
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returns_failed_payload_without_retrying() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let payload = poll_until_terminal(
            "job-2",
            Duration::from_secs(5),
            Duration::from_secs(600),
            move || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({ "status": "FAILED", "error": "out of VRAM" }))
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(payload["error"], "out of VRAM");
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_without_terminal_state() {
        let result = poll_until_terminal(
            "job-3",
            Duration::from_secs(5),
            Duration::from_secs(30),
            || async { Ok(serde_json::json!({ "status": "IN_QUEUE" })) },
        )
        .await;
        match result {
            Err(AppError::PollTimeout { job_id, waited }) => {
                assert_eq!(job_id, "job-3");
                assert!(waited >= Duration::from_secs(30));
            }
            other => panic!("Expected PollTimeout, got {other:?}"),
        }
    }
}

//! Common error type and alias.
use std::time::Duration;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required credential or identifier is absent from the environment.
    /// Fatal at startup.
    #[error("Missing required environment variable: {0}")]
    ConfigMissing(&'static str),

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status code.
    #[error("RunPod API error ({status}): {body}")]
    Remote {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The endpoint reported the job as FAILED.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The poll loop exhausted its wall-clock budget without observing a
    /// terminal status.
    #[error("Job {job_id} did not reach a terminal state within {waited:?}")]
    PollTimeout { job_id: String, waited: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

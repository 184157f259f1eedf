//! RunPod FLUX client library
//!
//! Modules:
//! - `runpod`: Job submission client for RunPod serverless endpoints.
//! - `workflow`: Workflow-graph document model, templates, and mutation.
//! - `output`: Response decoding and image persistence.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `RunPodClient`,
//! `Workflow`, `GenerationParams`, and `JobResult`.
pub mod config;
pub mod error;
pub mod output;
pub mod runpod;
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use output::JobResult;
pub use runpod::client::{JobHandle, RunPodClient};
pub use workflow::graph::Workflow;
pub use workflow::params::GenerationParams;
pub use workflow::template::GenerationMode;

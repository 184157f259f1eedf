//! RunPod serverless endpoint integration.
pub mod client;

//! Env-driven configuration for the client and CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binary. Credentials are required and validated only for presence;
//! everything else has a development-friendly default.
use std::env;

use crate::error::{AppError, AppResult};

pub struct Config {
    pub api_key: String,
    pub endpoint_id: String,
    pub api_base: String,
    pub template_path: String,
    pub output_dir: String,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> AppResult<Self> {
        Ok(Config {
            api_key: require("RUNPOD_API_KEY")?,
            endpoint_id: require("RUNPOD_ENDPOINT_ID")?,
            api_base: env::var("RUNPOD_API_BASE")
                .unwrap_or_else(|_| "https://api.runpod.ai".to_string()),
            template_path: env::var("WORKFLOW_TEMPLATE")
                .unwrap_or_else(|_| "flux_workflow.json".to_string()),
            output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| "./outputs".to_string()),
        })
    }

    /// Print the effective configuration with the credential masked.
    pub fn print_summary(&self) {
        let masked = if self.api_key.len() > 10 {
            format!("{}...", &self.api_key[..10])
        } else {
            "<set>".to_string()
        };
        println!("RUNPOD_API_KEY: {}", masked);
        println!("RUNPOD_ENDPOINT_ID: {}", self.endpoint_id);
        println!("RUNPOD_API_BASE: {}", self.api_base);
        println!("WORKFLOW_TEMPLATE: {}", self.template_path);
        println!("OUTPUT_DIR: {}", self.output_dir);
    }
}

fn require(name: &'static str) -> AppResult<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::ConfigMissing(name)),
    }
}

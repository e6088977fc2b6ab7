//! Step reporting — the client that tells the tracking backend a journey
//! step was reached.

pub mod client;
pub mod config;
pub mod dry_run;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use client::{create, VoiceCompassClient};
pub use config::ReporterConfig;
pub use dry_run::DryRunReporter;

/// Free-form context attached to a step report.
pub type Context = Map<String, Value>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("invalid stepId `{0}`: it should be formatted as a UUID")]
    InvalidStepId(String),

    #[error("invalid API URL `{url}`: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("tracking request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("tracking endpoint responded with status {status}")]
    Status { status: u16 },
}

/// Anything that can deliver a step to the tracking backend.
#[async_trait]
pub trait StepReporter: Send + Sync {
    async fn send_step(&self, step_id: &str, context: Option<Context>) -> Result<(), ReportError>;
}

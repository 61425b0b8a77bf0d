//! Narrative analysis through an external text-generation service.
//!
//! This module provides the Ollama client, the analyst that builds the
//! request and parses the reply, and the single-slot request tracker.

pub mod analyst;
pub mod ollama;
pub mod tracker;

pub use analyst::NarrativeAnalyst;
pub use ollama::{OllamaConfig, OllamaGenerator};
pub use tracker::{AnalysisState, AnalysisTracker};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot connect to Ollama at {0}. Is Ollama running?")]
    Connect(String),

    #[error("failed to send request: {0}")]
    Transport(String),

    #[error("Ollama API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("response did not conform to expected schema: {0}")]
    Schema(String),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

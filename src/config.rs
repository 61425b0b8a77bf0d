//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.ivcare.toml` files.

use crate::narrative::OllamaConfig;
use crate::report::RenderOptions;
use crate::store::DEFAULT_STORAGE_KEY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".ivcare.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Export settings.
    #[serde(default)]
    pub export: ExportConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the record store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Name of the slot the records are stored under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_key: default_storage_key(),
            verbose: false,
        }
    }
}

fn default_data_dir() -> String {
    ".ivcare".to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds. The analysis falls back when exceeded.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    120
}

/// CSV export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory export files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    ".".to_string()
}

/// Dashboard rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of challenges listed in the ranking.
    #[serde(default = "default_max_challenges")]
    pub max_challenges: usize,

    /// Append the full records table to dashboards.
    #[serde(default)]
    pub include_records: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_challenges: default_max_challenges(),
            include_records: false,
        }
    }
}

fn default_max_challenges() -> usize {
    10
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.display().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }

        match &args.command {
            Some(crate::cli::Command::Analyze(analyze)) => {
                if let Some(ref model) = analyze.model {
                    self.model.name = model.clone();
                }
                if let Some(ref url) = analyze.ollama_url {
                    self.model.ollama_url = url.clone();
                }
                if let Some(timeout) = analyze.timeout {
                    self.model.timeout_seconds = timeout;
                }
                if let Some(temperature) = analyze.temperature {
                    self.model.temperature = temperature;
                }
            }
            Some(crate::cli::Command::Export { output_dir: Some(dir) }) => {
                self.export.output_dir = dir.display().to_string();
            }
            Some(crate::cli::Command::Dashboard { records: true, .. }) => {
                self.report.include_records = true;
            }
            _ => {}
        }
    }

    /// Connection settings for the narrative analysis.
    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            max_challenges: self.report.max_challenges,
            include_records: self.report.include_records,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

//! Configuration management for papernotes
//!
//! Settings come from an optional TOML file, then environment variables
//! (after `.env` is loaded). Credentials are never written back to disk.

use crate::error::{PipelineError, Result, Stage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const UNSTRUCTURED_API_URL: &str = "https://api.unstructuredapp.io/general/v0/general";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Processing strategy requested from the extraction service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Layout model + OCR, slowest but best for papers
    #[default]
    HiRes,
    /// Text layer only
    Fast,
    /// Let the service decide
    Auto,
    OcrOnly,
}

impl ExtractionStrategy {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            Self::HiRes => "hi_res",
            Self::Fast => "fast",
            Self::Auto => "auto",
            Self::OcrOnly => "ocr_only",
        }
    }
}

/// What to do when the model answers without calling the notes tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Raise a validation error
    #[default]
    Fail,
    /// Wrap the free-text answer into a single note
    FreeText,
}

impl FallbackPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::FreeText => "free-text",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub strategy: ExtractionStrategy,
    /// Where staging files go (system temp dir if unset)
    pub staging_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_url: UNSTRUCTURED_API_URL.to_string(),
            api_key: None,
            strategy: ExtractionStrategy::default(),
            staging_dir: None,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReasoningConfig {
    /// OpenAI-compatible base URL (OpenAI, Mistral, a local gateway...)
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    /// Context window in tokens, used only for a size warning
    pub context_window: usize,
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            context_window: 128_000,
            timeout_secs: 300,
        }
    }
}

/// papernotes configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub extraction: ExtractionConfig,
    pub reasoning: ReasoningConfig,
    pub fallback: FallbackPolicy,
}

impl Config {
    /// Get the default config file path (~/.papernotes/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".papernotes").join("config.toml"))
    }

    /// Load config from a TOML file, or defaults if it doesn't exist
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(
                Stage::Config,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            PipelineError::configuration(Stage::Config, format!("failed to parse config: {}", e))
        })
    }

    /// Load `.env`, then the config file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let mut config = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override settings from environment-like lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("UNSTRUCTURED_API_KEY") {
            self.extraction.api_key = Some(key);
        }
        if let Some(url) = get("UNSTRUCTURED_API_URL") {
            self.extraction.api_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.reasoning.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.reasoning.base_url = url;
        }
        if let Some(model) = get("PAPERNOTES_MODEL") {
            self.reasoning.model = model;
        }
    }

    /// Fail fast when a collaborator credential is missing.
    pub fn validate(&self) -> Result<()> {
        require_key(&self.extraction.api_key, Stage::Extract, "UNSTRUCTURED_API_KEY")?;
        require_key(&self.reasoning.api_key, Stage::Synthesize, "OPENAI_API_KEY")?;
        Ok(())
    }
}

/// Return the credential, or a configuration error naming the variable.
pub(crate) fn require_key<'a>(key: &'a Option<String>, stage: Stage, var: &str) -> Result<&'a str> {
    match key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(PipelineError::configuration(
            stage,
            format!("missing API key (set {})", var),
        )),
    }
}

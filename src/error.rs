//! Error taxonomy for the notes pipeline
//!
//! Every error knows which stage raised it. Causes are chained through
//! `std::error::Error::source` so the CLI can print the full story.

use std::fmt;
use thiserror::Error;

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Fetch,
    Redact,
    Extract,
    Synthesize,
}

impl Stage {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Fetch => "fetch",
            Self::Redact => "redact",
            Self::Extract => "extract",
            Self::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Problems with the model's structured output.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("tool-call arguments are not valid JSON: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("tool-call arguments have no `notes` array")]
    MissingNotes,
    #[error("model returned no tool call and no usable free-text fallback")]
    MissingToolCall,
    /// One element of the `notes` array; the rest of the batch still stands.
    #[error("note #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

impl ValidationError {
    /// Position in the `notes` array, for per-record rejections.
    pub fn record_index(&self) -> Option<usize> {
        match self {
            Self::InvalidRecord { index, .. } => Some(*index),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[{stage}] invalid input: {message}")]
    InvalidInput { stage: Stage, message: String },

    #[error("[fetch] failed to fetch {location}: {reason}")]
    Fetch {
        location: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[redact] page {page} is out of range (document has {page_count} pages)")]
    InvalidPage { page: u32, page_count: u32 },

    #[error("[redact] failed to parse document: {0}")]
    Parse(String),

    #[error("[{stage}] configuration error: {message}")]
    Configuration { stage: Stage, message: String },

    #[error("[extract] extraction service failed")]
    Extraction(#[source] anyhow::Error),

    #[error("[synthesize] {0}")]
    Validation(#[from] ValidationError),

    #[error("[synthesize] reasoning service failed")]
    Synthesis(#[source] anyhow::Error),

    #[error("[{0}] cancelled")]
    Cancelled(Stage),
}

impl PipelineError {
    /// The stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidInput { stage, .. } | Self::Configuration { stage, .. } => *stage,
            Self::Fetch { .. } => Stage::Fetch,
            Self::InvalidPage { .. } | Self::Parse(_) => Stage::Redact,
            Self::Extraction(_) => Stage::Extract,
            Self::Validation(_) | Self::Synthesis(_) => Stage::Synthesize,
            Self::Cancelled(stage) => *stage,
        }
    }

    pub(crate) fn invalid_input(stage: Stage, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            stage,
            message: message.into(),
        }
    }

    pub(crate) fn configuration(stage: Stage, message: impl Into<String>) -> Self {
        Self::Configuration {
            stage,
            message: message.into(),
        }
    }

    pub(crate) fn fetch(
        location: &str,
        reason: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Fetch {
            location: location.to_string(),
            reason: reason.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_errors_report_their_stage() {
        assert_eq!(
            PipelineError::InvalidPage { page: 11, page_count: 10 }.stage(),
            Stage::Redact
        );
        assert_eq!(
            PipelineError::configuration(Stage::Extract, "missing key").stage(),
            Stage::Extract
        );
        assert_eq!(
            PipelineError::from(ValidationError::MissingNotes).stage(),
            Stage::Synthesize
        );
        assert_eq!(PipelineError::Cancelled(Stage::Fetch).stage(), Stage::Fetch);
    }

    #[test]
    fn test_display_is_prefixed_with_stage() {
        let err = PipelineError::invalid_input(Stage::Fetch, "not a PDF");
        assert_eq!(err.to_string(), "[fetch] invalid input: not a PDF");

        let err = PipelineError::InvalidPage { page: 12, page_count: 10 };
        assert_eq!(
            err.to_string(),
            "[redact] page 12 is out of range (document has 10 pages)"
        );
    }

    #[test]
    fn test_cause_is_chained() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = PipelineError::from(ValidationError::MalformedPayload(json_err));
        let inner = err.source().expect("validation error as source");
        assert!(inner.source().is_some(), "serde error should be chained");

        let err = PipelineError::Extraction(anyhow::anyhow!("quota exceeded"));
        assert_eq!(err.source().unwrap().to_string(), "quota exceeded");
    }
}

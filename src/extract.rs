//! Content extraction
//!
//! Stages the document in a temporary file, hands it to an external
//! extraction service and maps the returned elements to segments. The
//! staging file lives exactly as long as the call: it is removed on
//! success, on error, and when the future is dropped mid-flight.

use crate::config::{require_key, ExtractionConfig, ExtractionStrategy};
use crate::error::{PipelineError, Result, Stage};
use crate::types::{ContentSegment, DocumentBytes};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// An external document-extraction service.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Partition the staged file into ordered segments.
    async fn partition(&self, staged: &Path) -> anyhow::Result<Vec<ContentSegment>>;
}

/// Client for the Unstructured partition API
pub struct UnstructuredClient {
    client: Client,
    api_url: String,
    api_key: String,
    strategy: ExtractionStrategy,
}

impl UnstructuredClient {
    /// Build from config; a missing key fails before any request is made.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let api_key = require_key(&config.api_key, Stage::Extract, "UNSTRUCTURED_API_KEY")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::configuration(Stage::Extract, format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: api_key.to_string(),
            strategy: config.strategy,
        })
    }
}

#[async_trait]
impl ExtractionService for UnstructuredClient {
    async fn partition(&self, staged: &Path) -> anyhow::Result<Vec<ContentSegment>> {
        let data = tokio::fs::read(staged)
            .await
            .with_context(|| format!("Failed to read staged file {:?}", staged))?;
        let file_name = staged
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        let form = Form::new()
            .part(
                "files",
                Part::bytes(data)
                    .file_name(file_name)
                    .mime_str("application/pdf")?,
            )
            .text("strategy", self.strategy.name());

        tracing::debug!(url = %self.api_url, strategy = self.strategy.name(), "partitioning document");

        let response = self
            .client
            .post(&self.api_url)
            .header("unstructured-api-key", &self.api_key)
            .header("accept", "application/json")
            .multipart(form)
            .send()
            .await
            .context("Failed to send request to extraction API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Extraction API error ({}): {}", status, error_text));
        }

        let elements: Vec<Element> = response
            .json()
            .await
            .context("Failed to parse extraction response")?;

        Ok(elements.into_iter().map(ContentSegment::from).collect())
    }
}

/// One element of the partition response.
#[derive(Deserialize)]
struct Element {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    element_id: Option<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<Element> for ContentSegment {
    fn from(element: Element) -> Self {
        let page_numbers = element
            .metadata
            .get("page_number")
            .and_then(serde_json::Value::as_u64)
            .and_then(|page| u32::try_from(page).ok())
            .map(|page| vec![page])
            .unwrap_or_default();

        let mut source_metadata = element.metadata;
        if let Some(kind) = element.kind {
            source_metadata.insert("type".to_string(), kind.into());
        }
        if let Some(id) = element.element_id {
            source_metadata.insert("element_id".to_string(), id.into());
        }

        Self {
            text: element.text,
            page_numbers,
            source_metadata,
        }
    }
}

/// Runs extraction with a scoped staging file.
#[derive(Clone)]
pub struct ContentExtractor {
    service: Arc<dyn ExtractionService>,
    staging_dir: Option<PathBuf>,
}

impl ContentExtractor {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            staging_dir: None,
        }
    }

    /// Stage files under `dir` instead of the system temp dir.
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Extract ordered segments. An empty vector is a valid result.
    pub async fn extract(&self, doc: &DocumentBytes) -> Result<Vec<ContentSegment>> {
        let staged = self.stage(doc)?;
        tracing::debug!(path = ?staged.path(), bytes = doc.len(), "document staged");

        // `staged` is dropped (and the file deleted) on every path out of here
        let segments = self
            .service
            .partition(staged.path())
            .await
            .map_err(PipelineError::Extraction)?;

        Ok(segments)
    }

    fn stage(&self, doc: &DocumentBytes) -> Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("papernotes-").suffix(".pdf");

        let staging_err = |e: std::io::Error| {
            PipelineError::Extraction(anyhow::Error::new(e).context("Failed to stage document"))
        };

        let mut file = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(staging_err)?;

        file.write_all(doc.as_bytes()).map_err(staging_err)?;
        file.flush().map_err(staging_err)?;
        Ok(file)
    }
}

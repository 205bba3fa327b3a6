//! Source fetching
//!
//! Resolves a location (http(s) URL, `file://` URL or local path) to PDF
//! bytes. One attempt, no retries: callers decide on retry policy.

use crate::config::FetchConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::types::DocumentBytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fetches source documents
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
}

enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl SourceFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::configuration(Stage::Fetch, format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }

    /// Fetch the document at `location`.
    pub async fn fetch(&self, location: &str) -> Result<DocumentBytes> {
        match classify(location)? {
            Location::Remote(url) => self.fetch_remote(location, url).await,
            Location::Local(path) => fetch_local(location, &path).await,
        }
    }

    async fn fetch_remote(&self, location: &str, url: Url) -> Result<DocumentBytes> {
        tracing::debug!(%url, "GET source document");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PipelineError::fetch(location, describe(&e), Some(Box::new(e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(
                location,
                format!("server returned {}", status),
                None,
            ));
        }

        // Either the requested or the final (post-redirect) URL may carry the extension
        let named_pdf = has_pdf_extension(url.path()) || has_pdf_extension(response.url().path());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let typed_pdf = content_type.as_deref().is_some_and(is_pdf_content_type);

        if !named_pdf && !typed_pdf {
            return Err(PipelineError::invalid_input(
                Stage::Fetch,
                format!(
                    "{} is not a PDF (no .pdf extension, Content-Type: {})",
                    location,
                    content_type.as_deref().unwrap_or("none")
                ),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::fetch(location, describe(&e), Some(Box::new(e))))?;

        tracing::debug!(bytes = body.len(), "source document downloaded");
        DocumentBytes::new(body.to_vec())
    }
}

async fn fetch_local(location: &str, path: &Path) -> Result<DocumentBytes> {
    if !path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    {
        return Err(PipelineError::invalid_input(
            Stage::Fetch,
            format!("{} is not a PDF (no .pdf extension)", location),
        ));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::fetch(location, "failed to read file", Some(Box::new(e))))?;
    DocumentBytes::new(bytes)
}

fn classify(location: &str) -> Result<Location> {
    let location = location.trim();
    if location.is_empty() {
        return Err(PipelineError::invalid_input(Stage::Fetch, "source location is empty"));
    }

    match Url::parse(location) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Location::Remote(url)),
            "file" => url.to_file_path().map(Location::Local).map_err(|_| {
                PipelineError::invalid_input(Stage::Fetch, format!("invalid file URL: {}", location))
            }),
            scheme => Err(PipelineError::invalid_input(
                Stage::Fetch,
                format!("unsupported scheme '{}' in {}", scheme, location),
            )),
        },
        // Not a URL: treat as a filesystem path
        Err(_) => Ok(Location::Local(PathBuf::from(location))),
    }
}

fn has_pdf_extension(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".pdf")
}

fn is_pdf_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"))
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_redirect() {
        "too many redirects".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_body() || err.is_decode() {
        "failed to read response body".to_string()
    } else {
        "request failed".to_string()
    }
}

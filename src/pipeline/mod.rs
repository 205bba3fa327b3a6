//! Notes pipeline
//!
//! Fetch → (optional) redact → extract → synthesize, strictly in order.
//! Each stage finishes before the next starts; nothing is shared between
//! stages except the value handed forward. The whole run is all-or-nothing.

pub mod progress;
pub mod writer;

pub use progress::ProgressTracker;
pub use writer::{NotesWriter, OutputFormat};

use crate::config::Config;
use crate::error::{PipelineError, Result, Stage};
use crate::extract::{ContentExtractor, ExtractionService, UnstructuredClient};
use crate::fetch::SourceFetcher;
use crate::llm::{LLMProvider, OpenAIProvider};
use crate::notes::NoteSynthesizer;
use crate::redact::remove_pages;
use crate::types::{NoteBatch, PageIndex, PipelineRequest};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// The single entry point: one request in, one note batch out.
#[derive(Clone)]
pub struct NotesPipeline {
    fetcher: SourceFetcher,
    extractor: ContentExtractor,
    synthesizer: NoteSynthesizer,
}

impl NotesPipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(fetcher: SourceFetcher, extractor: ContentExtractor, synthesizer: NoteSynthesizer) -> Self {
        Self {
            fetcher,
            extractor,
            synthesizer,
        }
    }

    /// Build the default collaborators (Unstructured + OpenAI-compatible).
    ///
    /// Fails with a configuration error before any network traffic when a
    /// credential is missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let service: Arc<dyn ExtractionService> =
            Arc::new(UnstructuredClient::from_config(&config.extraction)?);
        let provider: Arc<dyn LLMProvider> = Arc::new(OpenAIProvider::from_config(&config.reasoning)?);

        Self::with_collaborators(config, service, provider)
    }

    /// Build with injected extraction and reasoning collaborators.
    pub fn with_collaborators(
        config: &Config,
        service: Arc<dyn ExtractionService>,
        provider: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        Ok(Self::new(
            SourceFetcher::new(&config.fetch)?,
            ContentExtractor::new(service).with_staging_dir(config.extraction.staging_dir.clone()),
            NoteSynthesizer::new(provider).with_fallback(config.fallback),
        ))
    }

    /// Run to completion.
    pub async fn run(&self, request: &PipelineRequest) -> Result<NoteBatch> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run until done or until `cancel` fires.
    pub async fn run_with_cancel(&self, request: &PipelineRequest, cancel: CancellationToken) -> Result<NoteBatch> {
        self.run_with_progress(request, cancel, &mut ProgressTracker::quiet())
            .await
    }

    /// Run, reporting each stage to `progress`.
    pub async fn run_with_progress(
        &self,
        request: &PipelineRequest,
        cancel: CancellationToken,
        progress: &mut ProgressTracker,
    ) -> Result<NoteBatch> {
        let span = tracing::info_span!("pipeline", source = %request.source_location);
        let result = self
            .execute(request, &cancel, progress)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            progress.abandon();
            tracing::error!(stage = %e.stage(), error = %e, "pipeline failed");
        }
        result
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
        progress: &mut ProgressTracker,
    ) -> Result<NoteBatch> {
        progress.start_stage(Stage::Fetch, "Fetching document");
        let mut doc = cancellable(cancel, Stage::Fetch, self.fetcher.fetch(&request.source_location)).await?;
        tracing::info!(bytes = doc.len(), "document fetched");
        progress.finish_stage(&format!("{} bytes", doc.len()));

        if !request.pages_to_delete.is_empty() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled(Stage::Redact));
            }
            progress.start_stage(Stage::Redact, "Removing pages");
            let pages: Vec<PageIndex> = request.pages_to_delete.iter().copied().collect();
            doc = remove_pages(&doc, &pages)?;
            tracing::info!(removed = pages.len(), bytes = doc.len(), "pages removed");
            progress.finish_stage(&format!("{} pages removed", pages.len()));
        }

        progress.start_stage(Stage::Extract, "Extracting content");
        let segments = cancellable(cancel, Stage::Extract, self.extractor.extract(&doc)).await?;
        tracing::info!(segments = segments.len(), "content extracted");
        progress.finish_stage(&format!("{} segments", segments.len()));

        progress.start_stage(Stage::Synthesize, "Writing notes");
        let batch = cancellable(cancel, Stage::Synthesize, self.synthesizer.synthesize(&segments)).await?;
        tracing::info!(
            notes = batch.notes.len(),
            rejected = batch.rejected.len(),
            origin = ?batch.origin,
            "notes synthesized"
        );
        progress.finish_stage(&format!("{} notes", batch.notes.len()));

        Ok(batch)
    }
}

/// Race a stage against cancellation. Dropping the stage future aborts
/// its HTTP request and releases its staging file.
async fn cancellable<T>(
    cancel: &CancellationToken,
    stage: Stage,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!(%stage, "cancelled");
            Err(PipelineError::Cancelled(stage))
        }
        result = fut => result,
    }
}

//! papernotes: research paper PDF in, page-cited notes out
//!
//! Pipeline stages:
//! - [`fetch`]: download (or read) the PDF
//! - [`redact`]: drop unwanted pages
//! - [`extract`]: partition the document with an extraction service
//! - [`notes`]: have an LLM write structured notes through a tool call

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod notes;
pub mod pipeline;
pub mod redact;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{Config, ExtractionStrategy, FallbackPolicy};
pub use error::{PipelineError, Result, Stage, ValidationError};
pub use extract::{ContentExtractor, ExtractionService, UnstructuredClient};
pub use fetch::SourceFetcher;
pub use notes::NoteSynthesizer;
pub use pipeline::{NotesPipeline, NotesWriter, OutputFormat, ProgressTracker};
pub use redact::{page_count, remove_pages};
pub use types::{
    ContentSegment, DocumentBytes, NoteBatch, NoteOrigin, NoteRecord, PageIndex, PipelineRequest,
};

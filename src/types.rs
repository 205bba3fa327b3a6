//! Core data types flowing through the pipeline

use crate::error::{PipelineError, Result, Stage, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Magic bytes every PDF starts with.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Raw document payload. Always non-empty and PDF-signed.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentBytes(Vec<u8>);

impl DocumentBytes {
    /// Wrap raw bytes, checking the PDF signature.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(PipelineError::invalid_input(Stage::Fetch, "document is empty"));
        }
        if !bytes.starts_with(PDF_SIGNATURE) {
            return Err(PipelineError::invalid_input(
                Stage::Fetch,
                "document does not start with a %PDF- signature",
            ));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for DocumentBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentBytes({} bytes)", self.0.len())
    }
}

/// 1-based page number within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageIndex(u32);

impl PageIndex {
    pub fn new(page: u32) -> Result<Self> {
        if page == 0 {
            return Err(PipelineError::invalid_input(
                Stage::Redact,
                "page numbers start at 1",
            ));
        }
        Ok(Self(page))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One invocation of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source_location: String,
    /// Pages to drop before extraction, in original numbering
    pub pages_to_delete: BTreeSet<PageIndex>,
}

impl PipelineRequest {
    pub fn new(source_location: impl Into<String>) -> Self {
        Self {
            source_location: source_location.into(),
            pages_to_delete: BTreeSet::new(),
        }
    }

    /// Builder: pages to delete (duplicates collapse, zero is rejected)
    pub fn with_pages_to_delete(mut self, pages: impl IntoIterator<Item = u32>) -> Result<Self> {
        for page in pages {
            self.pages_to_delete.insert(PageIndex::new(page)?);
        }
        Ok(self)
    }
}

/// A unit of extracted content with page attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSegment {
    pub text: String,
    pub page_numbers: Vec<u32>,
    #[serde(default)]
    pub source_metadata: serde_json::Map<String, serde_json::Value>,
}

impl ContentSegment {
    pub fn new(text: impl Into<String>, page_numbers: Vec<u32>) -> Self {
        Self {
            text: text.into(),
            page_numbers,
            source_metadata: serde_json::Map::new(),
        }
    }
}

/// A single validated note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub note: String,
    #[serde(rename = "pageNumbers")]
    pub page_numbers: Vec<u32>,
}

/// Where the notes in a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteOrigin {
    /// Parsed from the `formatNotes` tool-call arguments
    ToolCall,
    /// Model answered in free text and the fallback policy wrapped it
    FreeTextFallback,
    /// Nothing to take notes on
    Empty,
}

/// Output of the synthesizer (and of the whole pipeline).
#[derive(Debug)]
pub struct NoteBatch {
    pub notes: Vec<NoteRecord>,
    /// `ValidationError::InvalidRecord` for each element that failed validation
    pub rejected: Vec<ValidationError>,
    pub origin: NoteOrigin,
}

impl NoteBatch {
    pub fn empty() -> Self {
        Self {
            notes: Vec::new(),
            rejected: Vec::new(),
            origin: NoteOrigin::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_bytes_requires_signature() {
        assert!(DocumentBytes::new(b"%PDF-1.5\n...".to_vec()).is_ok());

        let err = DocumentBytes::new(Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { .. }));

        let err = DocumentBytes::new(b"<html>".to_vec()).unwrap_err();
        assert!(err.to_string().contains("%PDF-"));
    }

    #[test]
    fn test_page_index_is_one_based() {
        assert!(PageIndex::new(0).is_err());
        assert_eq!(PageIndex::new(3).unwrap().get(), 3);
    }

    #[test]
    fn test_request_dedupes_pages() {
        let request = PipelineRequest::new("https://example.com/a.pdf")
            .with_pages_to_delete([7, 3, 7])
            .unwrap();
        let pages: Vec<u32> = request.pages_to_delete.iter().map(|p| p.get()).collect();
        assert_eq!(pages, vec![3, 7]);
    }

    #[test]
    fn test_note_record_round_trip() {
        let notes = vec![
            NoteRecord {
                note: "Transformers replace recurrence with attention.".to_string(),
                page_numbers: vec![1, 2],
            },
            NoteRecord {
                note: "BLEU improves by 2 points.".to_string(),
                page_numbers: vec![8],
            },
        ];

        let json = serde_json::to_string(&notes).unwrap();
        assert!(json.contains("\"pageNumbers\""));

        let parsed: Vec<NoteRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, notes);
    }
}

//! Page removal
//!
//! Deletes pages from a PDF, interpreting every index against the original
//! numbering. The input bytes are never touched.

use crate::error::{PipelineError, Result, Stage};
use crate::types::{DocumentBytes, PageIndex};
use lopdf::Document;
use std::collections::BTreeSet;

/// Number of pages in a PDF.
pub fn page_count(doc: &DocumentBytes) -> Result<u32> {
    let pdf = load(doc)?;
    Ok(pdf.get_pages().len() as u32)
}

/// Return a copy of `doc` without `pages` (1-based, original numbering).
///
/// Duplicates are ignored. Every index is checked before anything is
/// removed, so a bad index leaves no partial result behind.
pub fn remove_pages(doc: &DocumentBytes, pages: &[PageIndex]) -> Result<DocumentBytes> {
    let requested: BTreeSet<u32> = pages.iter().map(|p| p.get()).collect();
    if requested.is_empty() {
        return Ok(doc.clone());
    }

    let mut pdf = load(doc)?;
    let page_count = pdf.get_pages().len() as u32;

    if let Some(&page) = requested.iter().find(|&&page| page > page_count) {
        return Err(PipelineError::InvalidPage { page, page_count });
    }
    if requested.len() as u32 == page_count {
        return Err(PipelineError::invalid_input(
            Stage::Redact,
            format!("refusing to remove all {} pages", page_count),
        ));
    }

    // Each removal shifts later pages down by one
    for (removed, &page) in requested.iter().enumerate() {
        pdf.delete_pages(&[page - removed as u32]);
    }

    let expected = page_count - requested.len() as u32;
    let remaining = pdf.get_pages().len() as u32;
    if remaining != expected {
        return Err(PipelineError::Parse(format!(
            "page tree is inconsistent: expected {} pages after removal, found {}",
            expected, remaining
        )));
    }

    pdf.prune_objects();

    let mut out = Vec::with_capacity(doc.len());
    pdf.save_to(&mut out)
        .map_err(|e| PipelineError::Parse(format!("failed to write document: {}", e)))?;

    tracing::debug!(
        removed = requested.len(),
        remaining,
        bytes = out.len(),
        "pages removed"
    );
    DocumentBytes::new(out)
}

fn load(doc: &DocumentBytes) -> Result<Document> {
    Document::load_mem(doc.as_bytes()).map_err(|e| PipelineError::Parse(e.to_string()))
}

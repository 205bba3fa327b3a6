//! Notes Writer
//!
//! Renders a finished batch as Markdown or JSON.

use crate::error::ValidationError;
use crate::types::{NoteBatch, NoteOrigin, NoteRecord};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;

/// Output format for rendered notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

/// JSON document written for `OutputFormat::Json`
#[derive(Serialize)]
struct NotesDocument<'a> {
    source: &'a str,
    origin: NoteOrigin,
    notes: &'a [NoteRecord],
    rejected: Vec<Rejection>,
}

/// JSON form of a rejected record
#[derive(Serialize)]
struct Rejection {
    index: Option<usize>,
    reason: String,
}

impl From<&ValidationError> for Rejection {
    fn from(error: &ValidationError) -> Self {
        match error {
            ValidationError::InvalidRecord { index, reason } => Self {
                index: Some(*index),
                reason: reason.clone(),
            },
            other => Self {
                index: None,
                reason: other.to_string(),
            },
        }
    }
}

/// Writes a note batch to any `Write` target
pub struct NotesWriter {
    format: OutputFormat,
}

impl NotesWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Write `batch`, produced from `source`, to `out`
    pub fn write<W: Write>(&self, out: &mut W, source: &str, batch: &NoteBatch) -> Result<()> {
        match self.format {
            OutputFormat::Markdown => write_markdown(out, source, batch)?,
            OutputFormat::Json => {
                let doc = NotesDocument {
                    source,
                    origin: batch.origin,
                    notes: &batch.notes,
                    rejected: batch.rejected.iter().map(Rejection::from).collect(),
                };
                serde_json::to_writer_pretty(&mut *out, &doc)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

fn write_markdown<W: Write>(out: &mut W, source: &str, batch: &NoteBatch) -> std::io::Result<()> {
    writeln!(out, "# Notes: {}", source)?;
    writeln!(out)?;

    if batch.notes.is_empty() {
        writeln!(out, "_No notes were produced._")?;
    }
    for note in &batch.notes {
        writeln!(out, "- {} ({})", note.note, cite(&note.page_numbers))?;
    }

    if batch.origin == NoteOrigin::FreeTextFallback {
        writeln!(out)?;
        writeln!(out, "> The model answered in free text; notes were not structured.")?;
    }

    if !batch.rejected.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Rejected ({})", batch.rejected.len())?;
        writeln!(out)?;
        for rejection in &batch.rejected {
            writeln!(out, "- {}", rejection)?;
        }
    }

    Ok(())
}

/// "p. 3" or "pp. 3, 4"
fn cite(pages: &[u32]) -> String {
    let list = pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if pages.len() == 1 {
        format!("p. {}", list)
    } else {
        format!("pp. {}", list)
    }
}

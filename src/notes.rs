//! Note synthesis
//!
//! Builds one prompt from the extracted segments, forces the model to
//! answer through the `formatNotes` tool and validates what comes back,
//! record by record.

use crate::config::FallbackPolicy;
use crate::error::{PipelineError, Result, ValidationError};
use crate::llm::{CompletionRequest, CompletionResponse, LLMProvider, Message, ToolDefinition};
use crate::types::{ContentSegment, NoteBatch, NoteOrigin, NoteRecord};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const NOTES_TOOL_NAME: &str = "formatNotes";

/// Fixed for reproducible notes; not exposed to callers.
const TEMPERATURE: f32 = 0.0;

const SYSTEM_PROMPT: &str = "You are a meticulous research assistant. \
Take concise, factual notes on the research paper provided by the user. \
Each note should capture one idea: a claim, method, result, definition or limitation. \
Cite the page number(s) the note comes from, using the [Page N] markers in the text. \
Respond only by calling the formatNotes tool.";

/// Tool definition for the structured notes contract.
pub fn notes_tool() -> ToolDefinition {
    ToolDefinition {
        name: NOTES_TOOL_NAME.to_string(),
        description: "Format the notes response.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "notes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "note": {
                                "type": "string",
                                "description": "The content of the note."
                            },
                            "pageNumbers": {
                                "type": "array",
                                "items": {
                                    "type": "integer",
                                    "description": "The page number(s) where the note appears."
                                }
                            }
                        },
                        "required": ["note", "pageNumbers"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["notes"],
            "additionalProperties": false
        }),
        strict: true,
    }
}

/// Turns segments into notes via a reasoning model
#[derive(Clone)]
pub struct NoteSynthesizer {
    provider: Arc<dyn LLMProvider>,
    fallback: FallbackPolicy,
}

impl NoteSynthesizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Synthesize notes. No usable text means an empty batch and no model call.
    pub async fn synthesize(&self, segments: &[ContentSegment]) -> Result<NoteBatch> {
        let prompt = format_prompt(segments);
        if prompt.is_empty() {
            tracing::info!("no text to take notes on");
            return Ok(NoteBatch::empty());
        }

        let metadata = self.provider.metadata();
        let estimated = self.provider.count_tokens(SYSTEM_PROMPT) + self.provider.count_tokens(&prompt);
        if estimated > metadata.context_window {
            tracing::warn!(
                estimated_tokens = estimated,
                context_window = metadata.context_window,
                model = %metadata.id,
                "prompt may not fit the model context window"
            );
        }

        let request = CompletionRequest::new(vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)])
            .with_temperature(TEMPERATURE)
            .with_required_tool(notes_tool());

        let response = self
            .provider
            .completion(&request)
            .await
            .map_err(PipelineError::Synthesis)?;

        tracing::debug!(
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            tool_calls = response.tool_calls.len(),
            "model responded"
        );

        self.interpret(response, segments)
    }

    fn interpret(&self, response: CompletionResponse, segments: &[ContentSegment]) -> Result<NoteBatch> {
        let invocation = response
            .tool_calls
            .iter()
            .find(|call| call.name == NOTES_TOOL_NAME)
            .or_else(|| response.tool_calls.first());

        match invocation {
            Some(call) => {
                if call.name != NOTES_TOOL_NAME {
                    tracing::warn!(tool = %call.name, "model called an unexpected tool, using its arguments");
                }
                parse_notes(&call.arguments)
            }
            None => self.fall_back(response.content.as_deref(), segments),
        }
    }

    fn fall_back(&self, content: Option<&str>, segments: &[ContentSegment]) -> Result<NoteBatch> {
        match self.fallback {
            FallbackPolicy::Fail => Err(ValidationError::MissingToolCall.into()),
            FallbackPolicy::FreeText => {
                let text = content.map(str::trim).unwrap_or_default();
                let pages: BTreeSet<u32> = segments
                    .iter()
                    .filter(|s| !s.text.trim().is_empty())
                    .flat_map(|s| s.page_numbers.iter().copied())
                    .filter(|&p| p > 0)
                    .collect();

                if text.is_empty() || pages.is_empty() {
                    return Err(ValidationError::MissingToolCall.into());
                }

                tracing::warn!(
                    policy = self.fallback.name(),
                    chars = text.len(),
                    "model returned no tool call, wrapping free-text answer in a single note"
                );
                Ok(NoteBatch {
                    notes: vec![NoteRecord {
                        note: text.to_string(),
                        page_numbers: pages.into_iter().collect(),
                    }],
                    rejected: Vec::new(),
                    origin: NoteOrigin::FreeTextFallback,
                })
            }
        }
    }
}

/// Join segment text, marking page changes with `[Page N]`.
pub fn format_prompt(segments: &[ContentSegment]) -> String {
    let mut prompt = String::new();
    let mut current_page = None;

    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }

        let page = segment.page_numbers.first().copied();
        if page.is_some() && page != current_page {
            if !prompt.is_empty() {
                prompt.push('\n');
            }
            prompt.push_str(&format!("[Page {}]\n", page.unwrap_or_default()));
            current_page = page;
        }

        prompt.push_str(text);
        prompt.push('\n');
    }

    prompt
}

/// Parse tool-call arguments into notes, validating each element alone.
pub fn parse_notes(arguments: &str) -> Result<NoteBatch> {
    let payload: Value = serde_json::from_str(arguments).map_err(ValidationError::MalformedPayload)?;
    let items = payload
        .get("notes")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MissingNotes)?;

    let mut notes = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match validate_record(index, item) {
            Ok(note) => notes.push(note),
            Err(rejection) => {
                tracing::warn!(%rejection, "rejected note");
                rejected.push(rejection);
            }
        }
    }

    Ok(NoteBatch {
        notes,
        rejected,
        origin: NoteOrigin::ToolCall,
    })
}

fn validate_record(index: usize, item: &Value) -> std::result::Result<NoteRecord, ValidationError> {
    check_record(item).map_err(|reason| ValidationError::InvalidRecord { index, reason })
}

fn check_record(item: &Value) -> std::result::Result<NoteRecord, String> {
    let object = item.as_object().ok_or("not an object")?;

    let note = match object.get("note") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => return Err("note is empty".to_string()),
        Some(_) => return Err("note is not a string".to_string()),
        None => return Err("note is missing".to_string()),
    };

    let pages = match object.get("pageNumbers") {
        Some(Value::Array(pages)) if !pages.is_empty() => pages,
        Some(Value::Array(_)) => return Err("pageNumbers is empty".to_string()),
        Some(_) => return Err("pageNumbers is not an array".to_string()),
        None => return Err("pageNumbers is missing".to_string()),
    };

    let mut page_numbers = Vec::with_capacity(pages.len());
    for page in pages {
        match page_number(page) {
            Some(n) => page_numbers.push(n),
            None => return Err(format!("invalid page number {}", page)),
        }
    }

    Ok(NoteRecord { note, page_numbers })
}

/// Positive integer page, accepting integral floats like `3.0`.
fn page_number(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok().filter(|&n| n > 0);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= 1.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelMetadata, ToolChoice, ToolInvocation};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned response and records the request.
    struct ScriptedProvider {
        response: CompletionResponse,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(response: CompletionResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn tool_call(name: &str, arguments: &str) -> Arc<Self> {
            Self::new(CompletionResponse {
                content: None,
                tool_calls: vec![ToolInvocation {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }],
                ..Default::default()
            })
        }

        fn text(content: &str) -> Arc<Self> {
            Self::new(CompletionResponse {
                content: Some(content.to_string()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn metadata(&self) -> ModelMetadata {
            ModelMetadata {
                id: "scripted".to_string(),
                context_window: 8_192,
            }
        }

        async fn completion(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn segments() -> Vec<ContentSegment> {
        vec![
            ContentSegment::new("Attention Is All You Need", vec![1]),
            ContentSegment::new("We propose the Transformer.", vec![1]),
            ContentSegment::new("   ", vec![2]),
            ContentSegment::new("BLEU 28.4 on WMT 2014 En-De.", vec![8]),
        ]
    }

    #[test]
    fn test_format_prompt_marks_pages() {
        let prompt = format_prompt(&segments());

        assert_eq!(
            prompt,
            "[Page 1]\nAttention Is All You Need\nWe propose the Transformer.\n\n[Page 8]\nBLEU 28.4 on WMT 2014 En-De.\n"
        );
    }

    #[test]
    fn test_parse_notes_rejects_individually() {
        let batch = parse_notes(
            r#"{"notes": [
                {"note": "Self-attention replaces recurrence.", "pageNumbers": [1, 2]},
                {"note": "", "pageNumbers": [3]},
                {"note": "Trained on 8 GPUs.", "pageNumbers": []},
                {"note": "Label smoothing 0.1.", "pageNumbers": [7.0]},
                {"pageNumbers": [4]},
                {"note": "Negative page.", "pageNumbers": [-1]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            batch.notes,
            vec![
                NoteRecord {
                    note: "Self-attention replaces recurrence.".to_string(),
                    page_numbers: vec![1, 2],
                },
                NoteRecord {
                    note: "Label smoothing 0.1.".to_string(),
                    page_numbers: vec![7],
                },
            ]
        );
        let rejected: Vec<Option<usize>> = batch.rejected.iter().map(|r| r.record_index()).collect();
        assert_eq!(rejected, vec![Some(1), Some(2), Some(4), Some(5)]);
        assert!(matches!(
            &batch.rejected[0],
            ValidationError::InvalidRecord { index: 1, reason } if reason == "note is empty"
        ));
        assert!(matches!(
            &batch.rejected[1],
            ValidationError::InvalidRecord { index: 2, reason } if reason == "pageNumbers is empty"
        ));
        assert_eq!(batch.rejected[0].to_string(), "note #1: note is empty");
        assert_eq!(batch.origin, NoteOrigin::ToolCall);
    }

    #[test]
    fn test_parse_notes_malformed_payload() {
        let err = parse_notes("{\"notes\": [").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::MalformedPayload(_))
        ));
        assert!(err.to_string().contains("not valid JSON"));

        let err = parse_notes("{\"summary\": \"nope\"}").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ValidationError::MissingNotes)));
    }

    #[test]
    fn test_accepted_notes_round_trip() {
        let batch = parse_notes(
            r#"{"notes": [{"note": "A", "pageNumbers": [1]}, {"note": "B", "pageNumbers": [2, 3]}]}"#,
        )
        .unwrap();

        let reserialized = serde_json::to_string(&json!({ "notes": batch.notes })).unwrap();
        let reparsed = parse_notes(&reserialized).unwrap();

        assert_eq!(reparsed.notes, batch.notes);
        assert!(reparsed.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_uses_arguments_not_name() {
        let provider = ScriptedProvider::tool_call(
            NOTES_TOOL_NAME,
            r#"{"notes": [{"note": "The Transformer uses only attention.", "pageNumbers": [1]}]}"#,
        );
        let synthesizer = NoteSynthesizer::new(provider.clone());

        let batch = synthesizer.synthesize(&segments()).await.unwrap();

        assert_eq!(batch.notes.len(), 1);
        assert_eq!(batch.notes[0].note, "The Transformer uses only attention.");

        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.tool_choice, ToolChoice::Required(NOTES_TOOL_NAME.to_string()));
        assert_eq!(request.tools[0].name, NOTES_TOOL_NAME);
        assert!(request.messages[1].content.contains("[Page 8]"));
    }

    #[tokio::test]
    async fn test_prefers_notes_tool_among_several() {
        let provider = ScriptedProvider::new(CompletionResponse {
            content: None,
            tool_calls: vec![
                ToolInvocation {
                    name: "thinking".to_string(),
                    arguments: "{}".to_string(),
                },
                ToolInvocation {
                    name: NOTES_TOOL_NAME.to_string(),
                    arguments: r#"{"notes": [{"note": "N", "pageNumbers": [2]}]}"#.to_string(),
                },
            ],
            ..Default::default()
        });

        let batch = NoteSynthesizer::new(provider).synthesize(&segments()).await.unwrap();

        assert_eq!(batch.notes[0].page_numbers, vec![2]);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_validation_error() {
        let provider = ScriptedProvider::tool_call(NOTES_TOOL_NAME, "{\"notes\": [{\"note\": ");

        let err = NoteSynthesizer::new(provider)
            .synthesize(&segments())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(ValidationError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn test_empty_segments_skip_the_model() {
        let provider = ScriptedProvider::text("should not be called");
        let synthesizer = NoteSynthesizer::new(provider.clone());

        let batch = synthesizer.synthesize(&[]).await.unwrap();
        assert!(batch.notes.is_empty());
        assert_eq!(batch.origin, NoteOrigin::Empty);

        let blank = vec![ContentSegment::new("  \n", vec![1])];
        assert!(synthesizer.synthesize(&blank).await.unwrap().notes.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_call_fails_by_default() {
        let provider = ScriptedProvider::text("Here are some notes...");

        let err = NoteSynthesizer::new(provider)
            .synthesize(&segments())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(ValidationError::MissingToolCall)));
    }

    #[tokio::test]
    async fn test_free_text_fallback() {
        let provider = ScriptedProvider::text("  The paper introduces the Transformer.  ");

        let batch = NoteSynthesizer::new(provider)
            .with_fallback(FallbackPolicy::FreeText)
            .synthesize(&segments())
            .await
            .unwrap();

        assert_eq!(batch.origin, NoteOrigin::FreeTextFallback);
        // Page 2 only holds blank text, so it is not cited
        assert_eq!(
            batch.notes,
            vec![NoteRecord {
                note: "The paper introduces the Transformer.".to_string(),
                page_numbers: vec![1, 8],
            }]
        );
    }

    #[tokio::test]
    async fn test_free_text_fallback_needs_text() {
        let provider = ScriptedProvider::text("   ");

        let err = NoteSynthesizer::new(provider)
            .with_fallback(FallbackPolicy::FreeText)
            .synthesize(&segments())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(ValidationError::MissingToolCall)));
    }

    #[test]
    fn test_notes_tool_schema() {
        let tool = notes_tool();
        assert!(tool.strict);
        let item = &tool.parameters["properties"]["notes"]["items"];
        assert_eq!(item["required"], json!(["note", "pageNumbers"]));
        assert_eq!(item["properties"]["pageNumbers"]["items"]["type"], "integer");
    }
}

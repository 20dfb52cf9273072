//! services/ingest/src/adapters/questions_llm.rs
//!
//! This module contains the adapter for the question-generating LLM.
//! It implements the `QuestionGenerator` port from the core crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use lesson_review_core::{
    domain::{Difficulty, GeneratedQuestion},
    ports::{PortError, PortResult, QuestionGenerator},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You write multiple-choice review questions for educational videos. \
Use only facts stated in the provided transcript. Every question has exactly four options and \
exactly one correct answer. Respond with a JSON array and nothing else. Each element has the keys \
\"question\", \"options\" (array of 4 strings), \"correct_index\" (0-3), \"explanation\" and \
\"difficulty\" (\"easy\", \"medium\" or \"hard\").";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuestionGenerator` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQuestionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQuestionAdapter {
    /// Creates a new `OpenAiQuestionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "text")]
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default, alias = "correct_option_index", alias = "correctIndex")]
    correct_index: Option<i64>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    difficulty: String,
}

impl RawQuestion {
    fn into_generated(self) -> Result<GeneratedQuestion, String> {
        let index = self.correct_index.ok_or("missing correct_index")?;
        let correct_option_index =
            usize::try_from(index).map_err(|_| format!("negative correct_index {}", index))?;
        Ok(GeneratedQuestion {
            text: self.question,
            options: self.options,
            correct_option_index,
            explanation: self.explanation,
            difficulty: Difficulty::parse(&self.difficulty),
        })
    }
}

/// Items stay untyped until each one is converted on its own.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    List(Vec<Value>),
    Wrapped { questions: Vec<Value> },
}

/// Removes a surrounding markdown code fence, if the model added one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the model's reply into generated questions. Items that do not have the
/// expected shape are skipped one by one; the structural checks on the rest
/// (option count, answer range) are left to the core.
pub fn parse_questions(content: &str) -> PortResult<Vec<GeneratedQuestion>> {
    let raw: RawResponse = serde_json::from_str(strip_code_fence(content)).map_err(|e| {
        PortError::Unexpected(format!("Question LLM returned malformed JSON: {}", e))
    })?;
    let items = match raw {
        RawResponse::List(items) | RawResponse::Wrapped { questions: items } => items,
    };
    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let converted = serde_json::from_value::<RawQuestion>(item)
                .map_err(|e| e.to_string())
                .and_then(RawQuestion::into_generated);
            match converted {
                Ok(question) => Some(question),
                Err(reason) => {
                    warn!(position, %reason, "Skipping malformed generated question");
                    None
                }
            }
        })
        .collect())
}

/// Maps client errors onto port errors, keeping transient failures retryable.
fn classify(error: OpenAIError) -> PortError {
    match error {
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            let code = api.code.as_deref().unwrap_or_default();
            let message = api.message.to_lowercase();
            if kind == "rate_limit_exceeded"
                || code == "rate_limit_exceeded"
                || message.contains("rate limit")
            {
                PortError::RateLimited(api.message)
            } else if kind == "server_error"
                || code == "server_error"
                || message.contains("overloaded")
            {
                PortError::Unavailable(api.message)
            } else {
                PortError::Unexpected(api.message)
            }
        }
        OpenAIError::Reqwest(e) => PortError::Unavailable(e.to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// `QuestionGenerator` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionGenerator for OpenAiQuestionAdapter {
    async fn generate(
        &self,
        title: &str,
        shaped_content: &str,
        category: &str,
        target_count: usize,
    ) -> PortResult<Vec<GeneratedQuestion>> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "Write {} questions about the {} video \"{}\".\n\n{}",
                    target_count, category, title, shaped_content
                ))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(classify)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Question LLM response contained no text content.".to_string())
            })?;

        let mut questions = parse_questions(&content)?;
        if questions.len() > target_count {
            warn!(
                returned = questions.len(),
                target_count, "Question LLM returned more questions than requested"
            );
            questions.truncate(target_count);
        }
        debug!(title, count = questions.len(), "Generated questions");
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    const REPLY: &str = r#"[
        {"question": "What does chlorophyll absorb?", "options": ["Light", "Sound", "Heat", "Salt"],
         "correct_index": 0, "explanation": "It absorbs light.", "difficulty": "easy"},
        {"question": "Which gas is released?", "options": ["Oxygen", "Argon", "Neon", "Radon"],
         "correct_index": 0}
    ]"#;

    fn api_error(message: &str, kind: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: kind.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn parses_a_plain_array() {
        let questions = parse_questions(REPLY).unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "What does chlorophyll absorb?");
        assert_eq!(questions[0].difficulty, Difficulty::Easy);
        assert_eq!(questions[1].difficulty, Difficulty::Medium);
        assert_eq!(questions[1].explanation, "");
    }

    #[test]
    fn parses_fenced_and_wrapped_replies() {
        let fenced = format!("```json\n{}\n```", REPLY);
        assert_eq!(parse_questions(&fenced).unwrap().len(), 2);

        let wrapped = format!("{{\"questions\": {}}}", REPLY);
        assert_eq!(parse_questions(&wrapped).unwrap().len(), 2);
    }

    #[test]
    fn malformed_items_are_skipped_individually() {
        let reply = r#"[
            {"question": "Where does photosynthesis happen?",
             "options": ["Chloroplast", "Nucleus", "Ribosome", "Vacuole"], "correct_index": 0},
            {"question": "Missing answer?", "options": ["A", "B", "C", "D"]},
            {"question": "Negative answer?", "options": ["A", "B", "C", "D"], "correct_index": -1},
            {"question": "Numeric options?", "options": [1, 2, 3, 4], "correct_index": 1},
            "not even an object"
        ]"#;

        let questions = parse_questions(reply).unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Where does photosynthesis happen?");
        assert_eq!(questions[0].correct_option_index, 0);
    }

    #[test]
    fn reply_without_any_usable_item_is_empty() {
        let questions = parse_questions(r#"{"questions": [{"question": "No options"}]}"#).unwrap();
        assert!(questions.is_empty());
    }

    #[test]
    fn malformed_reply_is_an_error() {
        let err = parse_questions("Sure! Here are your questions:").unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limits_and_overloads_are_retryable() {
        let limited = classify(api_error("Rate limit reached", None, Some("rate_limit_exceeded")));
        assert!(matches!(limited, PortError::RateLimited(_)));

        let overloaded = classify(api_error("The engine is currently overloaded", None, None));
        assert!(matches!(overloaded, PortError::Unavailable(_)));

        let bad_request = classify(api_error("Invalid model", Some("invalid_request_error"), None));
        assert!(!bad_request.is_retryable());
    }
}

//! Client for the text-generation backend.
//!
//! The [`TextGenerator`] trait is the seam the engine depends on; the
//! production implementation talks to the Gemini `generateContent` REST
//! API. Abstracting the backend behind a trait keeps the orchestration
//! logic testable against a mock without network access.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Appended to every prompt that must yield machine-readable output.
const JSON_ONLY_INSTRUCTION: &str = "IMPORTANT: Respond with valid JSON only. \
    Do not include any markdown formatting, code blocks, or additional text outside the JSON.";

/// Settings for the Gemini `generateContent` backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub base_url: String,
}

impl GeminiConfig {
    pub const DEFAULT_BASE_URL: &'static str =
        "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: Self::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 1024,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Contract for any service that can turn a prompt into generated text.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait TextGenerator: Send + Sync {
    /// Generates text for `prompt`.
    ///
    /// With `require_json` the backend is instructed to emit pure JSON and
    /// the response is narrowed to a JSON object where possible; if no
    /// parseable object can be isolated the raw text is returned unchanged
    /// and the caller fails on parse.
    async fn generate(&self, prompt: &str, require_json: bool) -> Result<String>;
}

// Response envelope of the generateContent endpoint. Only the fields the
// engine consumes are modeled.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, require_json: bool) -> Result<String> {
        let prompt = if require_json {
            format!("{prompt}\n\n{JSON_ONLY_INSTRUCTION}")
        } else {
            prompt.to_string()
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
            },
        });

        let (text, finish_reason) = self
            .config
            .retry
            .run(|| async {
                let response = self
                    .client
                    .post(&url)
                    .timeout(self.config.request_timeout)
                    .query(&[("key", self.config.api_key.as_str())])
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
                let payload: GenerateResponse = response.json().await?;

                let candidate = payload
                    .candidates
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::Transport("no candidates in generation response".into()))?;
                let text = candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>();
                Ok::<_, Error>((text.trim().to_string(), candidate.finish_reason))
            })
            .await?;

        // Truncation is not fatal here, but a truncated JSON payload will
        // fail to parse downstream.
        if let Some(reason) = finish_reason.as_deref().filter(|r| *r != "STOP") {
            if reason == "MAX_TOKENS" {
                tracing::warn!(
                    max_output_tokens = self.config.max_output_tokens,
                    "generation output was truncated"
                );
            } else {
                tracing::warn!(finish_reason = reason, "generation finished abnormally");
            }
        }

        if require_json {
            Ok(extract_json(&text))
        } else {
            Ok(text)
        }
    }
}

/// Narrows a free-form model response down to a JSON object.
///
/// Tries, in order: the first balanced-brace substring that strictly
/// parses; the text with markdown code fences stripped; the raw text
/// unchanged (leaving the parse failure to the caller).
pub fn extract_json(text: &str) -> String {
    if let Some(object) = first_balanced_object(text) {
        if serde_json::from_str::<Value>(object).is_ok() {
            return object.to_string();
        }
    }

    let stripped = text
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();
    if serde_json::from_str::<Value>(&stripped).is_ok() {
        return stripped;
    }

    text.to_string()
}

/// Returns the first `{`-to-matching-`}` substring, honoring string
/// literals and escapes so braces inside JSON strings do not miscount.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let text = r#"Here is my evaluation: {"score": 8.0, "followup_intent": "deepen"} I hope it helps."#;
        assert_eq!(
            extract_json(text),
            r#"{"score": 8.0, "followup_intent": "deepen"}"#
        );
    }

    #[test]
    fn extracts_object_from_markdown_code_fence() {
        let text = "```json\n{\"score\": 7.5,\n \"strengths\": []}\n```";
        assert_eq!(extract_json(text), "{\"score\": 7.5,\n \"strengths\": []}");
    }

    #[test]
    fn returns_raw_text_when_no_json_is_present() {
        let text = "The candidate did quite well overall.";
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn nested_objects_are_kept_whole() {
        let text = r#"{"outer": {"inner": [1, 2]}, "tail": true} trailing words"#;
        assert_eq!(
            extract_json(text),
            r#"{"outer": {"inner": [1, 2]}, "tail": true}"#
        );
    }

    #[test]
    fn braces_inside_string_values_do_not_miscount() {
        let text = r#"note: {"summary": "used {braces} and \"quotes\" literally"} done"#;
        assert_eq!(
            extract_json(text),
            r#"{"summary": "used {braces} and \"quotes\" literally"}"#
        );
    }

    #[test]
    fn unbalanced_braces_fall_through_to_raw_text() {
        let text = r#"{"score": 8.0, "strengths": ["partial"#;
        assert_eq!(extract_json(text), text);
    }

    // Live call against the real Gemini API; run with `cargo test -- --ignored`
    // and GEMINI_API_KEY set.
    #[tokio::test]
    #[ignore]
    async fn generate_against_live_backend() {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY not set");
        let client = GeminiClient::new(GeminiConfig::new(api_key));

        let text = client
            .generate("Reply with the single word: ready", false)
            .await
            .expect("generation should succeed");
        assert!(!text.is_empty());
    }
}

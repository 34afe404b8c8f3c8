//! LLM collaborator behind the chat capability.

use crate::context::Document;
use crate::ChatError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You are the assistant of a face recognition platform. \
Answer the question using only the context below. \
If the context does not contain the answer, say so.";

/// Answers a question given retrieved context. Stateless and best-effort.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, question: &str, context: &[&Document]) -> Result<String, ChatError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponderConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiResponder {
    config: ResponderConfig,
    client: reqwest::Client,
}

impl OpenAiResponder {
    pub fn new(config: ResponderConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }
}

/// Render retrieved documents into the prompt's context block.
pub fn render_context(context: &[&Document]) -> String {
    context
        .iter()
        .map(|doc| doc.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn respond(&self, question: &str, context: &[&Document]) -> Result<String, ChatError> {
        let api_key = self.config.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;

        let request = CompletionRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: vec![
                Message {
                    role: "system".into(),
                    content: format!("{SYSTEM_PROMPT}\n\nContext:\n{}", render_context(context)),
                },
                Message {
                    role: "user".into(),
                    content: question.to_string(),
                },
            ],
        };

        tracing::debug!(model = %self.config.model, documents = context.len(), "requesting completion");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ChatError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DocumentKind;

    #[test]
    fn test_endpoint_joins_base() {
        let responder = OpenAiResponder::new(ResponderConfig {
            api_base: "http://localhost:11434/v1/".into(),
            ..ResponderConfig::default()
        })
        .unwrap();
        assert_eq!(responder.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_render_context_separates_documents() {
        let a = Document {
            kind: DocumentKind::Registration,
            text: "Person: Alice".into(),
            person_id: None,
            person_name: None,
            timestamp: None,
        };
        let b = Document {
            text: "Person: Bob".into(),
            ..a.clone()
        };
        assert_eq!(render_context(&[&a, &b]), "Person: Alice\n\nPerson: Bob");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let responder = OpenAiResponder::new(ResponderConfig::default()).unwrap();
        let err = responder.respond("hello", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::MissingApiKey));
    }

    #[test]
    fn test_completion_response_parsing() {
        let parsed: CompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":" Alice. "}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content, " Alice. ");
    }
}

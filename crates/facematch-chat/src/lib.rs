//! facematch-chat: question answering over the platform's registrations,
//! recognition events and statistics.
//!
//! Each request is self-contained: the caller's context snapshot is turned
//! into documents, the most relevant ones are retrieved lexically, and a
//! [`Responder`] produces the answer. Questions that registration metadata
//! settles exactly are answered without the responder.

pub mod answer;
pub mod context;
pub mod responder;
pub mod retriever;

pub use context::{ChatContext, Document, DocumentKind};
pub use responder::{OpenAiResponder, Responder, ResponderConfig};
pub use retriever::{Retriever, DEFAULT_TOP_K};

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const KNOWLEDGE_BASE_UNAVAILABLE: &str =
    "I'm sorry, but the knowledge base is not available right now. Please try again later.";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("No message provided")]
    EmptyMessage,
    #[error("no API key configured for the chat responder")]
    MissingApiKey,
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion API returned no answer")]
    EmptyCompletion,
}

/// `{message, context}` as sent by the platform.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// Parsed leniently: a malformed context behaves like an empty one.
    #[serde(default)]
    pub context: serde_json::Value,
}

/// `{answer, timestamp, status}` on success, `{error, timestamp, status}` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
    pub status: &'static str,
}

impl ChatReply {
    pub fn success(answer: String) -> Self {
        Self {
            answer: Some(answer),
            error: None,
            timestamp: Local::now().to_rfc3339(),
            status: "success",
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            answer: None,
            error: Some(error.to_string()),
            timestamp: Local::now().to_rfc3339(),
            status: "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            chunk_size: context::DEFAULT_CHUNK_SIZE,
            chunk_overlap: context::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Stateless chat service; cheap to clone and share across requests.
#[derive(Clone)]
pub struct ChatEngine {
    responder: Arc<dyn Responder>,
    settings: ChatSettings,
}

impl ChatEngine {
    pub fn new(responder: Arc<dyn Responder>, settings: ChatSettings) -> Self {
        Self { responder, settings }
    }

    /// Answer one request. Only an empty message is an error; everything
    /// downstream degrades to an apologetic answer.
    pub async fn answer(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let question = request.message.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let context = parse_context(&request.context);
        let now = Local::now();
        let documents = context::split_documents(
            context::build_documents(&context, &now),
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        );
        tracing::info!(documents = documents.len(), "knowledge base built");

        if documents.is_empty() {
            tracing::warn!("no documents in chat context");
            return Ok(ChatReply::success(KNOWLEDGE_BASE_UNAVAILABLE.to_string()));
        }

        if let Some(answer) = answer::enhance(question, &documents, &now) {
            tracing::debug!("answered from registration metadata");
            return Ok(ChatReply::success(answer));
        }

        let retriever = Retriever::new(documents);
        let relevant = retriever.top_k(question, self.settings.top_k);

        let answer = match self.responder.respond(question, &relevant).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "chat responder failed");
                format!("I encountered an error while processing your question: {e}")
            }
        };
        Ok(ChatReply::success(answer))
    }
}

fn parse_context(value: &serde_json::Value) -> ChatContext {
    if value.is_null() {
        return ChatContext::default();
    }
    match serde_json::from_value(value.clone()) {
        Ok(context) => context,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed chat context");
            ChatContext::default()
        }
    }
}

//! Capability seams the workflow depends on.
//!
//! The engine never talks to an `LlmProvider` directly. Triage goes through a
//! [`Classifier`], drafting and preference rewriting through a [`Generator`].
//! Both are injected as `Arc<dyn ...>` so tests can script them.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, ToolDefinition};

/// Everything the classifier sees about an incoming item.
#[derive(Debug, Clone)]
pub struct ClassificationInput {
    /// Fixed background about the operator.
    pub background: String,
    /// Adaptive triage instructions from preference memory.
    pub instructions: String,
    pub sender: String,
    pub recipients: String,
    pub subject: String,
    pub thread_text: String,
}

/// Produces exactly one triage label for an item.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns the raw label. Validation into a `Classification` happens in
    /// the router so malformed labels surface as workflow errors.
    async fn classify(&self, input: &ClassificationInput) -> Result<String, LlmError>;
}

/// One drafting turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Produces assistant turns and structured rewrites.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns one assistant turn carrying text and zero or more tool calls.
    async fn generate(&self, request: GenerationRequest) -> Result<ChatMessage, LlmError>;

    /// Answers with a single JSON object.
    async fn structured(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, LlmError>;
}

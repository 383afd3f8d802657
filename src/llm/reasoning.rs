//! Reasoning layer: LLM-backed classifier and generator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::capability::{ClassificationInput, Classifier, GenerationRequest, Generator};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, ToolCompletionRequest};
use crate::prompts;

/// Wraps an `LlmProvider` and implements both capabilities on top of it.
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn invalid(&self, reason: impl Into<String>) -> LlmError {
        LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Classifier for Reasoning {
    async fn classify(&self, input: &ClassificationInput) -> Result<String, LlmError> {
        let messages = vec![
            ChatMessage::system(prompts::triage_system_prompt(
                &input.background,
                &input.instructions,
            )),
            ChatMessage::user(prompts::triage_user_prompt(
                &input.sender,
                &input.recipients,
                &input.subject,
                &input.thread_text,
            )),
        ];
        let request = CompletionRequest::new(messages)
            .with_temperature(self.temperature)
            .with_json_mode();
        let response = self.llm.complete(request).await?;

        let value = extract_json_object(&response.content)
            .ok_or_else(|| self.invalid("classifier did not return a JSON object"))?;
        let label = value
            .get("classification")
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.invalid("classifier output has no classification field"))?;

        if let Some(reasoning) = value.get("reasoning").and_then(|v| v.as_str()) {
            tracing::debug!(label, reasoning, "Classifier reasoning");
        }
        Ok(label.to_string())
    }
}

#[async_trait]
impl Generator for Reasoning {
    async fn generate(&self, request: GenerationRequest) -> Result<ChatMessage, LlmError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(request.system));
        messages.extend(request.messages);

        if request.tools.is_empty() {
            let completion =
                CompletionRequest::new(messages).with_temperature(self.temperature);
            let response = self.llm.complete(completion).await?;
            return Ok(ChatMessage::assistant(response.content));
        }

        let completion =
            ToolCompletionRequest::new(messages, request.tools).with_temperature(self.temperature);
        let response = self.llm.complete_with_tools(completion).await?;

        tracing::debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            tool_calls = response.tool_calls.len(),
            "Generator turn complete"
        );

        if response.tool_calls.is_empty() {
            Ok(ChatMessage::assistant(response.content.unwrap_or_default()))
        } else {
            Ok(ChatMessage::assistant_with_tool_calls(
                response.content,
                response.tool_calls,
            ))
        }
    }

    async fn structured(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<serde_json::Value, LlmError> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(ChatMessage::system(system));
        all.extend_from_slice(messages);

        let request = CompletionRequest::new(all)
            .with_temperature(self.temperature)
            .with_json_mode();
        let response = self.llm.complete(request).await?;

        extract_json_object(&response.content)
            .ok_or_else(|| self.invalid("structured output was not a JSON object"))
    }
}

/// Pull the first JSON object out of model output.
///
/// Accepts a bare object, a fenced ```json block, or an object embedded in
/// surrounding prose.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        _ => None,
    }
}

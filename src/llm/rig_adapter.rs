//! Bridges any rig `CompletionModel` to mailgate's [`LlmProvider`].

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::{
    AssistantContent, CompletionError, CompletionModel, Message, ToolDefinition as RigTool,
};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

/// Wraps a rig completion model and speaks mailgate's message types.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        tools: Vec<RigTool>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        additional_params: Option<serde_json::Value>,
    ) -> Result<(Option<String>, Vec<ToolCall>, u32, u32), LlmError> {
        let (preamble, mut history) = to_rig_messages(messages);
        let prompt = history.pop().ok_or_else(|| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: "conversation has no messages to send".to_string(),
        })?;

        let mut builder = self
            .model
            .completion_request(prompt)
            .messages(history)
            .tools(tools)
            .temperature_opt(temperature.map(f64::from))
            .max_tokens_opt(max_tokens.map(u64::from))
            .additional_params_opt(additional_params);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }

        let response = self
            .model
            .completion(builder.build())
            .await
            .map_err(|e| self.request_failed(e))?;

        let (content, tool_calls) = split_choice(response.choice);
        Ok((
            content,
            tool_calls,
            saturate(response.usage.input_tokens),
            saturate(response.usage.output_tokens),
        ))
    }

    fn request_failed(&self, error: CompletionError) -> LlmError {
        LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let params = request
            .json_mode
            .then(|| serde_json::json!({"response_format": {"type": "json_object"}}));
        let (content, _, input_tokens, output_tokens) = self
            .send(
                &request.messages,
                Vec::new(),
                request.temperature,
                request.max_tokens,
                params,
            )
            .await?;

        Ok(CompletionResponse {
            content: content.unwrap_or_default(),
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let params = (!request.tools.is_empty())
            .then(|| serde_json::json!({"parallel_tool_calls": request.parallel_tool_calls}));
        let tools: Vec<RigTool> = request.tools.iter().map(to_rig_tool).collect();

        tracing::debug!(
            model = %self.model_name,
            tools = tools.len(),
            messages = request.messages.len(),
            "Sending tool completion request"
        );

        let (content, tool_calls, input_tokens, output_tokens) = self
            .send(
                &request.messages,
                tools,
                request.temperature,
                request.max_tokens,
                params,
            )
            .await?;

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolUse
        };
        Ok(ToolCompletionResponse {
            content,
            tool_calls,
            input_tokens,
            output_tokens,
            finish_reason,
        })
    }
}

/// System turns are folded into the preamble; everything else keeps its order.
fn to_rig_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Message>) {
    let mut system = Vec::new();
    let mut converted = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => system.push(msg.content.as_str()),
            Role::User => converted.push(Message::user(msg.content.clone())),
            Role::Assistant => converted.push(assistant_message(msg)),
            Role::Tool => converted.push(Message::tool_result(
                msg.tool_call_id.clone().unwrap_or_default(),
                msg.content.clone(),
            )),
        }
    }

    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));
    (preamble, converted)
}

fn assistant_message(msg: &ChatMessage) -> Message {
    let mut calls = msg
        .tool_calls
        .iter()
        .map(|call| AssistantContent::tool_call(&call.id, &call.name, call.arguments.clone()));

    let Some(first_call) = calls.next() else {
        return Message::assistant(msg.content.clone());
    };

    let mut content = if msg.content.is_empty() {
        OneOrMany::one(first_call)
    } else {
        let mut content = OneOrMany::one(AssistantContent::text(msg.content.clone()));
        content.push(first_call);
        content
    };
    for call in calls {
        content.push(call);
    }

    Message::Assistant { id: None, content }
}

fn to_rig_tool(def: &ToolDefinition) -> RigTool {
    RigTool {
        name: def.name.clone(),
        description: def.description.clone(),
        parameters: def.parameters.clone(),
    }
}

fn split_choice(choice: OneOrMany<AssistantContent>) -> (Option<String>, Vec<ToolCall>) {
    let mut text: Option<String> = None;
    let mut tool_calls = Vec::new();

    for part in choice {
        match part {
            AssistantContent::Text(t) => match text.as_mut() {
                Some(existing) => existing.push_str(&t.text),
                None => text = Some(t.text),
            },
            AssistantContent::ToolCall(call) => tool_calls.push(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }),
            _ => {}
        }
    }

    (text, tool_calls)
}

fn saturate(tokens: u64) -> u32 {
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

//! The drafting loop: ask the generator for the next step, then route it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, WorkflowError};
use crate::llm::{GenerationRequest, Generator};
use crate::memory::{PreferenceKey, PreferenceMemory};
use crate::prompts::{self, DEFAULT_BACKGROUND, DEFAULT_RESPONSE_PREFERENCES};
use crate::tools::ToolRegistry;
use crate::tools::builtin::{DONE_TOOL_NAME, SEND_EMAIL_TOOL_NAME};
use crate::workflow::Node;
use crate::workflow::circuit::CircuitBreaker;
use crate::workflow::state::ConversationState;

pub struct ResponseAgentLoop {
    generator: Arc<dyn Generator>,
    registry: Arc<ToolRegistry>,
    memory: Arc<PreferenceMemory>,
    breaker: CircuitBreaker,
}

impl ResponseAgentLoop {
    pub fn new(
        generator: Arc<dyn Generator>,
        registry: Arc<ToolRegistry>,
        memory: Arc<PreferenceMemory>,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            generator,
            registry,
            memory,
            breaker,
        }
    }

    /// Produce and record the next assistant turn.
    pub async fn call(&self, state: &mut ConversationState) -> Result<()> {
        let response_preferences = self
            .memory
            .get(PreferenceKey::Response, DEFAULT_RESPONSE_PREFERENCES)
            .await?;
        let background = self
            .memory
            .get(PreferenceKey::Background, DEFAULT_BACKGROUND)
            .await?;

        let offer = self.breaker.offer(state, &self.registry).await;
        let system = prompts::agent_system_prompt(
            &offer.tools_prompt,
            &background,
            &response_preferences,
            SEND_EMAIL_TOOL_NAME,
            DONE_TOOL_NAME,
        );

        let mut turn = self
            .generator
            .generate(GenerationRequest {
                system,
                messages: state.messages.clone(),
                tools: offer.tools.clone(),
            })
            .await?;

        if turn.tool_calls.len() > 1 {
            warn!(
                conversation = %state.id,
                requested = turn.tool_calls.len(),
                "Generator returned several tool calls, keeping the first"
            );
            turn.tool_calls.truncate(1);
        }

        if let Some(call) = turn.tool_calls.first()
            && !offer.contains(&call.name)
        {
            if !self.registry.has(&call.name).await {
                warn!(
                    conversation = %state.id,
                    tool = %call.name,
                    "Generator requested an unknown tool"
                );
                return Err(WorkflowError::UnknownTool(call.name.clone()).into());
            }
            // Registered but held back by the breaker: record the turn without it.
            warn!(
                conversation = %state.id,
                tool = %call.name,
                breaker_engaged = offer.engaged,
                "Suppressing tool call outside the offered set"
            );
            turn.tool_calls.clear();
        }

        match turn.tool_calls.first() {
            Some(call) => info!(conversation = %state.id, tool = %call.name, "Generator chose tool"),
            None => debug!(conversation = %state.id, "Generator answered without a tool"),
        }

        state.push(turn);
        Ok(())
    }

    /// `Terminal` when nothing is left to dispatch, otherwise `Dispatch`.
    pub fn route(state: &ConversationState) -> Node {
        match state.pending_calls().first() {
            None => Node::Terminal,
            Some(call) if call.name == DONE_TOOL_NAME => Node::Terminal,
            Some(_) => Node::Dispatch { call_index: 0 },
        }
    }
}

//! Bounds the drafting loop by the number of recorded tool invocations.

use crate::llm::ToolDefinition;
use crate::prompts;
use crate::tools::ToolRegistry;
use crate::tools::builtin::SEND_EMAIL_TOOL_NAME;
use crate::tools::tool::ToolKind;
use crate::workflow::state::ConversationState;

/// Tools and catalogue text for one generator call.
#[derive(Debug, Clone)]
pub struct ToolOffer {
    pub tools: Vec<ToolDefinition>,
    pub tools_prompt: String,
    pub engaged: bool,
}

impl ToolOffer {
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreaker {
    ceiling: usize,
}

impl CircuitBreaker {
    pub fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    pub fn is_engaged(&self, tool_calls: usize) -> bool {
        tool_calls >= self.ceiling
    }

    /// Once engaged only the send tool is offered, with the final-answer prompt.
    pub async fn offer(&self, state: &ConversationState, registry: &ToolRegistry) -> ToolOffer {
        let count = state.tool_call_count();
        if self.is_engaged(count) {
            tracing::info!(
                conversation = %state.id,
                tool_calls = count,
                ceiling = self.ceiling,
                "Tool-call ceiling reached, offering send only"
            );
            return ToolOffer {
                tools: registry.tool_definitions_for_kind(ToolKind::Send).await,
                tools_prompt: prompts::final_answer_prompt(SEND_EMAIL_TOOL_NAME),
                engaged: true,
            };
        }

        let tools = registry.tool_definitions().await;
        ToolOffer {
            tools_prompt: prompts::tool_catalogue(&tools),
            tools,
            engaged: false,
        }
    }
}

use std::time::Instant;

use async_trait::async_trait;

use crate::tools::builtin::QUESTION_TOOL_NAME;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolKind, ToolOutput, require_str};

/// Asks the reviewer a question the assistant cannot answer alone.
///
/// Always reviewed; the reviewer's response becomes the tool result.
pub struct QuestionTool;

#[async_trait]
impl Tool for QuestionTool {
    fn name(&self) -> &str {
        QUESTION_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Ask the user a follow-up question when the email asks something you have no \
         context for."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The question to ask the user"
                }
            },
            "required": ["content"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Question
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let content = require_str(&params, "content")?;
        Ok(ToolOutput::text(
            format!("Question for the user: {content}"),
            start.elapsed(),
        ))
    }
}

use std::time::Instant;

use async_trait::async_trait;

use crate::tools::builtin::DONE_TOOL_NAME;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolKind, ToolOutput};

/// Signals that the item has been handled.
pub struct DoneTool;

#[async_trait]
impl Tool for DoneTool {
    fn name(&self) -> &str {
        DONE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Indicate that the email has been handled and a reply has been sent. \
         Call this after send_email succeeds."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "done": {
                    "type": "boolean",
                    "description": "Always true"
                }
            }
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Completion
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        Ok(ToolOutput::text(
            format!("Email {} handled.", ctx.source.id),
            start.elapsed(),
        ))
    }
}

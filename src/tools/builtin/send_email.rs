use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::channels::{Mailbox, OutgoingReply};
use crate::tools::builtin::SEND_EMAIL_TOOL_NAME;
use crate::tools::tool::{
    Tool, ToolContext, ToolError, ToolKind, ToolOutput, optional_str_list, require_str,
};

/// Sends the drafted reply through the mailbox.
///
/// Always reviewed, and the only tool offered once the tool-call ceiling is
/// reached.
pub struct SendEmailTool {
    mailbox: Arc<dyn Mailbox>,
}

impl SendEmailTool {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }
}

/// Prefix a subject with `Re:` unless it already carries one.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed
        .get(..3)
        .is_some_and(|p| p.eq_ignore_ascii_case("re:"))
    {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        SEND_EMAIL_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Send a reply to the email. Use this for the final answer, or to ask the \
         sender for more information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email_id": {
                    "type": "string",
                    "description": "Id of the email being answered"
                },
                "response_text": {
                    "type": "string",
                    "description": "Body of the reply"
                },
                "email_address": {
                    "type": "string",
                    "description": "Address to send the reply to"
                },
                "additional_recipients": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional extra recipients to copy"
                }
            },
            "required": ["email_id", "response_text", "email_address"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Send
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let email_id = require_str(&params, "email_id")?;
        let body = require_str(&params, "response_text")?;
        let to = require_str(&params, "email_address")?;
        let cc = optional_str_list(&params, "additional_recipients");

        if email_id != ctx.source.id {
            tracing::warn!(
                requested = %email_id,
                source = %ctx.source.id,
                "send_email called with an id other than the source item"
            );
        }

        let reply = OutgoingReply {
            to: to.to_string(),
            cc,
            subject: reply_subject(&ctx.source.subject),
            body: body.to_string(),
            in_reply_to: ctx.source.thread_id.clone(),
        };

        self.mailbox
            .send_reply(reply)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        tracing::info!(to = %to, conversation = %ctx.conversation_id, "Reply sent");
        Ok(ToolOutput::text(format!("Email sent to {to}"), start.elapsed()))
    }
}

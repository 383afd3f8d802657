//! Reviewer-facing types: suspension requests, decisions and checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::llm::ToolCall;
use crate::tools::builtin::{QUESTION_TOOL_NAME, SEND_EMAIL_TOOL_NAME};
use crate::workflow::state::ConversationState;

/// A reviewer's answer to a suspension. Consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    Accept,
    Edit { arguments: serde_json::Value },
    Respond { feedback: String },
    Ignore,
}

impl ReviewDecision {
    /// Parse a resumption value.
    ///
    /// Accepted shapes:
    /// `{"type":"accept"}`, `{"type":"edit","args":{"args":{..}}}` or
    /// `{"type":"edit","arguments":{..}}`, `{"type":"response","args":"text"}` or
    /// `{"type":"response","feedback":"text"}`, `{"type":"ignore"}`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, WorkflowError> {
        let invalid = |reason: &str| WorkflowError::InvalidReviewDecision(format!("{reason}: {value}"));

        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("missing type"))?;

        match kind {
            "accept" => Ok(Self::Accept),
            "ignore" => Ok(Self::Ignore),
            "edit" => {
                let arguments = value
                    .get("args")
                    .and_then(|a| a.get("args"))
                    .or_else(|| value.get("arguments"))
                    .filter(|a| a.is_object())
                    .cloned()
                    .ok_or_else(|| invalid("edit without an argument object"))?;
                Ok(Self::Edit { arguments })
            }
            "response" => {
                let feedback = value
                    .get("args")
                    .and_then(|a| a.as_str())
                    .or_else(|| value.get("feedback").and_then(|f| f.as_str()))
                    .ok_or_else(|| invalid("response without feedback text"))?;
                Ok(Self::Respond {
                    feedback: feedback.to_string(),
                })
            }
            _ => Err(invalid("unknown type")),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Edit { .. } => "edit",
            Self::Respond { .. } => "response",
            Self::Ignore => "ignore",
        }
    }
}

/// Which decisions a suspension permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMatrix {
    pub allow_ignore: bool,
    pub allow_respond: bool,
    pub allow_edit: bool,
    pub allow_accept: bool,
}

impl CapabilityMatrix {
    pub const ALL: Self = Self {
        allow_ignore: true,
        allow_respond: true,
        allow_edit: true,
        allow_accept: true,
    };

    pub const IGNORE_OR_RESPOND: Self = Self {
        allow_ignore: true,
        allow_respond: true,
        allow_edit: false,
        allow_accept: false,
    };

    pub fn permits(&self, decision: &ReviewDecision) -> bool {
        match decision {
            ReviewDecision::Accept => self.allow_accept,
            ReviewDecision::Edit { .. } => self.allow_edit,
            ReviewDecision::Respond { .. } => self.allow_respond,
            ReviewDecision::Ignore => self.allow_ignore,
        }
    }

    pub fn check(&self, decision: &ReviewDecision) -> Result<(), WorkflowError> {
        if self.permits(decision) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidReviewDecision(format!(
                "{} is not permitted here",
                decision.label()
            )))
        }
    }
}

/// What the reviewer is shown at a suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub action: String,
    pub args: serde_json::Value,
    pub config: CapabilityMatrix,
    pub description: String,
}

/// Where a suspended conversation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gate {
    Triage,
    ToolReview { call_index: usize },
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::ToolReview { .. } => "tool_review",
        }
    }
}

/// Serializable continuation persisted at every suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub conversation_id: Uuid,
    pub gate: Gate,
    pub state: ConversationState,
    pub request: ReviewRequest,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: ConversationState, gate: Gate, request: ReviewRequest) -> Self {
        Self {
            conversation_id: state.id,
            gate,
            state,
            request,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> PendingReview {
        PendingReview {
            conversation_id: self.conversation_id,
            source_id: self.state.source.id.clone(),
            subject: self.state.source.subject.clone(),
            gate: self.gate,
            request: self.request.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public view of an open suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub conversation_id: Uuid,
    pub source_id: String,
    pub subject: String,
    pub gate: Gate,
    pub request: ReviewRequest,
    pub created_at: DateTime<Utc>,
}

/// Render a tool invocation for the reviewer.
pub fn render_tool_call(call: &ToolCall) -> String {
    let args = &call.arguments;
    let text = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or_default();

    match call.name.as_str() {
        SEND_EMAIL_TOOL_NAME => {
            let mut out = format!("# Email Draft\n\n**To**: {}\n", text("email_address"));
            if let Some(extra) = args.get("additional_recipients").and_then(|v| v.as_array())
                && !extra.is_empty()
            {
                let list: Vec<&str> = extra.iter().filter_map(|v| v.as_str()).collect();
                out.push_str(&format!("**Cc**: {}\n", list.join(", ")));
            }
            out.push_str(&format!("\n{}\n", text("response_text")));
            out
        }
        QUESTION_TOOL_NAME => format!("# Question for User\n\n{}\n", text("content")),
        _ => {
            let pretty = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
            format!("# Tool Call: {}\n\nArguments:\n```json\n{pretty}\n```\n", call.name)
        }
    }
}

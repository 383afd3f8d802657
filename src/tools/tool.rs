//! Tool trait and shared helpers.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

pub use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::workflow::review::CapabilityMatrix;
use crate::workflow::state::SourceItem;

/// How the workflow treats a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Executes immediately without review.
    Auto,
    /// Signals that the item is handled; routes to the terminal sink.
    Completion,
    /// Sends the reply. Reviewed, and the only tool offered once the
    /// circuit breaker engages.
    Send,
    /// Asks the reviewer a question. Reviewed.
    Question,
    /// Asks the reviewer for missing parameters. Reviewed.
    Clarification,
}

impl ToolKind {
    pub fn requires_review(&self) -> bool {
        self.review_matrix().is_some()
    }

    /// Decisions a reviewer may take on this kind, or `None` if unreviewed.
    pub fn review_matrix(&self) -> Option<CapabilityMatrix> {
        match self {
            Self::Send | Self::Clarification => Some(CapabilityMatrix::ALL),
            Self::Question => Some(CapabilityMatrix::IGNORE_OR_RESPOND),
            Self::Auto | Self::Completion => None,
        }
    }
}

/// Per-invocation context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation_id: Uuid,
    pub source: SourceItem,
}

/// Result text of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            duration,
        }
    }
}

/// A capability the generator can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    fn kind(&self) -> ToolKind {
        ToolKind::Auto
    }

    /// Upper bound on a single execution.
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Fetch a required string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing string parameter '{key}'")))
}

/// Fetch an optional list of strings; a single string is accepted as one entry.
pub fn optional_str_list(params: &serde_json::Value, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

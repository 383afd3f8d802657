//! Error types for mailgate.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to fetch: {reason}")]
    FetchFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to mark {id} as read on channel {name}: {reason}")]
    MarkFailed {
        name: String,
        id: String,
        reason: String,
    },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Workflow protocol errors. All of these abort the conversation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Classifier returned an invalid label: {0:?}")]
    InvalidClassification(String),

    #[error("Invalid review decision: {0}")]
    InvalidReviewDecision(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {0} does not support edited arguments")]
    UnsupportedEdit(String),

    #[error("Conversation {0} is already classified")]
    ClassificationAlreadySet(Uuid),

    #[error("No pending review for conversation {0}")]
    NoPendingReview(Uuid),

    #[error("Conversation {0} has no pending tool invocation")]
    NoPendingInvocation(Uuid),

    #[error("Source item {0} already has a workflow")]
    ItemAlreadyTracked(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

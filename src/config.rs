//! Configuration types.
//!
//! Everything is read from environment variables; every field has a default
//! except the LLM API key.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Identifiers that never correspond to a real mailbox item.
pub const DEFAULT_SYNTHETIC_PREFIXES: &[&str] = &["test-", "langsmith-", "mock-", "debug-"];

/// Workflow engine configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Display name used in reviewer action labels.
    pub assistant_name: String,
    /// Namespace scope for preference records.
    pub preference_scope: String,
    /// Number of recorded tool invocations after which only the send tool is offered.
    pub tool_call_ceiling: usize,
    /// Source ids starting with any of these skip the mark-as-read side effect.
    pub synthetic_prefixes: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Mail Assistant".to_string(),
            preference_scope: "mail_assistant".to_string(),
            tool_call_ceiling: 2,
            synthetic_prefixes: DEFAULT_SYNTHETIC_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl WorkflowConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tool_call_ceiling = match std::env::var("MAILGATE_TOOL_CALL_CEILING") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "MAILGATE_TOOL_CALL_CEILING".into(),
                message: format!("{e}"),
            })?,
            Err(_) => defaults.tool_call_ceiling,
        };

        let synthetic_prefixes = std::env::var("MAILGATE_SYNTHETIC_PREFIXES")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.synthetic_prefixes);

        Ok(Self {
            assistant_name: std::env::var("MAILGATE_ASSISTANT_NAME")
                .unwrap_or(defaults.assistant_name),
            preference_scope: std::env::var("MAILGATE_PREFERENCE_SCOPE")
                .unwrap_or(defaults.preference_scope),
            tool_call_ceiling,
            synthetic_prefixes,
        })
    }
}

/// Process-level settings for the daemon binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub http_port: u16,
    pub log_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("MAILGATE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/mailgate.db")),
            http_port: std::env::var("MAILGATE_HTTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            log_dir: std::env::var("MAILGATE_LOG_DIR").ok().map(PathBuf::from),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

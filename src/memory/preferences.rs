//! Preference memory: free-text policy records that reviewer feedback rewrites.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{LlmError, Result};
use crate::llm::{ChatMessage, Generator};
use crate::prompts::MEMORY_UPDATE_INSTRUCTIONS;
use crate::store::Database;

/// The records kept per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceKey {
    Triage,
    Response,
    Background,
}

impl PreferenceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Response => "response",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output of a preference rewrite.
#[derive(Debug, Deserialize)]
struct PreferenceUpdate {
    chain_of_thought: String,
    user_preferences: String,
}

/// Reads and rewrites preference records under one scope.
pub struct PreferenceMemory {
    db: Arc<dyn Database>,
    generator: Arc<dyn Generator>,
    scope: String,
}

impl PreferenceMemory {
    pub fn new(db: Arc<dyn Database>, generator: Arc<dyn Generator>, scope: impl Into<String>) -> Self {
        Self {
            db,
            generator,
            scope: scope.into(),
        }
    }

    /// Stored value, or `default` after seeding it.
    pub async fn get(&self, key: PreferenceKey, default: &str) -> Result<String> {
        let value = self
            .db
            .get_or_seed_preference(&self.scope, key.as_str(), default)
            .await?;
        Ok(value)
    }

    /// Fold a feedback transcript into the stored record.
    pub async fn update(&self, key: PreferenceKey, feedback: Vec<ChatMessage>) -> Result<()> {
        let current = self
            .db
            .get_or_seed_preference(&self.scope, key.as_str(), "")
            .await?;

        let system = format!(
            "{MEMORY_UPDATE_INSTRUCTIONS}\n\n\
             # Current Profile ({}/{})\n\
             <user_preferences>\n{current}\n</user_preferences>",
            self.scope, key
        );

        let raw = self.generator.structured(&system, &feedback).await?;
        let update: PreferenceUpdate =
            serde_json::from_value(raw).map_err(|e| LlmError::InvalidResponse {
                provider: "generator".to_string(),
                reason: format!("preference update did not match schema: {e}"),
            })?;

        tracing::debug!(
            scope = %self.scope,
            key = %key,
            reasoning = %update.chain_of_thought,
            "Preference rewrite reasoning"
        );

        self.db
            .put_preference(&self.scope, key.as_str(), &update.user_preferences)
            .await?;

        tracing::info!(scope = %self.scope, key = %key, "Preferences updated from feedback");
        Ok(())
    }
}

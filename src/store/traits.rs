//! Unified `Database` trait: single async interface for all persistence.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::workflow::review::Checkpoint;

/// Lifecycle of a source item seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// A workflow is running for this item.
    Processing,
    /// Waiting for a reviewer.
    Suspended,
    /// Reached the terminal sink.
    Completed,
    /// Ended without the terminal sink (triage or reviewer ignore).
    Ignored,
    /// Aborted by a fatal error.
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "ignored" => Ok(Self::Ignored),
            "failed" => Ok(Self::Failed),
            other => Err(DatabaseError::Serialization(format!(
                "unknown item status: {other}"
            ))),
        }
    }
}

/// A row in `tracked_items`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    pub source_id: String,
    pub conversation_id: Uuid,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering preferences, checkpoints and
/// tracked items.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Preferences ─────────────────────────────────────────────────

    /// Read a preference record.
    async fn get_preference(&self, scope: &str, key: &str) -> Result<Option<String>, DatabaseError>;

    /// Store `default` if no record exists, then return the stored value.
    ///
    /// Concurrent first readers all observe the first value written.
    async fn get_or_seed_preference(
        &self,
        scope: &str,
        key: &str,
        default: &str,
    ) -> Result<String, DatabaseError>;

    /// Overwrite a preference record.
    async fn put_preference(&self, scope: &str, key: &str, value: &str)
    -> Result<(), DatabaseError>;

    // ── Checkpoints ─────────────────────────────────────────────────

    /// Persist a pending suspension, replacing any earlier checkpoint of the
    /// same conversation.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), DatabaseError>;

    /// Load the pending checkpoint of a conversation.
    async fn get_pending_checkpoint(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Checkpoint>, DatabaseError>;

    /// All pending checkpoints, oldest first.
    async fn list_pending_checkpoints(&self) -> Result<Vec<Checkpoint>, DatabaseError>;

    /// Atomically flip a pending checkpoint to resumed and return it.
    ///
    /// Returns `None` when there is nothing pending, including when another
    /// caller claimed it first.
    async fn claim_checkpoint(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Checkpoint>, DatabaseError>;

    // ── Tracked items ───────────────────────────────────────────────

    /// Start tracking a source item. Returns `false` if it was already tracked.
    async fn track_item(
        &self,
        source_id: &str,
        conversation_id: Uuid,
    ) -> Result<bool, DatabaseError>;

    /// Look up a tracked item.
    async fn get_tracked_item(&self, source_id: &str) -> Result<Option<TrackedItem>, DatabaseError>;

    /// Update the status of a tracked item.
    async fn set_item_status(&self, source_id: &str, status: ItemStatus)
    -> Result<(), DatabaseError>;
}

//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, ItemStatus, TrackedItem};
use crate::workflow::review::Checkpoint;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn read_checkpoint(
        &self,
        sql: &str,
        conversation_id: Uuid,
        op: &str,
    ) -> Result<Option<Checkpoint>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params![conversation_id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let payload: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
                decode_checkpoint(&payload).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn decode_checkpoint(payload: &str) -> Result<Checkpoint, DatabaseError> {
    serde_json::from_str(payload)
        .map_err(|e| DatabaseError::Serialization(format!("checkpoint payload: {e}")))
}

/// Map a libsql Row to a TrackedItem.
///
/// Column order matches TRACKED_COLUMNS.
fn row_to_tracked(row: &libsql::Row) -> Result<TrackedItem, DatabaseError> {
    let get_text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("tracked_items column {idx}: {e}")))
    };
    let conversation_id = get_text(1)?;

    Ok(TrackedItem {
        source_id: get_text(0)?,
        conversation_id: Uuid::parse_str(&conversation_id)
            .map_err(|e| DatabaseError::Serialization(format!("conversation id: {e}")))?,
        status: get_text(2)?.parse()?,
        created_at: parse_datetime(&get_text(3)?),
        updated_at: parse_datetime(&get_text(4)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const TRACKED_COLUMNS: &str = "source_id, conversation_id, status, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Preferences ─────────────────────────────────────────────────

    async fn get_preference(&self, scope: &str, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM preferences WHERE scope = ?1 AND key = ?2",
                params![scope, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_preference: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_preference: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_preference: {e}"))),
        }
    }

    async fn get_or_seed_preference(
        &self,
        scope: &str,
        key: &str,
        default: &str,
    ) -> Result<String, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO preferences (scope, key, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (scope, key) DO NOTHING",
                params![scope, key, default, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("seed_preference: {e}")))?;

        if inserted > 0 {
            debug!(scope, key, "Seeded preference with default");
        }

        self.get_preference(scope, key)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "preference".to_string(),
                id: format!("{scope}/{key}"),
            })
    }

    async fn put_preference(
        &self,
        scope: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO preferences (scope, key, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (scope, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![scope, key, value, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_preference: {e}")))?;
        Ok(())
    }

    // ── Checkpoints ─────────────────────────────────────────────────

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(checkpoint)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO checkpoints
                    (conversation_id, source_id, gate, action, status, payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7)
                 ON CONFLICT (conversation_id) DO UPDATE SET
                    source_id = ?2, gate = ?3, action = ?4, status = 'pending',
                    payload = ?5, created_at = ?6, updated_at = ?7",
                params![
                    checkpoint.conversation_id.to_string(),
                    checkpoint.state.source.id.as_str(),
                    checkpoint.gate.as_str(),
                    checkpoint.request.action.as_str(),
                    payload,
                    checkpoint.created_at.to_rfc3339(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_checkpoint: {e}")))?;

        debug!(
            conversation_id = %checkpoint.conversation_id,
            gate = checkpoint.gate.as_str(),
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn get_pending_checkpoint(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Checkpoint>, DatabaseError> {
        self.read_checkpoint(
            "SELECT payload FROM checkpoints WHERE conversation_id = ?1 AND status = 'pending'",
            conversation_id,
            "get_pending_checkpoint",
        )
        .await
    }

    async fn list_pending_checkpoints(&self) -> Result<Vec<Checkpoint>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT payload FROM checkpoints WHERE status = 'pending' ORDER BY created_at ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_pending_checkpoints: {e}")))?;

        let mut checkpoints = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_pending_checkpoints: {e}")))?
        {
            let payload: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_pending_checkpoints: {e}")))?;
            checkpoints.push(decode_checkpoint(&payload)?);
        }
        Ok(checkpoints)
    }

    async fn claim_checkpoint(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Checkpoint>, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let claimed = self
            .conn()
            .execute(
                "UPDATE checkpoints SET status = 'resumed', updated_at = ?2
                 WHERE conversation_id = ?1 AND status = 'pending'",
                params![conversation_id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claim_checkpoint: {e}")))?;

        if claimed == 0 {
            return Ok(None);
        }

        self.read_checkpoint(
            "SELECT payload FROM checkpoints WHERE conversation_id = ?1",
            conversation_id,
            "claim_checkpoint",
        )
        .await
    }

    // ── Tracked items ───────────────────────────────────────────────

    async fn track_item(
        &self,
        source_id: &str,
        conversation_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO tracked_items (source_id, conversation_id, status, created_at, updated_at)
                 VALUES (?1, ?2, 'processing', ?3, ?3)
                 ON CONFLICT (source_id) DO NOTHING",
                params![source_id, conversation_id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("track_item: {e}")))?;
        Ok(inserted > 0)
    }

    async fn get_tracked_item(&self, source_id: &str) -> Result<Option<TrackedItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TRACKED_COLUMNS} FROM tracked_items WHERE source_id = ?1"),
                params![source_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_tracked_item: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_tracked(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_tracked_item: {e}"))),
        }
    }

    async fn set_item_status(
        &self,
        source_id: &str,
        status: ItemStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE tracked_items SET status = ?2, updated_at = ?3 WHERE source_id = ?1",
                params![source_id, status.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_item_status: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "tracked_item".to_string(),
                id: source_id.to_string(),
            });
        }
        Ok(())
    }
}

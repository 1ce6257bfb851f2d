//! SQLite implementation of the StateStore port
//!
//! Domain payloads travel as serde_json TEXT; the columns next to them
//! exist for keying, filtering, and ordering only. Ids are uuid strings,
//! timestamps RFC 3339, enums their serde names.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use driftsync_core::domain::{
    Cursor, ItemId, OperationId, SessionId, SessionState, SyncItem, SyncOperation, TransferSession,
};
use driftsync_core::ports::{FailureRecord, StateStore, StoreError};

/// SQLite-backed durable engine state
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::CorruptRecord(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(data: &str) -> Result<T, StoreError> {
    serde_json::from_str(data).map_err(|e| StoreError::CorruptRecord(e.to_string()))
}

fn kind_name(kind: driftsync_core::domain::OperationKind) -> Result<String, StoreError> {
    match serde_json::to_value(kind) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        other => Err(StoreError::CorruptRecord(format!(
            "unexpected kind encoding: {:?}",
            other
        ))),
    }
}

fn kind_from_name(name: &str) -> Result<driftsync_core::domain::OperationKind, StoreError> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|e| StoreError::CorruptRecord(e.to_string()))
}

fn session_state_name(state: SessionState) -> &'static str {
    match state {
        SessionState::Active => "active",
        SessionState::Suspended => "suspended",
        SessionState::Completed => "completed",
        SessionState::Aborted => "aborted",
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    // --- Index ---

    async fn load_items(&self) -> Result<Vec<SyncItem>, StoreError> {
        let rows = sqlx::query("SELECT data FROM items WHERE tombstoned = 0")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| decode(row.get::<String, _>("data").as_str()))
            .collect()
    }

    async fn save_item(&self, item: &SyncItem) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO items (id, local_path, state, tombstoned, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 local_path = excluded.local_path,
                 state = excluded.state,
                 tombstoned = excluded.tombstoned,
                 data = excluded.data",
        )
        .bind(item.id().to_string())
        .bind(item.local_path().to_string())
        .bind(item.state().name())
        .bind(item.is_tombstoned() as i64)
        .bind(encode(item)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_item(&self, id: &ItemId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM items WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // --- Operation queue ---

    async fn load_operations(&self) -> Result<Vec<SyncOperation>, StoreError> {
        let rows = sqlx::query("SELECT data FROM operations ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| decode(row.get::<String, _>("data").as_str()))
            .collect()
    }

    async fn save_operation(&self, op: &SyncOperation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO operations (id, item_id, kind, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(op.id().to_string())
        .bind(op.item_id().to_string())
        .bind(op.kind().to_string())
        .bind(op.created_at().to_rfc3339())
        .bind(encode(op)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_operation(&self, id: &OperationId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM operations WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // --- Transfer sessions ---

    async fn load_sessions(&self) -> Result<Vec<TransferSession>, StoreError> {
        // Completed and aborted sessions hold nothing worth resuming.
        let rows = sqlx::query("SELECT data FROM sessions WHERE state IN ('active', 'suspended')")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| decode(row.get::<String, _>("data").as_str()))
            .collect()
    }

    async fn save_session(&self, session: &TransferSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (id, item_id, state, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 state = excluded.state,
                 data = excluded.data",
        )
        .bind(session.id().to_string())
        .bind(session.item_id().to_string())
        .bind(session_state_name(session.state()))
        .bind(encode(session)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // --- Remote cursor ---

    async fn load_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        let row = sqlx::query("SELECT value FROM sync_state WHERE key = 'remote_cursor'")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let value: String = row.get("value");
                Cursor::new(value)
                    .map(Some)
                    .map_err(|e| StoreError::CorruptRecord(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES ('remote_cursor', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(cursor.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // --- Failure audit ---

    async fn record_failure(&self, record: &FailureRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO failures
                 (operation_id, item_id, kind, retry_count, reason, failed_at, resolved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(operation_id) DO UPDATE SET
                 retry_count = excluded.retry_count,
                 reason = excluded.reason,
                 failed_at = excluded.failed_at,
                 resolved = excluded.resolved",
        )
        .bind(record.operation_id.to_string())
        .bind(record.item_id.to_string())
        .bind(kind_name(record.kind)?)
        .bind(i64::from(record.retry_count))
        .bind(&record.reason)
        .bind(record.failed_at.to_rfc3339())
        .bind(record.resolved as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_failures(&self) -> Result<Vec<FailureRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT operation_id, item_id, kind, retry_count, reason, failed_at, resolved
             FROM failures ORDER BY resolved ASC, failed_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let operation_id: String = row.get("operation_id");
                let item_id: String = row.get("item_id");
                let kind: String = row.get("kind");
                let failed_at: String = row.get("failed_at");
                Ok(FailureRecord {
                    operation_id: operation_id
                        .parse()
                        .map_err(|e: driftsync_core::domain::DomainError| {
                            StoreError::CorruptRecord(e.to_string())
                        })?,
                    item_id: item_id
                        .parse()
                        .map_err(|e: driftsync_core::domain::DomainError| {
                            StoreError::CorruptRecord(e.to_string())
                        })?,
                    kind: kind_from_name(&kind)?,
                    retry_count: row.get::<i64, _>("retry_count") as u32,
                    reason: row.get("reason"),
                    failed_at: chrono::DateTime::parse_from_rfc3339(&failed_at)
                        .map_err(|e| StoreError::CorruptRecord(e.to_string()))?
                        .with_timezone(&chrono::Utc),
                    resolved: row.get::<i64, _>("resolved") != 0,
                })
            })
            .collect()
    }

    async fn resolve_failure(&self, operation_id: &OperationId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE failures SET resolved = 1 WHERE operation_id = ?1")
            .bind(operation_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(operation_id.to_string()));
        }
        Ok(())
    }
}

//! Sender registry operations
//!
//! Only identity and coarse usage numbers persist; health metrics are
//! runtime-only and live in the sender pool.

use chrono::{DateTime, Utc};
use relay_protocol::SenderId;
use rusqlite::{params, OptionalExtension, Row};

use crate::error::{constraint_to_conflict, Result, StoreError};
use crate::models::SenderRecord;
use crate::store::{now_ts, parse_ts, parse_ts_opt, Store};

impl Store {
    /// Register a sending identity
    pub fn add_sender(&self, display_handle: &str, credential: &str) -> Result<SenderRecord> {
        let id = self.with_db(|db| {
            db.conn()
                .execute(
                    "INSERT INTO sender (display_handle, credential, enabled, created_at)
                     VALUES (?1, ?2, 1, ?3)",
                    params![display_handle, credential, now_ts()],
                )
                .map_err(|e| {
                    constraint_to_conflict(e, &format!("sender {display_handle} already exists"))
                })?;
            Ok(db.conn().last_insert_rowid())
        })?;
        tracing::info!(sender = id, handle = display_handle, "sender added");
        self.get_sender(SenderId(id))
    }

    pub fn get_sender(&self, id: SenderId) -> Result<SenderRecord> {
        self.with_db(|db| {
            db.conn()
                .query_row(
                    "SELECT id, display_handle, credential, enabled, usage_count, last_used_at,
                            created_at
                     FROM sender WHERE id = ?1",
                    params![id.get()],
                    row_to_sender,
                )
                .optional()?
                .ok_or(StoreError::NotFound("sender"))
        })
    }

    /// Flip `enabled`; returns the new state
    pub fn toggle_sender(&self, id: SenderId) -> Result<bool> {
        self.with_db(|db| {
            let changed = db.conn().execute(
                "UPDATE sender SET enabled = NOT enabled WHERE id = ?1",
                params![id.get()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("sender"));
            }
            let enabled: bool = db.conn().query_row(
                "SELECT enabled FROM sender WHERE id = ?1",
                params![id.get()],
                |row| row.get(0),
            )?;
            Ok(enabled)
        })
    }

    pub fn delete_sender(&self, id: SenderId) -> Result<()> {
        let changed = self.with_db(|db| {
            Ok(db
                .conn()
                .execute("DELETE FROM sender WHERE id = ?1", params![id.get()])?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound("sender"));
        }
        // Pairs bound to this sender fall back to the pool (FK sets NULL).
        self.refresh_pairs()?;
        tracing::info!(sender = %id, "sender deleted");
        Ok(())
    }

    pub fn list_senders(&self, active_only: bool) -> Result<Vec<SenderRecord>> {
        self.with_db(|db| {
            let sql = if active_only {
                "SELECT id, display_handle, credential, enabled, usage_count, last_used_at,
                        created_at
                 FROM sender WHERE enabled = 1 ORDER BY id"
            } else {
                "SELECT id, display_handle, credential, enabled, usage_count, last_used_at,
                        created_at
                 FROM sender ORDER BY id"
            };
            let mut stmt = db.conn().prepare(sql)?;
            let rows = stmt.query_map([], row_to_sender)?;
            let mut senders = Vec::new();
            for row in rows {
                senders.push(row?);
            }
            Ok(senders)
        })
    }

    /// Bump usage after a successful send
    pub fn record_sender_use(&self, id: SenderId, at: DateTime<Utc>) -> Result<()> {
        self.with_db(|db| {
            db.conn().execute(
                "UPDATE sender SET usage_count = usage_count + 1, last_used_at = ?2
                 WHERE id = ?1",
                params![id.get(), at.to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

fn row_to_sender(row: &Row<'_>) -> rusqlite::Result<SenderRecord> {
    Ok(SenderRecord {
        id: SenderId(row.get(0)?),
        display_handle: row.get(1)?,
        credential: row.get(2)?,
        enabled: row.get(3)?,
        usage_count: row.get::<_, i64>(4)? as u64,
        last_used_at: parse_ts_opt(5, row.get(5)?)?,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}

//! Key-value settings

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::store::{now_ts, Store};

/// Setting key for the global pause switch
const PAUSED: &str = "system_paused";

impl Store {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_db(|db| {
            Ok(db
                .conn()
                .query_row(
                    "SELECT value FROM setting WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_db(|db| {
            db.conn().execute(
                "INSERT INTO setting (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                               updated_at = excluded.updated_at",
                params![key, value, now_ts()],
            )?;
            Ok(())
        })
    }

    /// Whether replication is administratively paused
    pub fn is_paused(&self) -> Result<bool> {
        Ok(self.get_setting(PAUSED)?.as_deref() == Some("true"))
    }

    pub fn set_paused(&self, paused: bool) -> Result<()> {
        self.set_setting(PAUSED, if paused { "true" } else { "false" })
    }
}

//! Error log, backup, retention cleanup and summary counts

use chrono::{DateTime, Duration, Utc};
use relay_protocol::{PairId, SenderId};
use rusqlite::params;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::store::{now_ts, to_ts, Store};

/// What a cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub mappings_removed: u64,
    pub errors_removed: u64,
    pub image_blocks_removed: u64,
}

/// Point-in-time table counts for status output
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreSummary {
    pub total_pairs: u64,
    pub active_pairs: u64,
    pub total_mappings: u64,
    pub mappings_24h: u64,
    pub errors_24h: u64,
}

impl Store {
    /// Record a task failure or degraded condition
    pub fn log_error(
        &self,
        kind: &str,
        detail: &str,
        pair: Option<PairId>,
        sender: Option<SenderId>,
    ) -> Result<()> {
        self.with_db(|db| {
            db.conn().execute(
                "INSERT INTO error_log (kind, detail, pair_id, sender_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    kind,
                    detail,
                    pair.map(PairId::get),
                    sender.map(SenderId::get),
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    /// Online backup to a sibling `<db>.backup` file
    ///
    /// Uses SQLite's backup API, so it is safe against concurrent writes.
    pub fn backup(&self) -> Result<std::path::PathBuf> {
        self.with_db(|db| {
            let Some(src_path) = db.path() else {
                return Err(StoreError::Migration(
                    "cannot back up an in-memory database".into(),
                ));
            };
            let dst_path = src_path.with_extension("backup");

            let mut dst = rusqlite::Connection::open(&dst_path)?;
            let backup = rusqlite::backup::Backup::new(db.conn(), &mut dst)?;
            backup.run_to_completion(64, std::time::Duration::from_millis(10), None)?;

            tracing::info!(path = %dst_path.display(), "database backup written");
            Ok(dst_path)
        })
    }

    /// Drop rows older than `older_than_days`
    ///
    /// Removes mappings of inactive pairs, stale error-log rows, and blocked
    /// images that never matched anything.
    pub fn cleanup(&self, older_than_days: u32) -> Result<CleanupReport> {
        let cutoff = to_ts(Utc::now() - Duration::days(i64::from(older_than_days)));

        let report = self.with_db(|db| {
            let mappings = db.conn().execute(
                "DELETE FROM mapping
                 WHERE created_at < ?1
                   AND pair_id IN (SELECT id FROM pair WHERE status = 'inactive')",
                params![cutoff],
            )?;
            let errors = db.conn().execute(
                "DELETE FROM error_log WHERE created_at < ?1",
                params![cutoff],
            )?;
            let images = db.conn().execute(
                "DELETE FROM blocked_image WHERE usage_count = 0 AND created_at < ?1",
                params![cutoff],
            )?;
            Ok(CleanupReport {
                mappings_removed: mappings as u64,
                errors_removed: errors as u64,
                image_blocks_removed: images as u64,
            })
        })?;

        if report.image_blocks_removed > 0 {
            self.refresh_images()?;
        }
        tracing::info!(
            older_than_days,
            mappings = report.mappings_removed,
            errors = report.errors_removed,
            image_blocks = report.image_blocks_removed,
            "cleanup finished"
        );
        Ok(report)
    }

    /// Table counts for `status()`/`stats()` output
    pub fn summary(&self, now: DateTime<Utc>) -> Result<StoreSummary> {
        let yesterday = to_ts(now - Duration::days(1));
        self.with_db(|db| {
            let count = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<u64> {
                Ok(db.conn().query_row(sql, args, |row| row.get::<_, i64>(0))? as u64)
            };

            Ok(StoreSummary {
                total_pairs: count("SELECT COUNT(*) FROM pair", &[])?,
                active_pairs: count("SELECT COUNT(*) FROM pair WHERE status = 'active'", &[])?,
                total_mappings: count("SELECT COUNT(*) FROM mapping", &[])?,
                mappings_24h: count(
                    "SELECT COUNT(*) FROM mapping WHERE created_at > ?1",
                    &[&yesterday],
                )?,
                errors_24h: count(
                    "SELECT COUNT(*) FROM error_log WHERE created_at > ?1",
                    &[&yesterday],
                )?,
            })
        })
    }
}

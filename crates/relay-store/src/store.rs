//! The store facade
//!
//! [`Store`] is the single handle the rest of the engine holds. SQL runs on
//! one connection behind a mutex; the pair index, word lists and blocked-hash
//! set are mirrored into copy-on-write caches that mutating operations
//! rebuild.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use relay_protocol::PairId;

use crate::database::Database;
use crate::error::Result;
use crate::index::PairIndex;
use crate::models::BlockedImage;

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

pub struct Store {
    pub(crate) db: Mutex<Database>,
    pub(crate) pairs: PairIndex,
    pub(crate) global_words: RwLock<Arc<Vec<String>>>,
    pub(crate) pair_words: RwLock<Arc<HashMap<PairId, Vec<String>>>>,
    pub(crate) images: RwLock<Arc<Vec<BlockedImage>>>,
}

impl Store {
    /// Open (or create) the database at `path` and warm the caches
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_database(Database::open(path.as_ref())?)
    }

    /// In-memory store for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?)
    }

    fn from_database(db: Database) -> Result<Self> {
        let store = Self {
            db: Mutex::new(db),
            pairs: PairIndex::default(),
            global_words: RwLock::new(Arc::new(Vec::new())),
            pair_words: RwLock::new(Arc::new(HashMap::new())),
            images: RwLock::new(Arc::new(Vec::new())),
        };
        store.refresh_pairs()?;
        store.refresh_words()?;
        store.refresh_images()?;
        Ok(store)
    }

    /// Run `f` with the connection lock held
    ///
    /// The closure must not block on anything but SQLite itself.
    pub(crate) fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        f(&db)
    }

    /// Rebuild the `source_chat -> [pair]` index from the table
    pub(crate) fn refresh_pairs(&self) -> Result<()> {
        let pairs = self.list_pairs()?;
        self.pairs.rebuild(pairs);
        Ok(())
    }
}

/// RFC 3339 timestamp for the `now` being written
pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn to_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a stored timestamp, reporting the column on failure
pub(crate) fn parse_ts(column: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

pub(crate) fn parse_ts_opt(
    column: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(column, s)).transpose()
}

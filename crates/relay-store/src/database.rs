//! Database connection management
//!
//! [`Database`] owns a single [`rusqlite::Connection`] and guarantees that
//! migrations have run before any other operation. All writes in the process
//! go through this one connection; WAL mode keeps concurrent readers cheap.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;

/// Wrapper around a migrated [`rusqlite::Connection`]
pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at `path`
    pub(crate) fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::setup(conn)
    }

    /// Open an in-memory database (tests, dry runs)
    pub(crate) fn open_in_memory() -> Result<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrations::run(&conn)?;

        if let Some(p) = conn.path() {
            tracing::info!(path = %p, "database ready");
        }

        Ok(Self { conn })
    }

    #[inline]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Filesystem path of the open database, if file-backed
    pub(crate) fn path(&self) -> Option<PathBuf> {
        self.conn.path().filter(|p| !p.is_empty()).map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sub/relay.db");
        let db = Database::open(&path).unwrap();
        assert!(db.path().is_some());
        assert!(path.exists());
    }

    #[test]
    fn test_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
    }
}

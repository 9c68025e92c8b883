//! Initial schema

use rusqlite::Connection;

pub(crate) fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sender (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            display_handle  TEXT NOT NULL UNIQUE,
            credential      TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            usage_count     INTEGER NOT NULL DEFAULT 0,
            last_used_at    TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pair (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            source_chat      INTEGER NOT NULL,
            destination_chat INTEGER NOT NULL,
            name             TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'active',
            sender_id        INTEGER REFERENCES sender(id) ON DELETE SET NULL,
            filters          TEXT NOT NULL DEFAULT '{}',
            stats            TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL,
            UNIQUE(source_chat, destination_chat)
        );
        CREATE INDEX IF NOT EXISTS pair_status ON pair(status);
        CREATE INDEX IF NOT EXISTS pair_source ON pair(source_chat);

        CREATE TABLE IF NOT EXISTS mapping (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            source_msg      INTEGER NOT NULL,
            dest_msg        INTEGER NOT NULL,
            pair_id         INTEGER NOT NULL REFERENCES pair(id) ON DELETE CASCADE,
            sender_id       INTEGER NOT NULL,
            source_chat     INTEGER NOT NULL,
            dest_chat       INTEGER NOT NULL,
            kind            TEXT NOT NULL DEFAULT 'text',
            has_media       INTEGER NOT NULL DEFAULT 0,
            reply_to_source INTEGER,
            reply_to_dest   INTEGER,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(source_msg, pair_id)
        );
        CREATE INDEX IF NOT EXISTS mapping_dest ON mapping(dest_msg, pair_id);

        CREATE TABLE IF NOT EXISTS blocked_word (
            word       TEXT NOT NULL,
            pair_id    INTEGER REFERENCES pair(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS blocked_word_key
            ON blocked_word(word, COALESCE(pair_id, 0));

        CREATE TABLE IF NOT EXISTS blocked_image (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            phash       INTEGER NOT NULL,
            scope       TEXT NOT NULL DEFAULT 'pair',
            pair_id     INTEGER REFERENCES pair(id) ON DELETE CASCADE,
            threshold   INTEGER NOT NULL DEFAULT 5,
            note        TEXT NOT NULL DEFAULT '',
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS blocked_image_key
            ON blocked_image(phash, COALESCE(pair_id, 0));
        CREATE INDEX IF NOT EXISTS blocked_image_scope ON blocked_image(phash, scope);

        CREATE TABLE IF NOT EXISTS subscription (
            user_id    INTEGER PRIMARY KEY,
            expires_at TEXT NOT NULL,
            added_by   INTEGER NOT NULL,
            notes      TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS setting (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS error_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            kind       TEXT NOT NULL,
            detail     TEXT NOT NULL,
            pair_id    INTEGER,
            sender_id  INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS error_log_time ON error_log(created_at DESC);
        "#,
    )
}

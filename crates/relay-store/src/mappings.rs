//! Message-mapping operations
//!
//! The mapping table is what turns a source edit or delete back into the
//! destination message it must touch. Writes are keyed on
//! `(source_msg, pair)` and upsert, so duplicate deliveries cannot create
//! duplicate rows.

use relay_protocol::{ChatId, MsgId, PairId, SenderId};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{Mapping, MappingKind};
use crate::store::{now_ts, Store};

impl Store {
    /// Insert or update the mapping for `(mapping.source_msg, mapping.pair)`
    pub fn save_mapping(&self, mapping: &Mapping) -> Result<()> {
        self.with_db(|db| {
            db.conn().execute(
                "INSERT INTO mapping (source_msg, dest_msg, pair_id, sender_id, source_chat,
                                      dest_chat, kind, has_media, reply_to_source, reply_to_dest,
                                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(source_msg, pair_id) DO UPDATE SET
                     dest_msg = excluded.dest_msg,
                     sender_id = excluded.sender_id,
                     kind = excluded.kind,
                     has_media = excluded.has_media,
                     reply_to_source = excluded.reply_to_source,
                     reply_to_dest = excluded.reply_to_dest,
                     updated_at = excluded.updated_at",
                params![
                    mapping.source_msg.get(),
                    mapping.dest_msg.get(),
                    mapping.pair.get(),
                    mapping.sender.get(),
                    mapping.source_chat.get(),
                    mapping.dest_chat.get(),
                    mapping.kind.as_str(),
                    mapping.has_media,
                    mapping.reply_to_source.map(MsgId::get),
                    mapping.reply_to_dest.map(MsgId::get),
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    /// Mapping for a source message within one pair, if the copy exists
    pub fn get_mapping(&self, source_msg: MsgId, pair: PairId) -> Result<Option<Mapping>> {
        self.with_db(|db| {
            Ok(db
                .conn()
                .query_row(
                    "SELECT source_msg, dest_msg, pair_id, sender_id, source_chat, dest_chat,
                            kind, has_media, reply_to_source, reply_to_dest
                     FROM mapping WHERE source_msg = ?1 AND pair_id = ?2",
                    params![source_msg.get(), pair.get()],
                    row_to_mapping,
                )
                .optional()?)
        })
    }

    /// Remove the mapping for `(source_msg, pair)`; true when a row existed
    pub fn delete_mapping(&self, source_msg: MsgId, pair: PairId) -> Result<bool> {
        self.with_db(|db| {
            let changed = db.conn().execute(
                "DELETE FROM mapping WHERE source_msg = ?1 AND pair_id = ?2",
                params![source_msg.get(), pair.get()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Touch `updated_at` after an edit reached the destination
    pub fn touch_mapping(&self, source_msg: MsgId, pair: PairId) -> Result<()> {
        self.with_db(|db| {
            db.conn().execute(
                "UPDATE mapping SET updated_at = ?3 WHERE source_msg = ?1 AND pair_id = ?2",
                params![source_msg.get(), pair.get(), now_ts()],
            )?;
            Ok(())
        })
    }

    pub fn count_mappings(&self) -> Result<u64> {
        self.with_db(|db| {
            Ok(db
                .conn()
                .query_row("SELECT COUNT(*) FROM mapping", [], |row| row.get::<_, i64>(0))?
                as u64)
        })
    }
}

fn row_to_mapping(row: &Row<'_>) -> rusqlite::Result<Mapping> {
    let kind: String = row.get(6)?;
    Ok(Mapping {
        source_msg: MsgId(row.get(0)?),
        dest_msg: MsgId(row.get(1)?),
        pair: PairId(row.get(2)?),
        sender: SenderId(row.get(3)?),
        source_chat: ChatId(row.get(4)?),
        dest_chat: ChatId(row.get(5)?),
        kind: MappingKind::parse(&kind),
        has_media: row.get(7)?,
        reply_to_source: row.get::<_, Option<i64>>(8)?.map(MsgId),
        reply_to_dest: row.get::<_, Option<i64>>(9)?.map(MsgId),
    })
}

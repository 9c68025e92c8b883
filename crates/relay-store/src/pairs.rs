//! Pair registry operations

use relay_protocol::{ChatId, PairId, SenderId};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::{constraint_to_conflict, Result, StoreError};
use crate::models::{NewPair, Pair, PairStats, PairStatus, SenderBinding, StatDelta};
use crate::store::{now_ts, parse_ts, Store};

use std::sync::Arc;

impl Store {
    /// Create a pair; `(source_chat, destination_chat)` must be new
    pub fn create_pair(&self, new: NewPair) -> Result<Pair> {
        let id = self.with_db(|db| {
            db.conn()
                .execute(
                    "INSERT INTO pair (source_chat, destination_chat, name, status, sender_id,
                                       filters, stats, created_at)
                     VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6, ?7)",
                    params![
                        new.source_chat.get(),
                        new.destination_chat.get(),
                        new.name,
                        new.binding.fixed().map(SenderId::get),
                        new.filters.to_json(),
                        serde_json::to_string(&PairStats::default())?,
                        now_ts(),
                    ],
                )
                .map_err(|e| {
                    constraint_to_conflict(
                        e,
                        &format!(
                            "pair {} -> {} already exists",
                            new.source_chat, new.destination_chat
                        ),
                    )
                })?;
            Ok(db.conn().last_insert_rowid())
        })?;

        self.refresh_pairs()?;
        let pair = self.get_pair(PairId(id))?;
        tracing::info!(
            pair = %pair.id,
            name = %pair.name,
            source = %pair.source_chat,
            destination = %pair.destination_chat,
            "pair created"
        );
        Ok(pair)
    }

    /// Persist every mutable field of `pair`
    pub fn update_pair(&self, pair: &Pair) -> Result<()> {
        let changed = self.with_db(|db| {
            Ok(db.conn().execute(
                "UPDATE pair SET name = ?2, status = ?3, sender_id = ?4, filters = ?5, stats = ?6
                 WHERE id = ?1",
                params![
                    pair.id.get(),
                    pair.name,
                    pair.status.as_str(),
                    pair.binding.fixed().map(SenderId::get),
                    pair.filters.to_json(),
                    serde_json::to_string(&pair.stats)?,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound("pair"));
        }
        self.refresh_pairs()
    }

    /// Delete a pair; its mappings, word entries and image blocks cascade
    pub fn delete_pair(&self, id: PairId) -> Result<()> {
        let changed = self.with_db(|db| {
            Ok(db
                .conn()
                .execute("DELETE FROM pair WHERE id = ?1", params![id.get()])?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound("pair"));
        }
        self.refresh_pairs()?;
        self.refresh_words()?;
        self.refresh_images()?;
        tracing::info!(pair = %id, "pair deleted");
        Ok(())
    }

    pub fn get_pair(&self, id: PairId) -> Result<Pair> {
        self.with_db(|db| {
            db.conn()
                .query_row(
                    "SELECT id, source_chat, destination_chat, name, status, sender_id,
                            filters, stats, created_at
                     FROM pair WHERE id = ?1",
                    params![id.get()],
                    row_to_pair,
                )
                .optional()?
                .ok_or(StoreError::NotFound("pair"))
        })
    }

    pub fn list_pairs(&self) -> Result<Vec<Pair>> {
        self.with_db(|db| {
            let mut stmt = db.conn().prepare(
                "SELECT id, source_chat, destination_chat, name, status, sender_id,
                        filters, stats, created_at
                 FROM pair ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_pair)?;
            let mut pairs = Vec::new();
            for row in rows {
                pairs.push(row?);
            }
            Ok(pairs)
        })
    }

    /// Hot-path lookup: active and inactive pairs listening to `chat`
    ///
    /// Served entirely from the in-memory index; stats on the returned pairs
    /// may lag behind the table by a few increments.
    pub fn pairs_by_source_chat(&self, chat: ChatId) -> Arc<Vec<Arc<Pair>>> {
        self.pairs.lookup(chat)
    }

    /// Fold a counter delta into the pair's stats column
    pub fn bump_pair_stats(&self, id: PairId, delta: StatDelta) -> Result<()> {
        self.with_db(|db| {
            let raw: Option<String> = db
                .conn()
                .query_row(
                    "SELECT stats FROM pair WHERE id = ?1",
                    params![id.get()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(raw) = raw else {
                return Err(StoreError::NotFound("pair"));
            };

            let mut stats: PairStats = serde_json::from_str(&raw).unwrap_or_default();
            delta.apply_to(&mut stats, chrono::Utc::now());

            db.conn().execute(
                "UPDATE pair SET stats = ?2 WHERE id = ?1",
                params![id.get(), serde_json::to_string(&stats)?],
            )?;
            Ok(())
        })
    }
}

fn row_to_pair(row: &Row<'_>) -> rusqlite::Result<Pair> {
    let filters_raw: String = row.get(6)?;
    let stats_raw: String = row.get(7)?;
    let created_raw: String = row.get(8)?;
    let sender: Option<i64> = row.get(5)?;
    let status: String = row.get(4)?;

    Ok(Pair {
        id: PairId(row.get(0)?),
        source_chat: ChatId(row.get(1)?),
        destination_chat: ChatId(row.get(2)?),
        name: row.get(3)?,
        status: PairStatus::parse(&status),
        binding: match sender {
            Some(id) => SenderBinding::Fixed(SenderId(id)),
            None => SenderBinding::Pool,
        },
        filters: relay_filter::FilterPolicy::from_json(&filters_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?,
        stats: serde_json::from_str(&stats_raw).unwrap_or_default(),
        created_at: parse_ts(8, created_raw)?,
    })
}

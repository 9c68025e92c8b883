//! Word and image block lists
//!
//! Both lists are read on the hot path (words per message, hashes per image)
//! and mutated only by admin operations, so each mirrors into a
//! copy-on-write cache that mutations rebuild.

use std::collections::HashMap;
use std::sync::Arc;

use relay_protocol::PairId;
use rusqlite::{params, OptionalExtension, Row};

use crate::error::{constraint_to_conflict, Result};
use crate::models::{BlockScope, BlockedImage};
use crate::store::{now_ts, parse_ts, Store};

/// Bit distance between two 64-bit perceptual hashes
#[inline]
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

impl Store {
    // ---- words ----------------------------------------------------------

    /// Block `word` globally (`pair = None`) or for one pair
    pub fn add_blocked_word(&self, word: &str, pair: Option<PairId>) -> Result<()> {
        let word = word.trim().to_lowercase();
        self.with_db(|db| {
            db.conn()
                .execute(
                    "INSERT INTO blocked_word (word, pair_id, created_at) VALUES (?1, ?2, ?3)",
                    params![word, pair.map(PairId::get), now_ts()],
                )
                .map_err(|e| constraint_to_conflict(e, &format!("word {word:?} already blocked")))?;
            Ok(())
        })?;
        self.refresh_words()
    }

    /// Remove a blocked word; true when an entry existed
    pub fn remove_blocked_word(&self, word: &str, pair: Option<PairId>) -> Result<bool> {
        let word = word.trim().to_lowercase();
        let changed = self.with_db(|db| {
            Ok(match pair {
                Some(p) => db.conn().execute(
                    "DELETE FROM blocked_word WHERE word = ?1 AND pair_id = ?2",
                    params![word, p.get()],
                )?,
                None => db.conn().execute(
                    "DELETE FROM blocked_word WHERE word = ?1 AND pair_id IS NULL",
                    params![word],
                )?,
            })
        })?;
        self.refresh_words()?;
        Ok(changed > 0)
    }

    /// Global and pair-scoped word lists for the filter engine
    pub fn blocked_words_for(&self, pair: PairId) -> (Arc<Vec<String>>, Vec<String>) {
        let global = self
            .global_words
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let per_pair = self
            .pair_words
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pair)
            .cloned()
            .unwrap_or_default();
        (global, per_pair)
    }

    /// The global block list alone
    pub fn global_blocked_words(&self) -> Arc<Vec<String>> {
        self.global_words
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Words currently blocked in the given scope (admin listing)
    pub fn list_blocked_words(&self, pair: Option<PairId>) -> Result<Vec<String>> {
        self.with_db(|db| {
            let mut words = Vec::new();
            match pair {
                Some(p) => {
                    let mut stmt = db.conn().prepare(
                        "SELECT word FROM blocked_word WHERE pair_id = ?1 ORDER BY word",
                    )?;
                    let rows = stmt.query_map(params![p.get()], |row| row.get(0))?;
                    for row in rows {
                        words.push(row?);
                    }
                }
                None => {
                    let mut stmt = db.conn().prepare(
                        "SELECT word FROM blocked_word WHERE pair_id IS NULL ORDER BY word",
                    )?;
                    let rows = stmt.query_map([], |row| row.get(0))?;
                    for row in rows {
                        words.push(row?);
                    }
                }
            }
            Ok(words)
        })
    }

    /// Insert configured seed words that are not already present
    pub fn seed_global_words(&self, words: &[String]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        self.with_db(|db| {
            let mut stmt = db.conn().prepare(
                "INSERT OR IGNORE INTO blocked_word (word, pair_id, created_at)
                 VALUES (?1, NULL, ?2)",
            )?;
            for word in words {
                let word = word.trim().to_lowercase();
                if !word.is_empty() {
                    stmt.execute(params![word, now_ts()])?;
                }
            }
            Ok(())
        })?;
        self.refresh_words()
    }

    pub(crate) fn refresh_words(&self) -> Result<()> {
        let (global, per_pair) = self.with_db(|db| {
            let mut stmt = db
                .conn()
                .prepare("SELECT word, pair_id FROM blocked_word ORDER BY word")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?))
            })?;

            let mut global = Vec::new();
            let mut per_pair: HashMap<PairId, Vec<String>> = HashMap::new();
            for row in rows {
                let (word, pair) = row?;
                match pair {
                    None => global.push(word),
                    Some(p) => per_pair.entry(PairId(p)).or_default().push(word),
                }
            }
            Ok((global, per_pair))
        })?;

        *self.global_words.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(global);
        *self.pair_words.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(per_pair);
        Ok(())
    }

    // ---- images ---------------------------------------------------------

    /// Block a perceptual hash globally or for one pair
    pub fn block_image(
        &self,
        phash: u64,
        pair: Option<PairId>,
        threshold: u32,
        note: &str,
    ) -> Result<BlockedImage> {
        let scope = match pair {
            Some(_) => BlockScope::Pair,
            None => BlockScope::Global,
        };
        let id = self.with_db(|db| {
            db.conn()
                .execute(
                    "INSERT INTO blocked_image (phash, scope, pair_id, threshold, note, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        phash as i64,
                        scope.as_str(),
                        pair.map(PairId::get),
                        threshold,
                        note,
                        now_ts(),
                    ],
                )
                .map_err(|e| constraint_to_conflict(e, "image already blocked in this scope"))?;
            Ok(db.conn().last_insert_rowid())
        })?;
        self.refresh_images()?;
        tracing::info!(phash = %format!("{phash:016x}"), scope = scope.as_str(), "image blocked");

        self.get_blocked_image(id)
    }

    fn get_blocked_image(&self, id: i64) -> Result<BlockedImage> {
        self.with_db(|db| {
            db.conn()
                .query_row(
                    "SELECT id, phash, scope, pair_id, threshold, note, usage_count, created_at
                     FROM blocked_image WHERE id = ?1",
                    params![id],
                    row_to_blocked_image,
                )
                .optional()?
                .ok_or(crate::error::StoreError::NotFound("blocked_image"))
        })
    }

    /// Remove a blocked hash; true when an entry existed
    pub fn unblock_image(&self, phash: u64, pair: Option<PairId>) -> Result<bool> {
        let changed = self.with_db(|db| {
            Ok(match pair {
                Some(p) => db.conn().execute(
                    "DELETE FROM blocked_image WHERE phash = ?1 AND pair_id = ?2",
                    params![phash as i64, p.get()],
                )?,
                None => db.conn().execute(
                    "DELETE FROM blocked_image WHERE phash = ?1 AND pair_id IS NULL",
                    params![phash as i64],
                )?,
            })
        })?;
        self.refresh_images()?;
        Ok(changed > 0)
    }

    /// Blocked entries visible to a pair, or everything when `pair` is None
    pub fn list_blocked_images(&self, pair: Option<PairId>) -> Result<Vec<BlockedImage>> {
        let cache = self.images.read().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(match pair {
            Some(p) => cache.iter().filter(|e| e.applies_to(p)).cloned().collect(),
            None => cache.as_ref().clone(),
        })
    }

    /// First blocked entry within Hamming range of `phash` for this pair
    ///
    /// Global entries are scanned before pair entries; within a scope the
    /// oldest entry wins. Served from the cache.
    pub fn lookup_blocked(&self, phash: u64, pair: PairId) -> Option<BlockedImage> {
        let cache = self.images.read().unwrap_or_else(|e| e.into_inner()).clone();
        cache
            .iter()
            .filter(|entry| entry.applies_to(pair))
            .find(|entry| hamming(entry.phash, phash) <= entry.threshold)
            .cloned()
    }

    /// Count a hit against a blocked entry
    pub fn bump_image_usage(&self, id: i64) -> Result<()> {
        self.with_db(|db| {
            db.conn().execute(
                "UPDATE blocked_image SET usage_count = usage_count + 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        // The cached usage_count lags; matching never reads it.
    }

    pub(crate) fn refresh_images(&self) -> Result<()> {
        let entries = self.with_db(|db| {
            // Global scope first so global blocks win ties deterministically.
            let mut stmt = db.conn().prepare(
                "SELECT id, phash, scope, pair_id, threshold, note, usage_count, created_at
                 FROM blocked_image
                 ORDER BY CASE scope WHEN 'global' THEN 0 ELSE 1 END, id",
            )?;
            let rows = stmt.query_map([], row_to_blocked_image)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })?;

        *self.images.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(entries);
        Ok(())
    }
}

fn row_to_blocked_image(row: &Row<'_>) -> rusqlite::Result<BlockedImage> {
    let scope: String = row.get(2)?;
    Ok(BlockedImage {
        id: row.get(0)?,
        phash: row.get::<_, i64>(1)? as u64,
        scope: BlockScope::parse(&scope),
        pair: row.get::<_, Option<i64>>(3)?.map(PairId),
        threshold: row.get(4)?,
        note: row.get(5)?,
        usage_count: row.get::<_, i64>(6)? as u64,
        created_at: parse_ts(7, row.get(7)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_symmetry_and_range() {
        assert_eq!(hamming(0, 0), 0);
        assert_eq!(hamming(0, u64::MAX), 64);
        assert_eq!(hamming(0b1011, 0b0010), 2);

        // Symmetry
        for (a, b) in [(0x00FF00FFu64, 0xFF00FF00u64), (7, 13), (u64::MAX, 1)] {
            assert_eq!(hamming(a, b), hamming(b, a));
        }
    }
}

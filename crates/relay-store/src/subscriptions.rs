//! Timed-access subscriptions
//!
//! One row per user; renewals extend the existing grant. The expiry sweeper
//! reads `expired_subscriptions` and deletes each row only after the user has
//! been removed from every destination chat.

use chrono::{DateTime, Duration, Utc};
use relay_protocol::UserId;
use rusqlite::{params, OptionalExtension, Row};

use crate::error::{Result, StoreError};
use crate::models::Subscription;
use crate::store::{now_ts, parse_ts, to_ts, Store};

impl Store {
    /// Grant or replace a user's subscription for `days` from now
    pub fn add_subscription(
        &self,
        user: UserId,
        days: i64,
        added_by: UserId,
        notes: &str,
    ) -> Result<Subscription> {
        let expires_at = Utc::now() + Duration::days(days);
        self.with_db(|db| {
            db.conn().execute(
                "INSERT INTO subscription (user_id, expires_at, added_by, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     expires_at = excluded.expires_at,
                     added_by = excluded.added_by,
                     notes = excluded.notes",
                params![user.get(), to_ts(expires_at), added_by.get(), notes, now_ts()],
            )?;
            Ok(())
        })?;
        self.get_subscription(user)
    }

    /// Extend an existing grant by `days` from its current expiry (or from
    /// now when it already lapsed)
    pub fn renew_subscription(&self, user: UserId, days: i64) -> Result<Subscription> {
        let current = self.get_subscription(user)?;
        let base = current.expires_at.max(Utc::now());
        let expires_at = base + Duration::days(days);
        self.with_db(|db| {
            db.conn().execute(
                "UPDATE subscription SET expires_at = ?2 WHERE user_id = ?1",
                params![user.get(), to_ts(expires_at)],
            )?;
            Ok(())
        })?;
        self.get_subscription(user)
    }

    pub fn get_subscription(&self, user: UserId) -> Result<Subscription> {
        self.with_db(|db| {
            db.conn()
                .query_row(
                    "SELECT user_id, expires_at, added_by, notes, created_at
                     FROM subscription WHERE user_id = ?1",
                    params![user.get()],
                    row_to_subscription,
                )
                .optional()?
                .ok_or(StoreError::NotFound("subscription"))
        })
    }

    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.with_db(|db| {
            let mut stmt = db.conn().prepare(
                "SELECT user_id, expires_at, added_by, notes, created_at
                 FROM subscription ORDER BY expires_at",
            )?;
            let rows = stmt.query_map([], row_to_subscription)?;
            let mut subs = Vec::new();
            for row in rows {
                subs.push(row?);
            }
            Ok(subs)
        })
    }

    pub fn delete_subscription(&self, user: UserId) -> Result<bool> {
        self.with_db(|db| {
            let changed = db.conn().execute(
                "DELETE FROM subscription WHERE user_id = ?1",
                params![user.get()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Subscriptions that have lapsed as of `now`
    pub fn expired_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        self.with_db(|db| {
            let mut stmt = db.conn().prepare(
                "SELECT user_id, expires_at, added_by, notes, created_at
                 FROM subscription WHERE expires_at <= ?1 ORDER BY expires_at",
            )?;
            let rows = stmt.query_map(params![to_ts(now)], row_to_subscription)?;
            let mut subs = Vec::new();
            for row in rows {
                subs.push(row?);
            }
            Ok(subs)
        })
    }
}

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        user: UserId(row.get(0)?),
        expires_at: parse_ts(1, row.get(1)?)?,
        added_by: UserId(row.get(2)?),
        notes: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
    })
}

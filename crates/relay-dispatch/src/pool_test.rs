use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_protocol::{ChatId, Entity, MediaKind, MsgId, SendError, Sender, SenderId, UserId};

use super::*;

/// Sender stub that always succeeds
struct OkSender;

#[async_trait]
impl Sender for OkSender {
    async fn send_text(
        &self,
        _chat: ChatId,
        _text: &str,
        _entities: &[Entity],
        _reply_to: Option<MsgId>,
        _disable_preview: bool,
    ) -> Result<MsgId, SendError> {
        Ok(MsgId(1))
    }

    async fn send_media(
        &self,
        _chat: ChatId,
        _kind: MediaKind,
        _bytes: &[u8],
        _caption: &str,
        _entities: &[Entity],
        _reply_to: Option<MsgId>,
    ) -> Result<MsgId, SendError> {
        Ok(MsgId(1))
    }

    async fn edit_text(
        &self,
        _chat: ChatId,
        _msg: MsgId,
        _text: &str,
        _entities: &[Entity],
    ) -> Result<(), SendError> {
        Ok(())
    }

    async fn delete_message(&self, _chat: ChatId, _msg: MsgId) -> Result<(), SendError> {
        Ok(())
    }

    async fn kick_user(&self, _chat: ChatId, _user: UserId) -> Result<(), SendError> {
        Ok(())
    }

    async fn unban_user(&self, _chat: ChatId, _user: UserId) -> Result<(), SendError> {
        Ok(())
    }
}

fn pool_with(n: usize) -> Arc<SenderPool> {
    let pool = Arc::new(SenderPool::new());
    for i in 1..=n {
        pool.register(SenderId(i as i64), format!("s{i}"), Arc::new(OkSender));
    }
    pool
}

fn picked(selection: Selection) -> Arc<SenderHandle> {
    match selection {
        Selection::Picked(h) => h,
        Selection::RetryAfter(d) => panic!("expected pick, got retry after {d:?}"),
        Selection::Empty => panic!("expected pick, got empty pool"),
    }
}

#[test]
fn test_empty_pool() {
    let pool = SenderPool::new();
    assert!(matches!(pool.select(None), Selection::Empty));
    assert_eq!(pool.eligible_count(), 0);
}

#[test]
fn test_least_loaded_wins() {
    let pool = pool_with(3);

    // Load sender 1 and 2 with one task each; sender 3 is idle
    let a = picked(pool.select(None));
    let b = picked(pool.select(None));
    let c = picked(pool.select(None));

    let mut ids = vec![a.id, b.id, c.id];
    ids.sort();
    assert_eq!(ids, vec![SenderId(1), SenderId(2), SenderId(3)]);

    // All three now carry one task; completing one makes it preferred again
    c.record_success(Duration::from_millis(50));
    let again = picked(pool.select(None));
    assert_eq!(again.id, c.id);
}

#[test]
fn test_success_rate_breaks_ties() {
    let pool = pool_with(2);

    // Tank sender 1's success rate without loading it
    let s1 = pool.get(SenderId(1)).unwrap();
    let h = picked(pool.select(Some(SenderId(1))));
    assert_eq!(h.id, s1.id);
    h.record_failure(true);

    // Both idle; sender 2 has the better rate
    let chosen = picked(pool.select(None));
    assert_eq!(chosen.id, SenderId(2));
}

#[test]
fn test_preferred_sender_honored_while_eligible() {
    let pool = pool_with(3);

    let h = picked(pool.select(Some(SenderId(2))));
    assert_eq!(h.id, SenderId(2));
    h.record_success(Duration::from_millis(10));

    // Disabled preferred falls back to the pool
    pool.set_enabled(SenderId(2), false);
    let h = picked(pool.select(Some(SenderId(2))));
    assert_ne!(h.id, SenderId(2));
}

#[test]
fn test_rate_limited_sender_excluded_until_deadline() {
    let pool = pool_with(1);

    let h = picked(pool.select(None));
    h.record_rate_limited(Duration::from_secs(30));

    // Only sender is cooling off: selection reports the wait
    match pool.select(None) {
        Selection::RetryAfter(wait) => {
            assert!(wait <= Duration::from_secs(30));
            assert!(wait > Duration::from_secs(25));
        }
        _ => panic!("expected RetryAfter"),
    }
}

#[test]
fn test_rate_limit_does_not_count_toward_streak() {
    let pool = pool_with(1);
    let h = picked(pool.select(None));
    let before = h.snapshot(std::time::Instant::now()).consecutive_failures;
    h.record_rate_limited(Duration::from_millis(1));
    let after = h.snapshot(std::time::Instant::now()).consecutive_failures;
    assert_eq!(before, after);
}

#[test]
fn test_failure_streak_quarantines_at_f_max() {
    let pool = pool_with(2);

    for _ in 0..F_MAX {
        let h = picked(pool.select(Some(SenderId(1))));
        assert_eq!(h.id, SenderId(1));
        h.record_failure(true);
    }

    // Sender 1 is out; everything lands on sender 2
    assert_eq!(pool.eligible_count(), 1);
    for _ in 0..3 {
        let h = picked(pool.select(None));
        assert_eq!(h.id, SenderId(2));
        h.record_success(Duration::from_millis(5));
    }
}

#[test]
fn test_ema_moves_with_outcomes() {
    let pool = pool_with(1);
    let h = pool.get(SenderId(1)).unwrap();
    assert!((h.success_rate() - 1.0).abs() < 1e-9);

    picked(pool.select(None)).record_failure(true);
    let after_one = h.success_rate();
    assert!((after_one - 0.8).abs() < 1e-9);

    picked(pool.select(None)).record_success(Duration::from_millis(100));
    assert!(h.success_rate() > after_one);
}

#[test]
fn test_register_replaces_same_id() {
    let pool = pool_with(1);
    pool.register(SenderId(1), "replacement", Arc::new(OkSender));
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.get(SenderId(1)).unwrap().name, "replacement");
}

#[test]
fn test_remove() {
    let pool = pool_with(2);
    assert!(pool.remove(SenderId(1)));
    assert!(!pool.remove(SenderId(1)));
    assert_eq!(pool.len(), 1);
}

use chrono::{Duration, Utc};
use relay_filter::FilterPolicy;
use relay_protocol::{ChatId, MsgId, PairId, SenderId, UserId};

use super::*;
use crate::maintenance::CleanupReport;
use crate::models::{
    BlockScope, Mapping, MappingKind, NewPair, PairStatus, SenderBinding, StatDelta,
};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn new_pair(source: i64, dest: i64) -> NewPair {
    NewPair {
        source_chat: ChatId(source),
        destination_chat: ChatId(dest),
        name: format!("{source}->{dest}"),
        binding: SenderBinding::Pool,
        filters: FilterPolicy::default(),
    }
}

fn mapping(source_msg: i64, pair: PairId) -> Mapping {
    Mapping {
        source_msg: MsgId(source_msg),
        dest_msg: MsgId(source_msg + 5000),
        pair,
        sender: SenderId(1),
        source_chat: ChatId(100),
        dest_chat: ChatId(200),
        kind: MappingKind::Text,
        has_media: false,
        reply_to_source: None,
        reply_to_dest: None,
    }
}

#[test]
fn test_pair_crud_round_trip() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();
    assert_eq!(pair.source_chat, ChatId(100));
    assert_eq!(pair.status, PairStatus::Active);

    let loaded = store.get_pair(pair.id).unwrap();
    assert_eq!(loaded.name, pair.name);

    let mut updated = loaded.clone();
    updated.status = PairStatus::Inactive;
    updated.filters.blocked_words.insert("spam".into());
    store.update_pair(&updated).unwrap();

    let reloaded = store.get_pair(pair.id).unwrap();
    assert_eq!(reloaded.status, PairStatus::Inactive);
    assert!(reloaded.filters.blocked_words.contains("spam"));
}

#[test]
fn test_duplicate_pair_is_conflict() {
    let store = store();
    store.create_pair(new_pair(100, 200)).unwrap();
    let err = store.create_pair(new_pair(100, 200)).unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");

    // Same source, different destination is fine
    store.create_pair(new_pair(100, 201)).unwrap();
}

#[test]
fn test_source_chat_index() {
    let store = store();
    store.create_pair(new_pair(100, 200)).unwrap();
    store.create_pair(new_pair(100, 201)).unwrap();
    store.create_pair(new_pair(300, 400)).unwrap();

    assert_eq!(store.pairs_by_source_chat(ChatId(100)).len(), 2);
    assert_eq!(store.pairs_by_source_chat(ChatId(300)).len(), 1);
    assert!(store.pairs_by_source_chat(ChatId(999)).is_empty());

    // Index follows deletion
    let pairs = store.list_pairs().unwrap();
    store.delete_pair(pairs[0].id).unwrap();
    assert_eq!(store.pairs_by_source_chat(ChatId(100)).len(), 1);
}

#[test]
fn test_mapping_uniqueness_upsert() {
    // Property: at most one mapping row per (source_msg, pair)
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();

    let mut m = mapping(1, pair.id);
    store.save_mapping(&m).unwrap();

    m.dest_msg = MsgId(7777);
    store.save_mapping(&m).unwrap();

    assert_eq!(store.count_mappings().unwrap(), 1);
    let loaded = store.get_mapping(MsgId(1), pair.id).unwrap().unwrap();
    assert_eq!(loaded.dest_msg, MsgId(7777));
}

#[test]
fn test_delete_pair_cascades_mappings() {
    // Property: after delete_pair(p), no mapping row has pair_id = p
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();
    let other = store.create_pair(new_pair(100, 201)).unwrap();

    store.save_mapping(&mapping(1, pair.id)).unwrap();
    store.save_mapping(&mapping(2, pair.id)).unwrap();
    store.save_mapping(&mapping(1, other.id)).unwrap();

    store.delete_pair(pair.id).unwrap();

    assert!(store.get_mapping(MsgId(1), pair.id).unwrap().is_none());
    assert!(store.get_mapping(MsgId(2), pair.id).unwrap().is_none());
    assert!(store.get_mapping(MsgId(1), other.id).unwrap().is_some());
    assert_eq!(store.count_mappings().unwrap(), 1);
}

#[test]
fn test_same_msg_id_different_pairs() {
    let store = store();
    let a = store.create_pair(new_pair(100, 200)).unwrap();
    let b = store.create_pair(new_pair(100, 201)).unwrap();

    store.save_mapping(&mapping(1, a.id)).unwrap();
    store.save_mapping(&mapping(1, b.id)).unwrap();
    assert_eq!(store.count_mappings().unwrap(), 2);
}

#[test]
fn test_sender_lifecycle() {
    let store = store();
    let s = store.add_sender("relay_bot_1", "secret-token").unwrap();
    assert!(s.enabled);
    assert_eq!(s.usage_count, 0);

    assert!(!store.toggle_sender(s.id).unwrap());
    assert!(store.toggle_sender(s.id).unwrap());

    assert_eq!(store.list_senders(true).unwrap().len(), 1);
    store.toggle_sender(s.id).unwrap();
    assert!(store.list_senders(true).unwrap().is_empty());
    assert_eq!(store.list_senders(false).unwrap().len(), 1);

    store.record_sender_use(s.id, Utc::now()).unwrap();
    let reloaded = store.get_sender(s.id).unwrap();
    assert_eq!(reloaded.usage_count, 1);
    assert!(reloaded.last_used_at.is_some());

    store.delete_sender(s.id).unwrap();
    assert!(store.get_sender(s.id).is_err());
}

#[test]
fn test_duplicate_sender_handle_is_conflict() {
    let store = store();
    store.add_sender("bot", "t1").unwrap();
    assert!(store.add_sender("bot", "t2").unwrap_err().is_conflict());
}

#[test]
fn test_blocked_words_scopes() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();

    store.add_blocked_word("Promo", None).unwrap();
    store.add_blocked_word("pump", Some(pair.id)).unwrap();

    let (global, pair_words) = store.blocked_words_for(pair.id);
    assert_eq!(global.as_slice(), ["promo"]);
    assert_eq!(pair_words, ["pump"]);

    // Another pair sees only the global word
    let other = store.create_pair(new_pair(300, 400)).unwrap();
    let (global, pair_words) = store.blocked_words_for(other.id);
    assert_eq!(global.as_slice(), ["promo"]);
    assert!(pair_words.is_empty());

    assert!(store.remove_blocked_word("promo", None).unwrap());
    assert!(!store.remove_blocked_word("promo", None).unwrap());
    assert!(store.global_blocked_words().is_empty());
}

#[test]
fn test_seed_global_words_is_idempotent() {
    let store = store();
    let words = vec!["spam".to_string(), "promo".to_string()];
    store.seed_global_words(&words).unwrap();
    store.seed_global_words(&words).unwrap();
    assert_eq!(store.global_blocked_words().len(), 2);
}

#[test]
fn test_blocked_image_hamming_lookup() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();

    let base: u64 = 0xAAAA_BBBB_CCCC_DDDD;
    store.block_image(base, None, 5, "test").unwrap();

    // 3 bits away: blocked
    let near = base ^ 0b0111;
    assert!(store.lookup_blocked(near, pair.id).is_some());

    // 7 bits away: allowed
    let far = base ^ 0x7F;
    assert!(store.lookup_blocked(far, pair.id).is_none());
}

#[test]
fn test_blocked_image_pair_scope() {
    let store = store();
    let a = store.create_pair(new_pair(100, 200)).unwrap();
    let b = store.create_pair(new_pair(100, 201)).unwrap();

    let hash: u64 = 42;
    let entry = store.block_image(hash, Some(a.id), 5, "").unwrap();
    assert_eq!(entry.scope, BlockScope::Pair);

    assert!(store.lookup_blocked(hash, a.id).is_some());
    assert!(store.lookup_blocked(hash, b.id).is_none());

    store.bump_image_usage(entry.id).unwrap();
    let listed = store.list_blocked_images(Some(a.id)).unwrap();
    assert_eq!(listed.len(), 1);

    assert!(store.unblock_image(hash, Some(a.id)).unwrap());
    assert!(store.lookup_blocked(hash, a.id).is_none());
}

#[test]
fn test_global_block_beats_pair_block_on_tie() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();

    store.block_image(7, Some(pair.id), 5, "pair entry").unwrap();
    store.block_image(7, None, 5, "global entry").unwrap();

    let hit = store.lookup_blocked(7, pair.id).unwrap();
    assert_eq!(hit.scope, BlockScope::Global);
}

#[test]
fn test_subscription_lifecycle() {
    let store = store();
    let user = UserId(5001);

    let sub = store.add_subscription(user, 30, UserId(1), "monthly").unwrap();
    assert!(sub.expires_at > Utc::now() + Duration::days(29));

    let renewed = store.renew_subscription(user, 30).unwrap();
    assert!(renewed.expires_at > Utc::now() + Duration::days(59));

    assert!(store
        .expired_subscriptions(Utc::now())
        .unwrap()
        .is_empty());
    let future = Utc::now() + Duration::days(61);
    assert_eq!(store.expired_subscriptions(future).unwrap().len(), 1);

    assert!(store.delete_subscription(user).unwrap());
    assert!(!store.delete_subscription(user).unwrap());
}

#[test]
fn test_settings_and_pause() {
    let store = store();
    assert!(store.get_setting("nope").unwrap().is_none());

    store.set_setting("k", "v1").unwrap();
    store.set_setting("k", "v2").unwrap();
    assert_eq!(store.get_setting("k").unwrap().as_deref(), Some("v2"));

    assert!(!store.is_paused().unwrap());
    store.set_paused(true).unwrap();
    assert!(store.is_paused().unwrap());
    store.set_paused(false).unwrap();
    assert!(!store.is_paused().unwrap());
}

#[test]
fn test_pair_stats_bump() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();

    store.bump_pair_stats(pair.id, StatDelta::copied()).unwrap();
    store
        .bump_pair_stats(pair.id, StatDelta::filtered(true))
        .unwrap();

    let loaded = store.get_pair(pair.id).unwrap();
    assert_eq!(loaded.stats.messages_copied, 1);
    assert_eq!(loaded.stats.messages_filtered, 1);
    assert_eq!(loaded.stats.words_blocked, 1);
    assert!(loaded.stats.last_activity.is_some());
}

#[test]
fn test_error_log_and_summary() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();
    store.save_mapping(&mapping(1, pair.id)).unwrap();
    store
        .log_error("permanent", "chat not found", Some(pair.id), None)
        .unwrap();

    let summary = store.summary(Utc::now()).unwrap();
    assert_eq!(summary.total_pairs, 1);
    assert_eq!(summary.active_pairs, 1);
    assert_eq!(summary.total_mappings, 1);
    assert_eq!(summary.mappings_24h, 1);
    assert_eq!(summary.errors_24h, 1);
}

#[test]
fn test_cleanup_respects_recency() {
    let store = store();
    let pair = store.create_pair(new_pair(100, 200)).unwrap();
    store.save_mapping(&mapping(1, pair.id)).unwrap();
    store.log_error("transient", "timeout", None, None).unwrap();
    store.block_image(99, None, 5, "").unwrap();

    // Everything is fresh; nothing qualifies
    let report = store.cleanup(30).unwrap();
    assert_eq!(report, CleanupReport::default());
}

#[test]
fn test_backup_to_sibling_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.db");
    let store = Store::open(&path).unwrap();
    store.create_pair(new_pair(100, 200)).unwrap();

    let backup_path = store.backup().unwrap();
    assert!(backup_path.exists());

    // The backup is a working database with the same content
    let restored = Store::open(&backup_path).unwrap();
    assert_eq!(restored.list_pairs().unwrap().len(), 1);
}

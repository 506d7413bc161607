//! Store behavior tests: count invariants, cascade deletes, search,
//! stats, cleanup cutoffs, and backup snapshots.

use ccsdk_store::{Database, MessageType, NewMessage, SessionPatch};
use serde_json::json;

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn user_message(session_id: &str, content: &str, ts: i64) -> NewMessage {
    NewMessage {
        content: Some(content.into()),
        ..NewMessage::new(session_id, MessageType::User, ts)
    }
}

#[test]
fn create_and_get_session() {
    let db = db();
    db.create_session("s-1", 1000, Some(&json!({"origin": "ws"})))
        .unwrap();

    let rec = db.get_session("s-1").unwrap().unwrap();
    assert_eq!(rec.id, "s-1");
    assert_eq!(rec.created_at, 1000);
    assert_eq!(rec.last_activity, 1000);
    assert_eq!(rec.message_count, 0);
    assert!(rec.is_active);
    assert_eq!(rec.metadata.unwrap()["origin"], "ws");

    assert!(db.get_session("nope").unwrap().is_none());
}

#[test]
fn duplicate_session_id_is_a_store_error() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();
    assert!(db.create_session("s-1", 2000, None).is_err());
}

#[test]
fn append_keeps_message_count_consistent() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();

    for i in 0..5 {
        db.append_message(&user_message("s-1", &format!("m{i}"), 1000 + i))
            .unwrap();
    }

    let rec = db.get_session("s-1").unwrap().unwrap();
    assert_eq!(rec.message_count, 5);
    assert_eq!(rec.last_activity, 1004);
    assert_eq!(db.list_messages("s-1", 100).unwrap().len(), 5);
}

#[test]
fn append_to_missing_session_fails_foreign_key() {
    let db = db();
    assert!(db.append_message(&user_message("ghost", "x", 1)).is_err());
}

#[test]
fn message_ids_strictly_increase_in_insertion_order() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();

    let mut last_id = 0;
    for i in 0..10 {
        let id = db
            .append_message(&user_message("s-1", "m", 1000 + i))
            .unwrap();
        assert!(id > last_id);
        last_id = id;
    }

    let messages = db.list_messages("s-1", 100).unwrap();
    let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[test]
fn update_session_patch_is_partial() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();

    db.update_session(
        "s-1",
        &SessionPatch {
            engine_session_id: Some("eng-1".into()),
            ..SessionPatch::default()
        },
    )
    .unwrap();
    db.update_session(
        "s-1",
        &SessionPatch {
            is_active: Some(false),
            last_activity: Some(2000),
            ..SessionPatch::default()
        },
    )
    .unwrap();

    let rec = db.get_session("s-1").unwrap().unwrap();
    assert_eq!(rec.engine_session_id.as_deref(), Some("eng-1"));
    assert!(!rec.is_active);
    assert_eq!(rec.last_activity, 2000);
    assert_eq!(rec.created_at, 1000);
}

#[test]
fn update_missing_session_is_not_found() {
    let db = db();
    let err = db
        .update_session("ghost", &SessionPatch::default())
        .unwrap_err();
    assert!(matches!(err, ccsdk_domain::Error::NotFound(_)));
}

#[test]
fn delete_cascades_to_messages() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();
    for i in 0..10 {
        db.append_message(&user_message("s-1", "m", 1000 + i))
            .unwrap();
    }

    assert!(db.delete_session("s-1").unwrap());
    assert!(db.get_session("s-1").unwrap().is_none());
    assert!(db.list_messages("s-1", 100).unwrap().is_empty());
    assert!(!db.delete_session("s-1").unwrap());
}

#[test]
fn list_sessions_orders_by_activity_desc() {
    let db = db();
    db.create_session("old", 1000, None).unwrap();
    db.create_session("mid", 2000, None).unwrap();
    db.create_session("new", 3000, None).unwrap();

    let all = db.list_sessions(10, 0).unwrap();
    let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);

    let page = db.list_sessions(1, 1).unwrap();
    assert_eq!(page[0].id, "mid");
}

#[test]
fn active_sessions_filter() {
    let db = db();
    db.create_session("a", 1000, None).unwrap();
    db.create_session("b", 2000, None).unwrap();
    db.update_session(
        "a",
        &SessionPatch {
            is_active: Some(false),
            ..SessionPatch::default()
        },
    )
    .unwrap();

    let active = db.list_active_sessions().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "b");
}

#[test]
fn search_finds_substrings_newest_first() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();
    db.append_message(&user_message("s-1", "fix the parser bug", 1000))
        .unwrap();
    db.append_message(&user_message("s-1", "unrelated", 2000))
        .unwrap();
    db.append_message(&user_message("s-1", "parser is still broken", 3000))
        .unwrap();

    let hits = db.search_messages("parser", 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].timestamp, 3000);
    assert_eq!(hits[1].timestamp, 1000);

    assert!(db.search_messages("nomatch", 10).unwrap().is_empty());
}

#[test]
fn stats_totals_and_breakdown() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();
    db.create_session("s-2", 1000, None).unwrap();
    db.update_session(
        "s-2",
        &SessionPatch {
            is_active: Some(false),
            ..SessionPatch::default()
        },
    )
    .unwrap();

    db.append_message(&user_message("s-1", "hi", 1000)).unwrap();
    db.append_message(&NewMessage {
        content: Some("hello".into()),
        ..NewMessage::new("s-1", MessageType::Assistant, 1001)
    })
    .unwrap();
    db.append_message(&NewMessage {
        subtype: Some("success".into()),
        cost: Some(0.03),
        duration: Some(1500),
        ..NewMessage::new("s-1", MessageType::Result, 1002)
    })
    .unwrap();
    db.append_message(&NewMessage {
        subtype: Some("success".into()),
        cost: Some(0.01),
        ..NewMessage::new("s-2", MessageType::Result, 1003)
    })
    .unwrap();

    let stats = db.stats().unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.total_messages, 4);
    assert!((stats.total_cost - 0.04).abs() < 1e-9);
    assert_eq!(stats.messages_by_type["user"], 1);
    assert_eq!(stats.messages_by_type["assistant"], 1);
    assert_eq!(stats.messages_by_type["result"], 2);
}

#[test]
fn cleanup_removes_only_old_inactive_sessions() {
    let db = db();
    let now = chrono::Utc::now().timestamp_millis();
    let ninety_days_ago = now - 90 * 24 * 60 * 60 * 1000;

    // Old + inactive: reclaimed.
    db.create_session("old-idle", ninety_days_ago, None).unwrap();
    db.update_session(
        "old-idle",
        &SessionPatch {
            is_active: Some(false),
            ..SessionPatch::default()
        },
    )
    .unwrap();

    // Old but still active: kept.
    db.create_session("old-active", ninety_days_ago, None).unwrap();

    // Recent + inactive: kept.
    db.create_session("recent", now, None).unwrap();
    db.update_session(
        "recent",
        &SessionPatch {
            is_active: Some(false),
            ..SessionPatch::default()
        },
    )
    .unwrap();

    let removed = db.cleanup_old_sessions(30).unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_session("old-idle").unwrap().is_none());
    assert!(db.get_session("old-active").unwrap().is_some());
    assert!(db.get_session("recent").unwrap().is_some());
}

#[test]
fn backup_produces_a_readable_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("live.db")).unwrap();
    db.create_session("s-1", 1000, None).unwrap();
    db.append_message(&user_message("s-1", "hi", 1000)).unwrap();

    let backup_path = dir.path().join("snapshots/backup.db");
    db.backup(&backup_path).unwrap();

    let restored = Database::open(&backup_path).unwrap();
    let rec = restored.get_session("s-1").unwrap().unwrap();
    assert_eq!(rec.message_count, 1);
    assert_eq!(restored.list_messages("s-1", 10).unwrap().len(), 1);
}

#[test]
fn client_rows_track_connect_subscribe_disconnect() {
    let db = db();
    db.create_session("s-1", 1000, None).unwrap();

    db.record_client_connect("c-1", 5000).unwrap();
    let rec = db.get_client("c-1").unwrap().unwrap();
    assert_eq!(rec.connected_at, 5000);
    assert!(rec.disconnected_at.is_none());
    assert!(rec.current_session_id.is_none());

    db.update_client_session("c-1", Some("s-1")).unwrap();
    let rec = db.get_client("c-1").unwrap().unwrap();
    assert_eq!(rec.current_session_id.as_deref(), Some("s-1"));

    db.record_client_disconnect("c-1", 6000).unwrap();
    let rec = db.get_client("c-1").unwrap().unwrap();
    assert_eq!(rec.disconnected_at, Some(6000));
    assert!(rec.current_session_id.is_none());
}

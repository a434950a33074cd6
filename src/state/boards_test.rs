use serde_json::{Value, json};

use super::*;

fn record(name: &str, stamp: u64) -> Value {
    json!({
        "data": { "blocks": [], "version": "2.18.0", "time": stamp },
        "meta": { "name": name, "stamp": stamp, "cover": "", "coverBg": {} },
    })
}

fn snapshot(children: &[(&str, Value)]) -> Snapshot {
    let map: serde_json::Map<String, Value> = children.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
    Snapshot::from_value(&Value::Object(map))
}

fn keys(state: &BoardsState) -> Vec<String> {
    state.boards.iter().map(|b| b.key.clone()).collect()
}

// =============================================================
// BoardList
// =============================================================

#[test]
fn board_list_defaults_empty() {
    let list = BoardList::default();
    assert!(list.is_empty());
    assert_eq!(list.len(), 0);
    assert!(list.get("x").is_none());
}

#[test]
fn upsert_reports_new_keys_and_replaces_existing() {
    let mut list = BoardList::default();
    assert!(list.upsert(Board::template("a")));
    let mut renamed = Board::template("a");
    renamed.meta.name = "Renamed".into();
    assert!(!list.upsert(renamed));
    assert_eq!(list.len(), 1);
    assert_eq!(list.get("a").unwrap().meta.name, "Renamed");
}

#[test]
fn remove_drops_entry_and_index() {
    let mut list = BoardList::default();
    list.upsert(Board::template("a"));
    list.upsert(Board::template("b"));
    assert!(list.remove("a").is_some());
    assert!(list.remove("a").is_none());
    assert_eq!(list.to_vec().iter().map(|b| b.key.as_str()).collect::<Vec<_>>(), vec!["b"]);
}

#[test]
fn resort_orders_by_stamp_descending_and_is_stable() {
    let mut list = BoardList::default();
    for (key, stamp) in [("a", 10.0), ("b", 30.0), ("c", 10.0), ("d", 20.0)] {
        let mut board = Board::template(key);
        board.meta.stamp = stamp;
        list.upsert(board);
    }
    list.resort();
    let order: Vec<&str> = list.iter().map(|b| b.key.as_str()).collect();
    assert_eq!(order, vec!["b", "d", "a", "c"]);
}

// =============================================================
// apply_snapshot
// =============================================================

#[test]
fn status_moves_init_to_stale_on_first_snapshot() {
    let mut state = BoardsState::default();
    assert_eq!(state.status, SyncStatus::Init);
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    assert_eq!(state.status, SyncStatus::Stale);
}

#[test]
fn empty_first_snapshot_still_reaches_stale() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&Snapshot::default());
    assert_eq!(state.status, SyncStatus::Stale);
    assert!(state.boards.is_empty());
}

#[test]
fn status_never_regresses_after_stale() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    for stamp in [200, 300] {
        state.apply_snapshot(&snapshot(&[("b1", record("One", stamp))]));
        assert_eq!(state.status, SyncStatus::Stale);
    }
}

#[test]
fn later_snapshot_replaces_record_for_same_key() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    state.apply_snapshot(&snapshot(&[("b1", record("One v2", 200))]));

    assert_eq!(state.boards.len(), 1);
    let b1 = state.boards.get("b1").unwrap();
    assert_eq!(b1.meta.name, "One v2");
    assert!((b1.meta.stamp - 200.0).abs() < f64::EPSILON);
}

#[test]
fn ordering_is_recomputed_after_each_snapshot() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100)), ("b2", record("Two", 150))]));
    assert_eq!(keys(&state), vec!["b2", "b1"]);

    state.apply_snapshot(&snapshot(&[("b1", record("One", 200)), ("b2", record("Two", 150))]));
    assert_eq!(keys(&state), vec!["b1", "b2"]);
}

#[test]
fn keys_missing_from_later_snapshot_are_kept() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100)), ("b2", record("Two", 50))]));
    state.apply_snapshot(&snapshot(&[("b2", record("Two", 60))]));
    assert_eq!(keys(&state), vec!["b1", "b2"]);
}

#[test]
fn undecodable_children_are_skipped() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("bad", json!("oops")), ("b1", record("One", 1))]));
    assert_eq!(keys(&state), vec!["b1"]);
    assert_eq!(state.status, SyncStatus::Stale);
}

#[test]
fn equal_stamps_keep_prior_order_with_new_keys_last() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("m", record("M", 5))]));
    state.apply_snapshot(&snapshot(&[("a", record("A", 5)), ("m", record("M", 5)), ("z", record("Z", 5))]));
    assert_eq!(keys(&state), vec!["m", "a", "z"]);
}

// =============================================================
// reset / lookup
// =============================================================

#[test]
fn reset_clears_boards_status_and_pending_board() {
    let mut state = BoardsState::default();
    state.new_board = Some("n1".into());
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    state.mark_deleted("b1");
    state.ended = true;
    state.reset();
    assert!(state.boards.is_empty());
    assert_eq!(state.status, SyncStatus::Init);
    assert!(state.new_board.is_none());
    assert!(state.deleted.is_empty());
    assert!(!state.ended);
}

#[test]
fn board_or_default_falls_back_to_template() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    assert_eq!(state.board_or_default("b1").meta.name, "One");

    let fallback = state.board_or_default("nope");
    assert_eq!(fallback.key, "nope");
    assert_eq!(fallback.meta.name, "Untitled");
}

#[test]
fn is_missing_requires_stale_absent_and_not_pending() {
    let mut state = BoardsState::default();
    assert!(!state.is_missing("x"), "not before the first snapshot");

    state.apply_snapshot(&snapshot(&[("b1", record("One", 100))]));
    assert!(!state.is_missing("b1"));
    assert!(state.is_missing("x"));

    state.new_board = Some("x".into());
    assert!(!state.is_missing("x"));
    assert!(state.is_missing("y"));
}

#[test]
fn deleted_board_is_evicted_but_not_missing() {
    let mut state = BoardsState::default();
    state.apply_snapshot(&snapshot(&[("b1", record("One", 100)), ("b2", record("Two", 200))]));

    state.mark_deleted("b1");
    assert_eq!(keys(&state), vec!["b2"]);
    assert!(!state.is_missing("b1"));
    assert!(state.is_missing("b3"));
}

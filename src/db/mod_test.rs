use serde_json::json;

use super::*;

#[test]
fn paths_follow_user_scoped_convention() {
    assert_eq!(user_boards_path("u1"), "Users/u1/Boards");
    assert_eq!(board_path("u1", "b9"), "Users/u1/Boards/b9");
}

#[test]
fn snapshot_children_are_key_ordered_and_skip_nulls() {
    let snap = Snapshot::from_value(&json!({
        "b2": { "n": 2 },
        "a1": { "n": 1 },
        "gone": null,
    }));
    let keys: Vec<&str> = snap.children().iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["a1", "b2"]);
    assert_eq!(snap.children()[1].value, json!({ "n": 2 }));
}

#[test]
fn snapshot_of_scalar_or_null_is_empty() {
    assert!(Snapshot::from_value(&json!(null)).is_empty());
    assert!(Snapshot::from_value(&json!(7)).is_empty());
}

#[tokio::test]
async fn listener_off_ends_stream() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut listener = Listener::new(rx, None);

    tx.send(Snapshot::default()).unwrap();
    assert!(listener.next().await.is_some());

    listener.off();
    assert!(tx.send(Snapshot::default()).is_err());
    assert!(listener.next().await.is_none());
}

#[tokio::test]
async fn listener_drop_aborts_task() {
    let (_tx, rx) = mpsc::unbounded_channel();
    let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let _alive = alive_tx;
        std::future::pending::<()>().await;
    });

    drop(Listener::new(rx, Some(task)));

    // The sender is dropped with the aborted future.
    let closed = tokio::time::timeout(std::time::Duration::from_millis(200), alive_rx)
        .await
        .expect("task was not aborted");
    assert!(closed.is_err());
}

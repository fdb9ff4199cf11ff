// Persistence tests — state survives close/reopen on the durable engines.

use hookstate_core::{StateConfig, StateError, StateStore};
use serde_json::{Value, json};
use std::fs;
use tempfile::tempdir;

#[test]
fn sqlite_counter_scenario() {
    let dir = tempdir().unwrap();
    let store = StateStore::open(&StateConfig::sqlite(dir.path().join("hooks.db"))).unwrap();

    for _ in 0..3 {
        store.incr("counter").unwrap();
    }

    assert_eq!(store.get::<i64>("counter").unwrap(), Some(3));
    assert!(store.keys().unwrap().contains(&"counter".to_string()));
    store.close().unwrap();
}

#[test]
fn file_store_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let store = StateStore::open_file(&path).unwrap();
    store.set("a", &json!({"x": 1})).unwrap();
    drop(store);

    let reopened = StateStore::open_file(&path).unwrap();
    assert_eq!(reopened.get::<Value>("a").unwrap(), Some(json!({"x": 1})));
}

#[test]
fn round_trip_after_close_for_durable_backends() {
    let dir = tempdir().unwrap();
    let configs = [
        StateConfig::file(dir.path().join("state.json")),
        StateConfig::sqlite(dir.path().join("state.db")),
    ];

    for config in &configs {
        let store = StateStore::open(config).unwrap();
        let session = store.namespace("session-1").unwrap();
        store.set("greeting", "hello").unwrap();
        session.increment("turns", 4).unwrap();
        session.append("tools", "Read").unwrap();
        session.append("tools", "Edit").unwrap();
        store.close().unwrap();

        let store = StateStore::open(config).unwrap();
        let session = store.namespace("session-1").unwrap();
        assert_eq!(store.get::<String>("greeting").unwrap().as_deref(), Some("hello"));
        assert_eq!(session.get::<i64>("turns").unwrap(), Some(4));
        assert_eq!(
            session.get::<Vec<String>>("tools").unwrap(),
            Some(vec!["Read".to_string(), "Edit".to_string()])
        );
        assert_eq!(session.keys().unwrap(), vec!["tools", "turns"]);
        assert_eq!(store.keys().unwrap(), vec!["greeting"]);
        store.close().unwrap();
    }
}

#[test]
fn file_format_uses_qualified_keys_and_value_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = StateStore::open_file(&path).unwrap();
    store.set("top", &1).unwrap();
    store.namespace("s").unwrap().set("inner", "v").unwrap();
    store.close().unwrap();

    let document: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let object = document.as_object().unwrap();
    let mut keys: Vec<&String> = object.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["s:inner", "top"]);
    assert_eq!(document["top"]["value"], json!(1));
    assert_eq!(document["s:inner"]["value"], json!("v"));
}

#[test]
fn corrupt_file_is_reported_not_reset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    fs::write(&path, "[1, 2,").unwrap();

    let err = StateStore::open(&StateConfig::file(&path)).err().unwrap();
    assert!(matches!(err, StateError::CorruptData(_)), "{err}");
    assert_eq!(fs::read_to_string(&path).unwrap(), "[1, 2,");
}

#[test]
fn file_written_by_another_store_is_picked_up_on_mutation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let first = StateStore::open_file(&path).unwrap();
    let second = StateStore::open_file(&path).unwrap();

    first.set("from_first", &1).unwrap();
    second.set("from_second", &2).unwrap();

    // the second store reloaded the document before rewriting it
    assert_eq!(second.get::<i64>("from_first").unwrap(), Some(1));
    let third = StateStore::open_file(&path).unwrap();
    assert_eq!(third.keys().unwrap(), vec!["from_first", "from_second"]);
}

#[test]
fn sqlite_connections_share_one_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");
    let first = StateStore::open_sqlite(&path).unwrap();
    let second = StateStore::open_sqlite(&path).unwrap();

    first.incr("hits").unwrap();
    second.incr("hits").unwrap();
    assert_eq!(first.get::<i64>("hits").unwrap(), Some(2));
}

#[test]
fn flush_is_safe_on_every_backend() {
    let dir = tempdir().unwrap();
    for config in [
        StateConfig::memory(),
        StateConfig::file(dir.path().join("f.json")),
        StateConfig::sqlite(dir.path().join("f.db")),
    ] {
        let store = StateStore::open(&config).unwrap();
        store.set("k", &1).unwrap();
        store.flush().unwrap();
        assert_eq!(store.get::<i64>("k").unwrap(), Some(1));
    }
}

#[test]
fn memory_store_forgets_on_close() {
    let store = StateStore::open(&StateConfig::memory()).unwrap();
    store.set("k", &1).unwrap();
    store.close().unwrap();

    let fresh = StateStore::open(&StateConfig::memory()).unwrap();
    assert_eq!(fresh.get::<i64>("k").unwrap(), None);
}

#[test]
fn closed_store_rejects_every_view_operation() {
    let dir = tempdir().unwrap();
    let store = StateStore::open_sqlite(dir.path().join("state.db")).unwrap();
    let view = store.namespace("n").unwrap();
    store.close().unwrap();

    assert!(matches!(view.set("k", &1), Err(StateError::ClosedStoreUse)));
    assert!(matches!(view.get::<i64>("k"), Err(StateError::ClosedStoreUse)));
    assert!(matches!(view.incr("k"), Err(StateError::ClosedStoreUse)));
    assert!(matches!(view.append("k", &1), Err(StateError::ClosedStoreUse)));
    assert!(matches!(view.clear(), Err(StateError::ClosedStoreUse)));
    assert!(matches!(view.delete("k"), Err(StateError::ClosedStoreUse)));
}

#[test]
fn config_from_json_opens_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.db");
    let raw = json!({"storage": "sqlite", "path": path}).to_string();
    let config = StateConfig::from_json(&raw).unwrap();
    let store = StateStore::open(&config).unwrap();
    store.set("k", "v").unwrap();
    store.close().unwrap();
    assert!(path.exists());
}

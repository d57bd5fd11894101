use super::*;
use serde_json::json;

fn scratch_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("wavecast_store_{tag}_{}_{nanos}", std::process::id()))
}

#[test]
fn json_store_round_trips_records_across_instances() {
    let dir = scratch_dir("roundtrip");
    let mut store = JsonFileStore::new(&dir);
    store.open().unwrap();
    assert_eq!(store.read("session").unwrap(), None);

    let record = json!({"effects": [{"type": "background", "id": "bg"}], "fps": 30});
    store.write("session", &record).unwrap();
    store.close();

    let mut reopened = JsonFileStore::new(&dir);
    reopened.open().unwrap();
    assert_eq!(reopened.read("session").unwrap(), Some(record));
    assert!(!dir.join("session.json.tmp").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reads_and_writes_require_an_open_store() {
    let dir = scratch_dir("closed");
    let mut store = JsonFileStore::new(&dir);
    let err = store.read("session").unwrap_err();
    assert!(matches!(err, WavecastError::Settings(_)), "{err}");
    assert!(store.write("session", &json!({})).is_err());

    store.open().unwrap();
    store.close();
    store.close();
    assert!(!store.is_open());
    assert!(store.read("session").is_err());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn keys_that_escape_the_directory_are_rejected() {
    let mut store = MemoryStore::new();
    store.open().unwrap();
    for key in ["", "../x", "a/b", "a.b"] {
        assert!(store.write(key, &json!(1)).is_err(), "{key:?}");
    }
    assert!(store.is_empty());
}

#[test]
fn corrupt_records_are_reported() {
    let dir = scratch_dir("corrupt");
    let mut store = JsonFileStore::new(&dir);
    store.open().unwrap();
    std::fs::write(dir.join("session.json"), "{not json").unwrap();
    let err = store.read("session").unwrap_err();
    assert!(matches!(err, WavecastError::Settings(_)), "{err}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn memory_store_keeps_records_while_closed() {
    let mut store = MemoryStore::new();
    store.open().unwrap();
    store.write("session", &json!({"a": 1})).unwrap();
    store.close();
    assert!(store.read("session").is_err());
    store.open().unwrap();
    assert_eq!(store.read("session").unwrap(), Some(json!({"a": 1})));
    assert_eq!(store.len(), 1);
}

#[test]
fn default_dir_is_namespaced() {
    if let Some(dir) = JsonFileStore::default_dir() {
        assert!(dir.ends_with("wavecast"));
    }
}

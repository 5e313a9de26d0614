use super::*;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper function to create a temporary storage engine
fn create_test_engine(policy: CachePolicy, capacity: usize) -> (StorageEngine, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let engine = StorageEngine::open(temp_dir.path(), policy, capacity)
        .expect("Failed to open test storage");
    (engine, temp_dir)
}

fn read_storage_file(dir: &Path) -> Vec<String> {
    let mut lines: Vec<String> = fs::read_to_string(dir.join(STORAGE_FILE))
        .expect("Failed to read storage file")
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

#[test]
fn test_open_creates_empty_file() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Fifo, 3);

    assert!(engine.is_empty());
    assert!(temp_dir.path().join(STORAGE_FILE).exists());
    assert_eq!(engine.storage_path(), temp_dir.path().join(STORAGE_FILE));
}

#[test]
fn test_open_rejects_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope");

    let result = StorageEngine::open(&missing, CachePolicy::Lru, 3);
    assert!(matches!(result, Err(StorageError::InvalidStorageDir(p)) if p == missing));
}

#[test]
fn test_unwritten_key_is_not_found() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Lru, 3);
    assert_eq!(engine.get("ghost"), None);
    assert!(!engine.in_storage("ghost"));
    assert!(!engine.in_cache("ghost"));
}

#[test]
fn test_put_then_get() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Fifo, 3);

    engine.put("k", Some("v1")).unwrap();
    assert_eq!(engine.get("k"), Some("v1".to_string()));
    assert!(engine.in_storage("k"));
    assert!(engine.in_cache("k"));

    engine.put("k", Some("v2")).unwrap();
    assert_eq!(engine.get("k"), Some("v2".to_string()));
    assert_eq!(engine.len(), 1);
}

#[test]
fn test_delete_removes_from_store_and_cache() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Lfu, 3);

    engine.put("k", Some("v")).unwrap();
    engine.put("k", None).unwrap();

    assert_eq!(engine.get("k"), None);
    assert!(!engine.in_storage("k"));
    assert!(!engine.in_cache("k"));
    assert!(read_storage_file(temp_dir.path()).is_empty());
}

#[test]
fn test_null_sentinel_deletes() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Fifo, 3);

    engine.put("k", Some("v")).unwrap();
    engine.put("k", Some("null")).unwrap();
    assert_eq!(engine.get("k"), None);
}

#[test]
fn test_delete_of_absent_key_leaves_storage_unchanged() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Fifo, 3);
    engine.put("a", Some("1")).unwrap();

    engine.put("missing", None).unwrap();
    assert_eq!(engine.len(), 1);
    assert_eq!(read_storage_file(temp_dir.path()), vec!["a,1"]);
}

#[test]
fn test_storage_hit_does_not_warm_cache() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Fifo, 1);

    engine.put("a", Some("1")).unwrap();
    engine.put("b", Some("2")).unwrap();
    assert!(!engine.in_cache("a"));

    assert_eq!(engine.get("a"), Some("1".to_string()));
    assert!(!engine.in_cache("a"));

    let stats = engine.stats();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.storage_hits, 1);
    assert_eq!(stats.evictions, 1);

    assert_eq!(engine.get("b"), Some("2".to_string()));
    assert_eq!(engine.stats().cache_hits, 1);
}

#[test]
fn test_disabled_cache_serves_from_store() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::None, 10);

    engine.put("a", Some("1")).unwrap();
    assert!(!engine.in_cache("a"));
    assert_eq!(engine.get("a"), Some("1".to_string()));

    let stats = engine.stats();
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(stats.cache_misses, 0);
    assert_eq!(stats.storage_hits, 1);
}

#[test]
fn test_cache_stays_within_capacity_and_store_keeps_everything() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Lru, 2);

    for i in 0..10 {
        engine.put(&format!("k{}", i), Some("v")).unwrap();
    }

    let stats = engine.stats();
    assert_eq!(stats.keys, 10);
    assert_eq!(stats.cached_keys, 2);
    assert!(engine.in_cache("k8"));
    assert!(engine.in_cache("k9"));
    for i in 0..10 {
        assert_eq!(engine.get(&format!("k{}", i)), Some("v".to_string()));
    }
}

#[test]
fn test_every_mutation_rewrites_snapshot() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Fifo, 3);

    engine.put("a", Some("1")).unwrap();
    engine.put("b", Some("2")).unwrap();
    assert_eq!(read_storage_file(temp_dir.path()), vec!["a,1", "b,2"]);

    engine.put("a", Some("3")).unwrap();
    assert_eq!(read_storage_file(temp_dir.path()), vec!["a,3", "b,2"]);
    assert_eq!(engine.stats().snapshots_written, 3);
    assert!(!temp_dir.path().join("kvstorage.txt.tmp").exists());
}

#[test]
fn test_reopen_restores_data() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = StorageEngine::open(temp_dir.path(), CachePolicy::Lru, 2).unwrap();
        for i in 0..5 {
            engine
                .put(&format!("key{}", i), Some(&format!("value{}", i)))
                .unwrap();
        }
        engine.put("key2", None).unwrap();
    }

    let engine = StorageEngine::open(temp_dir.path(), CachePolicy::Lru, 2).unwrap();
    assert_eq!(engine.len(), 4);
    assert_eq!(engine.get("key0"), Some("value0".to_string()));
    assert_eq!(engine.get("key4"), Some("value4".to_string()));
    assert_eq!(engine.get("key2"), None);
    // Loading never populates the cache
    assert_eq!(engine.stats().cached_keys, 0);
}

#[test]
fn test_load_skips_malformed_lines() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(STORAGE_FILE),
        "good,1\nno-separator\na,b,c\n\nalso,2\n",
    )
    .unwrap();

    let engine = StorageEngine::open(temp_dir.path(), CachePolicy::Fifo, 3).unwrap();
    assert_eq!(engine.len(), 2);
    assert_eq!(engine.get("good"), Some("1".to_string()));
    assert_eq!(engine.get("also"), Some("2".to_string()));
}

#[test]
fn test_clear_cache_keeps_store() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Fifo, 3);
    engine.put("a", Some("1")).unwrap();

    engine.clear_cache();
    assert!(!engine.in_cache("a"));
    assert!(engine.in_storage("a"));
    assert_eq!(engine.get("a"), Some("1".to_string()));
}

#[test]
fn test_clear_storage_empties_memory_and_disk() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Lfu, 3);
    engine.put("a", Some("1")).unwrap();
    engine.put("b", Some("2")).unwrap();

    engine.clear_storage().unwrap();
    assert!(engine.is_empty());
    assert!(!engine.in_cache("a"));
    assert!(read_storage_file(temp_dir.path()).is_empty());
}

#[test]
fn test_set_storage_path() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Fifo, 3);
    let other = TempDir::new().unwrap();

    assert!(engine.set_storage_path(other.path().join("missing")).is_err());

    engine.set_storage_path(other.path()).unwrap();
    engine.put("moved", Some("yes")).unwrap();
    assert_eq!(read_storage_file(other.path()), vec!["moved,yes"]);
}

#[test]
fn test_snapshot_failure_keeps_memory_change() {
    let (engine, _temp_dir) = create_test_engine(CachePolicy::Fifo, 3);
    let doomed = TempDir::new().unwrap();
    engine.set_storage_path(doomed.path()).unwrap();
    let doomed_path = doomed.path().to_path_buf();
    drop(doomed);

    let result = engine.put("k", Some("v"));
    assert!(matches!(result, Err(StorageError::Io(_))));
    assert_eq!(engine.get("k"), Some("v".to_string()));
    assert!(!doomed_path.exists());
}

#[test]
fn test_concurrent_disjoint_puts_all_land() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Lru, 8);
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("t{}-k{}", t, i);
                    engine.put(&key, Some(&key)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len(), 200);
    assert_eq!(read_storage_file(temp_dir.path()).len(), 200);
    assert!(engine.stats().cached_keys <= 8);
}

#[test]
fn test_reads_do_not_wait_for_a_snapshot() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Lru, 2);
    engine.put("cached", Some("1")).unwrap();
    engine.put("stored", Some("2")).unwrap();
    engine.put("evictor", Some("3")).unwrap();

    let _writer = engine.hold_writer();
    assert_eq!(engine.get("stored"), Some("2".to_string()));
    assert_eq!(engine.get("evictor"), Some("3".to_string()));
    assert!(engine.in_storage("cached"));
    assert_eq!(engine.storage_path(), temp_dir.path().join(STORAGE_FILE));
    assert_eq!(engine.stats().keys, 3);
}

#[tokio::test]
async fn test_run_blocking_applies_mutation() {
    let (engine, temp_dir) = create_test_engine(CachePolicy::Fifo, 2);
    let engine = Arc::new(engine);

    engine
        .run_blocking(|engine| engine.put("k", Some("v")))
        .await
        .unwrap();
    assert_eq!(engine.get("k"), Some("v".to_string()));
    assert_eq!(read_storage_file(temp_dir.path()), vec!["k,v"]);

    engine.run_blocking(StorageEngine::clear_storage).await.unwrap();
    assert!(engine.is_empty());
}

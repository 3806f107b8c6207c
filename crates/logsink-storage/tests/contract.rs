//! Contract tests for every LogStore backend
//!
//! Each test runs against the file, SQLite and in-memory stores and checks the
//! guarantees callers rely on: round-trips, ordering, clear semantics and
//! behavior under concurrent access.

use std::collections::HashSet;
use std::sync::Arc;

use logsink_storage::{
    BackendKind, LogStore, OpaqueRecord, Record, StoreConfig, StructuredRecord, TableRecord,
    open_store,
};
use tempfile::TempDir;
use tokio_test::assert_ok;

const BACKENDS: [BackendKind; 3] = [BackendKind::File, BackendKind::Relational, BackendKind::Memory];

async fn open<R: TableRecord>(backend: BackendKind) -> (Arc<dyn LogStore<R>>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        backend,
        log_path: temp_dir.path().join("logs.txt"),
        db_path: temp_dir.path().join("logs.db"),
    };
    let store = open_store::<R>(&config).await.unwrap();
    (store, temp_dir)
}

fn status(service: &str, uptime: u64) -> StructuredRecord {
    StructuredRecord::new(service, "2025-11-24T18:01:54Z", uptime, 500000)
}

fn line(text: &str) -> OpaqueRecord {
    OpaqueRecord::decode(text.as_bytes()).unwrap()
}

// ============================================================================
// Round-trip and ordering
// ============================================================================

#[tokio::test]
async fn test_append_then_list_ends_with_record() {
    for backend in BACKENDS {
        let (store, _temp) = open::<StructuredRecord>(backend).await;

        store.append(status("Service1", 1)).await.unwrap();
        let last = status("Service2", 7200);
        store.append(last.clone()).await.unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records.last(), Some(&last), "backend {}", backend);
    }
}

#[tokio::test]
async fn test_sequential_appends_keep_order() {
    for backend in BACKENDS {
        let (store, _temp) = open::<OpaqueRecord>(backend).await;

        let expected: Vec<_> = (0..100).map(|i| line(&format!("entry {}", i))).collect();
        for record in &expected {
            store.append(record.clone()).await.unwrap();
        }

        assert_eq!(store.list_all().await.unwrap(), expected, "backend {}", backend);
    }
}

#[tokio::test]
async fn test_list_all_does_not_mutate() {
    for backend in BACKENDS {
        let (store, _temp) = open::<OpaqueRecord>(backend).await;
        store.append(line("only")).await.unwrap();

        let first = store.list_all().await.unwrap();
        let second = store.list_all().await.unwrap();
        assert_eq!(first, second, "backend {}", backend);
    }
}

// ============================================================================
// Clear
// ============================================================================

#[tokio::test]
async fn test_clear_is_idempotent() {
    for backend in BACKENDS {
        let (store, _temp) = open::<StructuredRecord>(backend).await;

        assert_ok!(store.clear().await);
        assert!(store.list_all().await.unwrap().is_empty());

        store.append(status("api", 10)).await.unwrap();
        assert_ok!(store.clear().await);
        assert_ok!(store.clear().await);
        assert!(store.list_all().await.unwrap().is_empty(), "backend {}", backend);

        // Usable after clear
        store.append(status("api", 11)).await.unwrap();
        assert_eq!(store.list_all().await.unwrap(), vec![status("api", 11)]);
    }
}

// ============================================================================
// Concurrent Access Tests
// ============================================================================

/// Many tasks appending at once: every record lands exactly once, and each
/// task's own records keep their relative order.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends() {
    for backend in BACKENDS {
        let (store, _temp) = open::<StructuredRecord>(backend).await;
        let mut handles = vec![];

        for task in 0..8 {
            let store_clone = Arc::clone(&store);
            let handle = tokio::spawn(async move {
                let service = format!("service-{}", task);
                for seq in 0..50 {
                    store_clone
                        .append(status(&service, seq))
                        .await
                        .expect("Failed to append");
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.expect("Task panicked");
        }

        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 400, "backend {}", backend);

        let unique: HashSet<_> = records
            .iter()
            .map(|r| (r.service.clone(), r.uptime_seconds))
            .collect();
        assert_eq!(unique.len(), 400, "duplicate records on backend {}", backend);

        for task in 0..8 {
            let service = format!("service-{}", task);
            let uptimes: Vec<u64> = records
                .iter()
                .filter(|r| r.service == service)
                .map(|r| r.uptime_seconds)
                .collect();
            assert_eq!(uptimes, (0..50).collect::<Vec<_>>(), "backend {}", backend);
        }
    }
}

/// Reads racing with appends only ever see whole, decodable records in a
/// growing prefix of the final sequence.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_during_appends_see_prefixes() {
    for backend in BACKENDS {
        let (store, _temp) = open::<OpaqueRecord>(backend).await;

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200 {
                    store.append(line(&format!("record {}", i))).await.unwrap();
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut last_len = 0;
                for _ in 0..50 {
                    let records = store.list_all().await.unwrap();
                    assert!(records.len() >= last_len);
                    for (i, record) in records.iter().enumerate() {
                        assert_eq!(record.as_bytes(), format!("record {}", i).as_bytes());
                    }
                    last_len = records.len();
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.expect("writer panicked");
        reader.await.expect("reader panicked");
        assert_eq!(store.list_all().await.unwrap().len(), 200, "backend {}", backend);
    }
}

/// Clears interleaved with appends never lose an append that completed after
/// the last clear, and never leave a partially cleared sequence.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clear_during_appends() {
    for backend in BACKENDS {
        let (store, _temp) = open::<OpaqueRecord>(backend).await;

        let appender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200 {
                    store.append(line(&format!("record {}", i))).await.unwrap();
                }
            })
        };
        let clearer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..10 {
                    store.clear().await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        appender.await.expect("appender panicked");
        clearer.await.expect("clearer panicked");

        // Whatever survived is a contiguous run ending at the last append.
        let records = store.list_all().await.unwrap();
        let first = 200 - records.len();
        for (offset, record) in records.iter().enumerate() {
            assert_eq!(
                record.as_bytes(),
                format!("record {}", first + offset).as_bytes(),
                "backend {}",
                backend
            );
        }

        // And a final clear always empties it.
        store.clear().await.unwrap();
        store.append(line("fresh")).await.unwrap();
        assert_eq!(store.list_all().await.unwrap(), vec![line("fresh")]);
    }
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_durable_backends_survive_reopen() {
    for backend in [BackendKind::File, BackendKind::Relational] {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend,
            log_path: temp_dir.path().join("logs.txt"),
            db_path: temp_dir.path().join("logs.db"),
        };

        {
            let store = open_store::<StructuredRecord>(&config).await.unwrap();
            store.append(status("Service1", 3600)).await.unwrap();
            store.append(status("Service2", 7200)).await.unwrap();
        }

        let store = open_store::<StructuredRecord>(&config).await.unwrap();
        let records = store.list_all().await.unwrap();
        assert_eq!(
            records,
            vec![status("Service1", 3600), status("Service2", 7200)],
            "backend {}",
            backend
        );
    }
}

#[tokio::test]
async fn test_record_format_constants() {
    assert_eq!(OpaqueRecord::FORMAT.as_str(), "opaque");
    assert_eq!(StructuredRecord::FORMAT.as_str(), "structured");
}

//! Feature flag store integration tests: lazy initialization, fail-open
//! reads, and snapshot freshness against out-of-band writes.

use std::sync::Arc;

use caseflow_engine::flags::{default_values, FLAG_REGISTRY};
use caseflow_engine::{FlagStore, ManualClock, FROZEN_TASKS_ON_STAGE_CHANGE};
use caseflow_storage::testing::InstrumentedStore;
use caseflow_storage::{DocumentStore, FlagChange, MemoryStore};
use time::Duration;

type Store = InstrumentedStore<MemoryStore>;

fn flag_store() -> (Arc<Store>, Arc<ManualClock>, FlagStore<Store>) {
    let store = Arc::new(InstrumentedStore::new(MemoryStore::new()));
    let clock = Arc::new(ManualClock::fixed());
    let flags = FlagStore::new(store.clone(), clock.clone());
    (store, clock, flags)
}

fn out_of_band(value: bool) -> FlagChange {
    FlagChange {
        value,
        changed_by: "console".to_string(),
        changed_at: "2025-01-26T09:00:30Z".to_string(),
    }
}

#[tokio::test]
async fn first_read_creates_document_with_defaults() {
    let (store, _clock, flags) = flag_store();
    assert!(store.inner().get_flag_document().await.unwrap().is_none());

    assert!(!flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);

    let doc = store.inner().get_flag_document().await.unwrap().unwrap();
    assert_eq!(doc.flags, default_values(FLAG_REGISTRY));
    assert_eq!(doc.created_at, "2025-01-26T09:00:00Z");
}

#[tokio::test]
async fn snapshot_hides_out_of_band_writes_until_ttl() {
    let (store, clock, flags) = flag_store();
    flags.initialize().await.unwrap();
    assert!(!flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);

    store
        .inner()
        .update_flag(FROZEN_TASKS_ON_STAGE_CHANGE, out_of_band(true))
        .await
        .unwrap();

    clock.advance(Duration::seconds(30));
    assert!(!flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);

    clock.advance(Duration::seconds(30));
    assert!(flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);
}

#[tokio::test]
async fn one_snapshot_serves_all_reads_within_ttl() {
    let (store, clock, flags) = flag_store();
    flags.initialize().await.unwrap();

    for _ in 0..5 {
        flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await;
        clock.advance(Duration::seconds(5));
    }
    assert_eq!(store.flag_reads(), 1);

    flags.clear_cache().await;
    flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await;
    assert_eq!(store.flag_reads(), 2);
}

#[tokio::test]
async fn failed_read_is_not_cached() {
    let (store, _clock, flags) = flag_store();
    flags
        .set(FROZEN_TASKS_ON_STAGE_CHANGE, true, "admin")
        .await
        .unwrap();

    store.fail_flag_reads(true);
    assert!(!flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);

    store.fail_flag_reads(false);
    assert!(flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);
}

#[tokio::test]
async fn read_in_flight_during_set_does_not_cache_old_value() {
    let store = Arc::new(InstrumentedStore::new(MemoryStore::new()));
    let clock = Arc::new(ManualClock::fixed());
    let flags = Arc::new(FlagStore::new(store.clone(), clock));
    flags.initialize().await.unwrap();

    store.delay_flag_reads(std::time::Duration::from_millis(100));
    let reader = {
        let flags = flags.clone();
        tokio::spawn(async move { flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(store.flag_reads(), 1);

    flags
        .set(FROZEN_TASKS_ON_STAGE_CHANGE, true, "admin")
        .await
        .unwrap();
    assert!(!reader.await.unwrap());

    store.delay_flag_reads(std::time::Duration::ZERO);
    assert!(flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await);
    assert_eq!(store.flag_reads(), 2);
}

#[tokio::test]
async fn short_ttl_store_rereads_sooner() {
    let store = Arc::new(InstrumentedStore::new(MemoryStore::new()));
    let clock = Arc::new(ManualClock::fixed());
    let flags = FlagStore::with_ttl(store.clone(), clock.clone(), Duration::seconds(5));
    flags.initialize().await.unwrap();

    flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await;
    clock.advance(Duration::seconds(5));
    flags.get(FROZEN_TASKS_ON_STAGE_CHANGE).await;
    assert_eq!(store.flag_reads(), 2);
}

//! Runs the backend-agnostic conformance suite against `MemoryStore`.

use caseflow_storage::conformance::run_conformance_suite;
use caseflow_storage::testing::InstrumentedStore;
use caseflow_storage::MemoryStore;

#[tokio::test]
async fn memory_store_conformance() {
    let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn instrumented_store_is_transparent() {
    let report =
        run_conformance_suite(|| async { InstrumentedStore::new(MemoryStore::new()) }).await;
    assert_eq!(report.failed, 0, "{report}");
}

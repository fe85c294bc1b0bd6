//! Conformance test suite for `DocumentStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `DocumentStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Cases**: insert/get, version-checked commits, intent coupling
//! - **Tasks**: queries, single-document updates, batch atomicity and limits
//! - **Flags**: document creation, value updates, append-only history
//! - **Intents**: listing by status, replacement
//! - **Concurrency**: racing compare-and-swap commits on one case
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use caseflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod cases;
mod concurrent;
mod flags;
mod tasks;

use std::fmt;
use std::future::Future;

use crate::record::{
    CaseRecord, FlagDocument, FreezeIntent, FreezeMark, FreezeState, IntentStatus, Service, Stage,
    StageStatus, TaskMutation, TaskRecord, TaskStatus,
};
use crate::DocumentStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "cases", "tasks", "flags").
    pub category: String,
    /// Test name (e.g. "stale_version_conflicts").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(cases::run_case_tests(&factory).await);
    results.extend(tasks::run_task_tests(&factory).await);
    results.extend(flags::run_flag_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_case(id: &str) -> CaseRecord {
    let stage = |id: &str, name: &str, status| Stage {
        id: id.to_string(),
        name: name.to_string(),
        status,
        started_at: None,
        completed_at: None,
    };
    CaseRecord {
        id: id.to_string(),
        services: vec![Service {
            id: "svc-1".to_string(),
            name: "Litigation".to_string(),
            stages: vec![
                stage("stage-a", "Intake", StageStatus::Active),
                stage("stage-b", "Discovery", StageStatus::Pending),
            ],
        }],
        current_stage: Some("stage-a".to_string()),
        current_stage_name: Some("Intake".to_string()),
        stage_changed_at: None,
        stage_changed_by: None,
        updated_at: None,
        version: 0,
    }
}

fn make_task(id: &str, case_id: &str, stage_id: &str, status: TaskStatus) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        case_id: case_id.to_string(),
        stage_id: stage_id.to_string(),
        title: format!("task {id}"),
        status,
        freeze: FreezeState::default(),
        updated_at: None,
    }
}

fn make_freeze() -> TaskMutation {
    TaskMutation::Freeze(FreezeMark {
        reason: "stage_changed".to_string(),
        original_stage: "stage-a".to_string(),
        moved_to_stage: "stage-b".to_string(),
        moved_to_stage_name: "Discovery".to_string(),
        frozen_at: "2025-01-01T00:00:00Z".to_string(),
        intent_id: None,
    })
}

fn make_intent(id: &str, case_id: &str) -> FreezeIntent {
    FreezeIntent {
        id: id.to_string(),
        case_id: case_id.to_string(),
        service_id: "svc-1".to_string(),
        from_stage: "stage-a".to_string(),
        to_stage: "stage-b".to_string(),
        to_stage_name: "Discovery".to_string(),
        requested_by: "tester".to_string(),
        created_at: "2025-01-01T00:00:00Z".to_string(),
        status: IntentStatus::Pending,
        freeze_enabled: true,
        frozen_count: 0,
        attempts: 0,
        completed_at: None,
        last_error: None,
    }
}

fn make_flag_document() -> FlagDocument {
    let mut doc = FlagDocument {
        flags: Default::default(),
        metadata: Default::default(),
        history: Default::default(),
        created_at: "2025-01-01T00:00:00Z".to_string(),
        updated_at: "2025-01-01T00:00:00Z".to_string(),
        last_changed_by: None,
        schema_version: "1.0.0".to_string(),
    };
    doc.flags.insert("FLAG_A".to_string(), false);
    doc
}

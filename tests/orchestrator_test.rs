//! Integration tests for the polling task orchestrator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use perod::orchestrator::{
    ApplyOutcome, OrchestratorError, PollWorkflow, SubmitParams, TaskOrchestrator, TaskStatus,
};

// ── Test workflow ────────────────────────────────────────────────────────────

/// Workflow driven by a pre-scripted sequence of `check` results. Once the
/// script runs out, further checks answer `Ok(false)`.
struct ScriptedWorkflow {
    checks: Mutex<VecDeque<anyhow::Result<bool>>>,
    apply_result: Mutex<Option<anyhow::Result<ApplyOutcome>>>,
    apply_calls: AtomicUsize,
    notes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    /// Progress note count observed at the moment `apply` was entered.
    notes_before_apply: AtomicUsize,
}

impl ScriptedWorkflow {
    fn new(script: Vec<anyhow::Result<bool>>) -> Arc<Self> {
        Arc::new(Self {
            checks: Mutex::new(script.into()),
            apply_result: Mutex::new(Some(Ok(ApplyOutcome::Applied))),
            apply_calls: AtomicUsize::new(0),
            notes: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            notes_before_apply: AtomicUsize::new(0),
        })
    }

    fn with_apply(script: Vec<anyhow::Result<bool>>, apply: anyhow::Result<ApplyOutcome>) -> Arc<Self> {
        let wf = Self::new(script);
        *wf.apply_result.lock().unwrap() = Some(apply);
        wf
    }

    fn never_true() -> Arc<Self> {
        Self::new(Vec::new())
    }

    fn notes(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PollWorkflow for ScriptedWorkflow {
    async fn check(&self) -> anyhow::Result<bool> {
        self.checks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(false))
    }

    async fn apply(&self) -> anyhow::Result<ApplyOutcome> {
        self.notes_before_apply
            .store(self.notes.lock().unwrap().len(), Ordering::SeqCst);
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.apply_result
            .lock()
            .unwrap()
            .take()
            .expect("apply invoked more than once")
    }

    async fn on_progress(&self, note: &str) {
        self.notes.lock().unwrap().push(note.to_string());
    }

    async fn on_error(&self, err: &anyhow::Error) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

fn params(subject: &str, max_ms: u64, interval_ms: u64) -> SubmitParams {
    SubmitParams {
        subject_key: subject.to_string(),
        max_duration: Duration::from_millis(max_ms),
        poll_interval: Duration::from_millis(interval_ms),
        context: json!({"subject": subject}),
    }
}

/// Wait until the orchestrator drops the subject from its live set.
async fn wait_until_finished(orchestrator: &TaskOrchestrator, subject: &str) {
    for _ in 0..200 {
        if orchestrator.status(subject).await.is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task for '{subject}' never reached a terminal state");
}

// ── Lifecycle tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_predicate_never_true_times_out() {
    let orchestrator = TaskOrchestrator::new();
    let workflow = ScriptedWorkflow::never_true();

    orchestrator
        .submit(params("dev@example.com", 100, 10), workflow.clone())
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert_eq!(
        workflow.apply_calls.load(Ordering::SeqCst),
        0,
        "effect must not run when the condition never holds"
    );
    let notes = workflow.notes();
    assert!(
        notes.last().unwrap().contains("timed out"),
        "final notice should report the timeout, got: {notes:?}"
    );
}

#[tokio::test]
async fn test_condition_on_third_tick_applies_once() {
    let orchestrator = TaskOrchestrator::new();
    let workflow = ScriptedWorkflow::new(vec![Ok(false), Ok(false), Ok(true)]);

    orchestrator
        .submit(params("dev@example.com", 5_000, 10), workflow.clone())
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert_eq!(workflow.apply_calls.load(Ordering::SeqCst), 1);
    // Start notice plus one notice per false tick.
    assert_eq!(
        workflow.notes_before_apply.load(Ordering::SeqCst),
        3,
        "expected exactly three progress notices before the effect"
    );
    let notes = workflow.notes();
    assert!(
        notes.last().unwrap().contains("effect applied"),
        "final notice should report success, got: {notes:?}"
    );
}

#[tokio::test]
async fn test_already_applied_counts_as_success() {
    let orchestrator = TaskOrchestrator::new();
    let workflow =
        ScriptedWorkflow::with_apply(vec![Ok(true)], Ok(ApplyOutcome::AlreadyApplied));

    orchestrator
        .submit(params("dev@example.com", 5_000, 10), workflow.clone())
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert!(workflow.errors.lock().unwrap().is_empty());
    let notes = workflow.notes();
    assert!(
        notes.last().unwrap().contains("already in place"),
        "got: {notes:?}"
    );
}

#[tokio::test]
async fn test_apply_failure_reported_through_on_error() {
    let orchestrator = TaskOrchestrator::new();
    let workflow =
        ScriptedWorkflow::with_apply(vec![Ok(true)], Err(anyhow::anyhow!("group is full")));

    orchestrator
        .submit(params("dev@example.com", 5_000, 10), workflow.clone())
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;

    let errors = workflow.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("group is full"));
}

#[tokio::test]
async fn test_transient_check_error_is_retried() {
    let orchestrator = TaskOrchestrator::new();
    let workflow = ScriptedWorkflow::new(vec![Err(anyhow::anyhow!("503 from backend")), Ok(true)]);

    orchestrator
        .submit(params("dev@example.com", 5_000, 10), workflow.clone())
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert_eq!(
        workflow.apply_calls.load(Ordering::SeqCst),
        1,
        "a failing check must be retried, not treated as terminal"
    );
    let notes = workflow.notes();
    assert!(
        notes.iter().any(|n| n.contains("will retry")),
        "transient failure should be reported, got: {notes:?}"
    );
}

// ── Cancellation tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_before_condition_holds_skips_effect() {
    let orchestrator = TaskOrchestrator::new();
    // Long interval so the task is parked in its sleep when we cancel.
    let workflow = ScriptedWorkflow::never_true();

    orchestrator
        .submit(params("dev@example.com", 60_000, 30_000), workflow.clone())
        .await
        .expect("submit should succeed");

    // Let the first tick run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        orchestrator.cancel("dev@example.com").await,
        "first cancel of a live task must return true"
    );

    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert_eq!(workflow.apply_calls.load(Ordering::SeqCst), 0);
    let notes = workflow.notes();
    assert!(
        notes.last().unwrap().contains("cancelled"),
        "got: {notes:?}"
    );
}

#[tokio::test]
async fn test_cancel_unknown_subject_returns_false() {
    let orchestrator = TaskOrchestrator::new();
    assert!(!orchestrator.cancel("nobody@example.com").await);
}

#[tokio::test]
async fn test_second_cancel_on_same_task_returns_false() {
    let orchestrator = TaskOrchestrator::new();
    let workflow = ScriptedWorkflow::never_true();

    orchestrator
        .submit(params("dev@example.com", 60_000, 30_000), workflow.clone())
        .await
        .expect("submit should succeed");

    assert!(
        orchestrator.cancel("dev@example.com").await,
        "first cancel must return true"
    );
    // Whether or not the task has observed the flag yet, the second call
    // must report that nothing new was cancelled.
    assert!(
        !orchestrator.cancel("dev@example.com").await,
        "second cancel of the same task must return false"
    );

    wait_until_finished(&orchestrator, "dev@example.com").await;
    assert_eq!(workflow.apply_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_cuts_sleep_short() {
    let orchestrator = TaskOrchestrator::new();
    // A full poll interval is 30s; cancellation must land far sooner.
    let workflow = ScriptedWorkflow::never_true();

    orchestrator
        .submit(params("dev@example.com", 120_000, 30_000), workflow.clone())
        .await
        .expect("submit should succeed");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = std::time::Instant::now();
    orchestrator.cancel("dev@example.com").await;
    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert!(
        started.elapsed() < Duration::from_secs(2),
        "cancellation should interrupt the sleep, took {:?}",
        started.elapsed()
    );
}

// ── Duplicate and bookkeeping tests ──────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_subject_rejected_without_disturbing_first() {
    let orchestrator = TaskOrchestrator::new();
    let first = ScriptedWorkflow::never_true();

    let first_id = orchestrator
        .submit(params("dev@example.com", 60_000, 30_000), first)
        .await
        .expect("first submit should succeed");

    // Same subject, different casing and whitespace.
    let err = orchestrator
        .submit(params("  Dev@Example.COM ", 60_000, 30_000), ScriptedWorkflow::never_true())
        .await
        .expect_err("second submit for the same subject must be rejected");
    assert!(matches!(err, OrchestratorError::DuplicateTask { .. }));

    let snapshot = orchestrator
        .status("dev@example.com")
        .await
        .expect("first task should still be live");
    assert_eq!(snapshot.task_id, first_id);
    assert_eq!(snapshot.status, TaskStatus::Polling);
    assert_eq!(orchestrator.live_count().await, 1);

    orchestrator.cancel("dev@example.com").await;
    wait_until_finished(&orchestrator, "dev@example.com").await;
}

#[tokio::test]
async fn test_terminal_task_is_removed_from_live_set() {
    let orchestrator = TaskOrchestrator::new();
    let workflow = ScriptedWorkflow::new(vec![Ok(true)]);

    orchestrator
        .submit(params("dev@example.com", 5_000, 10), workflow)
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;

    assert!(orchestrator.status("dev@example.com").await.is_none());
    assert_eq!(orchestrator.live_count().await, 0);

    // The subject is free for a fresh submission now.
    let workflow = ScriptedWorkflow::new(vec![Ok(true)]);
    orchestrator
        .submit(params("dev@example.com", 5_000, 10), workflow)
        .await
        .expect("resubmit after a terminal state should succeed");
    wait_until_finished(&orchestrator, "dev@example.com").await;
}

#[tokio::test]
async fn test_panicking_workflow_is_cleaned_up() {
    struct PanickingWorkflow;

    #[async_trait]
    impl PollWorkflow for PanickingWorkflow {
        async fn check(&self) -> anyhow::Result<bool> {
            panic!("workflow bug");
        }
        async fn apply(&self) -> anyhow::Result<ApplyOutcome> {
            unreachable!()
        }
        async fn on_progress(&self, _note: &str) {}
    }

    let orchestrator = TaskOrchestrator::new();
    orchestrator
        .submit(params("dev@example.com", 5_000, 10), Arc::new(PanickingWorkflow))
        .await
        .expect("submit should succeed");

    wait_until_finished(&orchestrator, "dev@example.com").await;
    assert_eq!(orchestrator.live_count().await, 0);
}

#[tokio::test]
async fn test_status_all_snapshots_every_live_task() {
    let orchestrator = TaskOrchestrator::new();

    for subject in ["a@example.com", "b@example.com"] {
        orchestrator
            .submit(params(subject, 60_000, 30_000), ScriptedWorkflow::never_true())
            .await
            .expect("submit should succeed");
    }

    let mut subjects: Vec<String> = orchestrator
        .status_all()
        .await
        .into_iter()
        .map(|t| t.subject_key)
        .collect();
    subjects.sort();
    assert_eq!(subjects, vec!["a@example.com", "b@example.com"]);

    for subject in ["a@example.com", "b@example.com"] {
        orchestrator.cancel(subject).await;
        wait_until_finished(&orchestrator, subject).await;
    }
}

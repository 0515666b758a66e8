//! Background task orchestrator.
//!
//! Manages long-running, cancellable, timeout-bound polling workflows:
//! repeatedly evaluate a predicate against some external system and, once it
//! holds, apply a one-time side effect. One tokio task per live workflow;
//! the orchestrator owns the live set behind a single mutex and guarantees
//! an entry is removed on every terminal transition — including a panicking
//! workflow implementation.
//!
//! The contract is domain-agnostic; the invite-and-wait facade in
//! `crate::workflow` is currently its only production caller.

pub mod task;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{info, warn};

pub use task::{Task, TaskStatus};

// ─── Workflow seam ───────────────────────────────────────────────────────────

/// Outcome of the one-time side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The effect was found to be already in place (e.g. the backend
    /// answered "already exists"). Counts as success, not failure.
    AlreadyApplied,
}

/// The caller-supplied half of a polling task: predicate, one-shot effect,
/// and progress/error notification sinks.
///
/// `check` and `apply` may take as long as they need — cancellation and
/// timeout are only observed between invocations, never mid-call.
#[async_trait]
pub trait PollWorkflow: Send + Sync {
    /// Has the awaited external condition become true yet?
    ///
    /// An `Err` is treated as transient (backend unreachable, rate limit):
    /// reported through `on_progress` and retried on the next tick, bounded
    /// only by the task's `max_duration`.
    async fn check(&self) -> anyhow::Result<bool>;

    /// Apply the side effect. Invoked at most once per task.
    async fn apply(&self) -> anyhow::Result<ApplyOutcome>;

    /// Human-readable progress notice (tick updates, cancellation, timeout).
    async fn on_progress(&self, note: &str);

    /// Terminal effect failure. Defaults to forwarding into `on_progress`.
    async fn on_error(&self, err: &anyhow::Error) {
        self.on_progress(&format!("workflow failed: {err}")).await;
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The at-most-one-task-per-subject invariant would be violated.
    /// Cancel the live task first if a resubmit is intended.
    #[error("a polling task for '{subject}' is already running")]
    DuplicateTask { subject: String },
}

// ─── Submission parameters ───────────────────────────────────────────────────

pub struct SubmitParams {
    /// Identity the task is keyed on (e.g. an email address). Compared
    /// case-insensitively.
    pub subject_key: String,
    pub max_duration: Duration,
    pub poll_interval: Duration,
    /// Opaque payload echoed in status snapshots.
    pub context: serde_json::Value,
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

struct TaskEntry {
    task: Task,
    /// Written by `cancel`, read at the top of every tick.
    cancelled: Arc<AtomicBool>,
    /// Wakes the sleeper so cancellation lands at the next tick boundary
    /// instead of after a full poll interval.
    wake: Arc<Notify>,
}

/// Owns the live-task set and drives the per-task state machines.
pub struct TaskOrchestrator {
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

impl TaskOrchestrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(HashMap::new()),
        })
    }

    fn normalize(subject: &str) -> String {
        subject.trim().to_lowercase()
    }

    /// Submit a new polling task. Returns the task id immediately; the
    /// workflow is driven on its own schedule until it reaches a terminal
    /// state.
    ///
    /// Rejects synchronously if a live task already exists for the subject.
    pub async fn submit(
        self: &Arc<Self>,
        params: SubmitParams,
        workflow: Arc<dyn PollWorkflow>,
    ) -> Result<String, OrchestratorError> {
        let key = Self::normalize(&params.subject_key);
        let task_id = format!("{key}_{}", Utc::now().timestamp());

        let cancelled = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        {
            let mut tasks = self.tasks.lock().await;
            if tasks.contains_key(&key) {
                return Err(OrchestratorError::DuplicateTask { subject: key });
            }
            tasks.insert(
                key.clone(),
                TaskEntry {
                    task: Task {
                        subject_key: key.clone(),
                        task_id: task_id.clone(),
                        created_at: Utc::now(),
                        max_duration: params.max_duration,
                        poll_interval: params.poll_interval,
                        status: TaskStatus::Polling,
                        context: params.context,
                    },
                    cancelled: Arc::clone(&cancelled),
                    wake: Arc::clone(&wake),
                },
            );
        }

        info!(subject = %key, task_id = %task_id, "polling task submitted");

        let orchestrator = Arc::clone(self);
        let loop_key = key.clone();
        let max_duration = params.max_duration;
        let poll_interval = params.poll_interval;
        tokio::spawn(async move {
            // The driving loop runs in its own spawned task so that a
            // panicking workflow still surfaces as a JoinError here and the
            // live-set entry is removed on every exit path.
            let body = tokio::spawn(drive(
                workflow,
                loop_key.clone(),
                max_duration,
                poll_interval,
                cancelled,
                wake,
            ));
            let status = match body.await {
                Ok(status) => status,
                Err(e) => {
                    warn!(subject = %loop_key, error = %e, "polling task aborted unexpectedly");
                    TaskStatus::Failed
                }
            };
            orchestrator.finish(&loop_key, status).await;
        });

        Ok(task_id)
    }

    /// Remove a task from the live set at its terminal transition.
    async fn finish(&self, key: &str, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        let removed = self.tasks.lock().await.remove(key);
        match removed {
            Some(entry) => info!(
                subject = %key,
                task_id = %entry.task.task_id,
                status = status.as_str(),
                "polling task finished"
            ),
            // Finish runs exactly once per spawned task, so the entry must
            // still be present.
            None => warn!(subject = %key, "finished task was not in the live set"),
        }
    }

    /// Point-in-time snapshot of one live task.
    pub async fn status(&self, subject_key: &str) -> Option<Task> {
        let key = Self::normalize(subject_key);
        self.tasks.lock().await.get(&key).map(|e| e.task.clone())
    }

    /// Snapshot of all live tasks.
    pub async fn status_all(&self) -> Vec<Task> {
        self.tasks.lock().await.values().map(|e| e.task.clone()).collect()
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `true` only when this call newly requested cancellation of a
    /// live task; unknown subjects and repeat calls return `false`. The
    /// task observes the flag at its next tick boundary — an in-flight
    /// predicate or effect call is allowed to complete.
    pub async fn cancel(&self, subject_key: &str) -> bool {
        let key = Self::normalize(subject_key);
        let tasks = self.tasks.lock().await;
        match tasks.get(&key) {
            Some(entry) => {
                let newly = !entry.cancelled.swap(true, Ordering::SeqCst);
                entry.wake.notify_waiters();
                if newly {
                    info!(subject = %key, "cancellation requested");
                }
                newly
            }
            None => false,
        }
    }

    /// Number of currently live tasks.
    pub async fn live_count(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

// ─── Driving loop ────────────────────────────────────────────────────────────

/// Per-task state machine. Returns the terminal status; the caller removes
/// the live-set entry.
async fn drive(
    workflow: Arc<dyn PollWorkflow>,
    subject: String,
    max_duration: Duration,
    poll_interval: Duration,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
) -> TaskStatus {
    let started = Instant::now();
    let deadline = started + max_duration;

    workflow
        .on_progress(&format!("started polling for '{subject}'"))
        .await;

    loop {
        if cancelled.load(Ordering::SeqCst) {
            workflow
                .on_progress(&format!("polling for '{subject}' cancelled"))
                .await;
            return TaskStatus::Cancelled;
        }

        if Instant::now() >= deadline {
            workflow
                .on_progress(&format!(
                    "timed out: condition for '{subject}' not met within {}s",
                    max_duration.as_secs()
                ))
                .await;
            return TaskStatus::TimedOut;
        }

        match workflow.check().await {
            Err(e) => {
                // Transient: report, wait one interval, retry.
                workflow
                    .on_progress(&format!("poll check failed (will retry): {e}"))
                    .await;
            }
            Ok(true) => {
                return match workflow.apply().await {
                    Ok(ApplyOutcome::Applied) => {
                        workflow
                            .on_progress(&format!("condition met for '{subject}', effect applied"))
                            .await;
                        TaskStatus::Succeeded
                    }
                    Ok(ApplyOutcome::AlreadyApplied) => {
                        workflow
                            .on_progress(&format!(
                                "condition met for '{subject}', effect was already in place"
                            ))
                            .await;
                        TaskStatus::Succeeded
                    }
                    Err(e) => {
                        workflow.on_error(&e).await;
                        TaskStatus::Failed
                    }
                };
            }
            Ok(false) => {
                let elapsed = started.elapsed().as_secs();
                let remaining = deadline.saturating_duration_since(Instant::now()).as_secs();
                workflow
                    .on_progress(&format!(
                        "condition for '{subject}' not met yet (elapsed {elapsed}s, remaining {remaining}s)"
                    ))
                    .await;
            }
        }

        // Sleep one interval, but let a cancellation request cut it short.
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = wake.notified() => {}
        }
    }
}

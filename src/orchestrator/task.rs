//! Task data model for the polling orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Lifecycle states of a polling task. `Polling` is the only non-terminal
/// state; a task is removed from the live set the instant it reaches any of
/// the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Polling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Polling => "polling",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Point-in-time snapshot of one in-flight polling workflow.
///
/// Snapshots are what `status`/`status_all` return; the live entry itself is
/// owned exclusively by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Identity the task is keyed on (normalized lowercase). At most one
    /// live task per subject key.
    pub subject_key: String,
    /// Unique per submission: `{subject_key}_{unix_seconds}`.
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub max_duration: Duration,
    #[serde(skip)]
    pub poll_interval: Duration,
    pub status: TaskStatus,
    /// Opaque payload for status display (e.g. target app name). The
    /// orchestrator never inspects it.
    pub context: serde_json::Value,
}

impl Task {
    /// Wall-clock minutes since creation, truncated to whole minutes.
    /// Display only — internal timing decisions use full-precision
    /// monotonic durations.
    pub fn elapsed_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes().max(0)
    }

    /// Wall-clock minutes until `max_duration` elapses, truncated, floored
    /// at zero.
    pub fn remaining_minutes(&self) -> i64 {
        let max = chrono::Duration::from_std(self.max_duration)
            .unwrap_or_else(|_| chrono::Duration::zero());
        (self.created_at + max - Utc::now()).num_minutes().max(0)
    }
}

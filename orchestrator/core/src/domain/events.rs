// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::result::RunId;
use crate::domain::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Orchestration events published on the
/// [`EventBus`](crate::infrastructure::event_bus::EventBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        run_id: RunId,
        topology: String,
        task_count: usize,
        started_at: DateTime<Utc>,
    },
    BatchStarted {
        run_id: RunId,
        batch: usize,
        task_ids: Vec<TaskId>,
        started_at: DateTime<Utc>,
    },
    TaskStarted {
        run_id: RunId,
        task_id: TaskId,
        role: String,
        started_at: DateTime<Utc>,
    },
    TaskSucceeded {
        run_id: RunId,
        task_id: TaskId,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        run_id: RunId,
        task_id: TaskId,
        error: String,
        failed_at: DateTime<Utc>,
    },
    TaskBlocked {
        run_id: RunId,
        task_id: TaskId,
        dependency: TaskId,
        blocked_at: DateTime<Utc>,
    },
    /// Every mesh peer reached the barrier closing `round`
    BarrierReleased {
        run_id: RunId,
        round: u32,
        participants: usize,
        released_at: DateTime<Utc>,
    },
    IterationCompleted {
        run_id: RunId,
        iteration: u32,
        quality_score: f64,
        improvement_delta: f64,
        completed_at: DateTime<Utc>,
    },
    WorkflowCompleted {
        run_id: RunId,
        partial_success: bool,
        succeeded: usize,
        failed: usize,
        blocked: usize,
        completed_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::WorkflowStarted { run_id, .. }
            | Self::BatchStarted { run_id, .. }
            | Self::TaskStarted { run_id, .. }
            | Self::TaskSucceeded { run_id, .. }
            | Self::TaskFailed { run_id, .. }
            | Self::TaskBlocked { run_id, .. }
            | Self::BarrierReleased { run_id, .. }
            | Self::IterationCompleted { run_id, .. }
            | Self::WorkflowCompleted { run_id, .. } => *run_id,
        }
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow result types
//!
//! The single structured schema returned at the orchestration boundary:
//!
//! ```json
//! { "tasks": { "<id>": {"status": "Succeeded", "result": {...}, "error": null} },
//!   "partial_success": true }
//! ```
//!
//! A result always carries every task of the run, including those that failed
//! or were blocked.

use crate::domain::graph::WorkflowGraph;
use crate::domain::task::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskReport {
    pub fn succeeded(result: serde_json::Value) -> Self {
        Self {
            status: TaskStatus::Succeeded,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.to_string()),
        }
    }

    pub fn blocked(error: impl ToString) -> Self {
        Self {
            status: TaskStatus::Blocked,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub tasks: BTreeMap<TaskId, TaskReport>,
    /// True only when every task succeeded
    pub partial_success: bool,
}

impl WorkflowResult {
    /// Build from a report map, deriving `partial_success`.
    pub fn from_reports(tasks: BTreeMap<TaskId, TaskReport>) -> Self {
        let partial_success = !tasks.is_empty()
            && tasks
                .values()
                .all(|report| report.status == TaskStatus::Succeeded);
        Self {
            tasks,
            partial_success,
        }
    }

    /// Snapshot every task of a graph.
    pub fn from_graph(graph: &WorkflowGraph) -> Self {
        let tasks = graph
            .tasks()
            .map(|task| {
                let state = task.snapshot();
                (
                    task.id.clone(),
                    TaskReport {
                        status: state.status,
                        result: state.result,
                        error: state.error.map(|e| e.to_string()),
                    },
                )
            })
            .collect();
        Self::from_reports(tasks)
    }

    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(id).map(|report| report.status)
    }

    pub fn result(&self, id: &TaskId) -> Option<&serde_json::Value> {
        self.tasks.get(id).and_then(|report| report.result.as_ref())
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|r| r.status == status).count()
    }
}

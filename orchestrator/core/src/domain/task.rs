// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Domain Model
//!
//! A [`Task`] is one unit of orchestrated work: an id, the ids it depends on,
//! the `agent_role` used to pick an Agent Worker, and an opaque JSON payload.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──► Ready ──► Running ──► Succeeded
//!    │                     └──────► Failed
//!    └──► Blocked   (a dependency failed; never re-entered)
//! ```
//!
//! Status is the only mutable surface of a task once the graph is built. Every
//! transition is a compare-and-set from an expected prior status, so a task can
//! never be woken (or completed) twice.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Identifier of a task, unique within one workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId; blank ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidTaskId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidTaskId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = InvalidTaskId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Task id cannot be empty")]
pub struct InvalidTaskId;

// ============================================================================
// Value Objects: Status & Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Blocked,
}

impl TaskStatus {
    /// Terminal statuses are never left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }

    /// Allowed lifecycle edges.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Ready)
                | (Self::Pending, Self::Blocked)
                | (Self::Ready, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Blocked => "Blocked",
        };
        f.write_str(label)
    }
}

/// How a task reacts to failed dependencies.
///
/// `All` blocks the task as soon as any dependency fails. `AnySucceeded` waits
/// until every dependency has resolved and runs with whichever succeeded; it is
/// blocked only when none did (used by hierarchical managers and supervisors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    #[default]
    All,
    AnySucceeded,
}

// ============================================================================
// Entities: Declaration & Runtime Task
// ============================================================================

/// Declarative input for one task, as accepted by the graph builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDeclaration {
    pub id: TaskId,

    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    pub agent_role: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    /// Overrides the scheduler's default per-task timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub dependency_policy: DependencyPolicy,
}

impl TaskDeclaration {
    pub fn new(id: TaskId, agent_role: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id,
            dependencies: Vec::new(),
            agent_role: agent_role.into(),
            payload,
            timeout: None,
            dependency_policy: DependencyPolicy::All,
        }
    }

    pub fn depends_on(mut self, dependency: TaskId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn with_policy(mut self, policy: DependencyPolicy) -> Self {
        self.dependency_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Mutable part of a task, guarded by the task's own lock.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<TaskError>,
}

/// A task inside a built [`WorkflowGraph`](crate::domain::graph::WorkflowGraph).
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub dependencies: Vec<TaskId>,
    pub agent_role: String,
    pub payload: serde_json::Value,
    pub timeout: Option<Duration>,
    pub dependency_policy: DependencyPolicy,
    state: Mutex<TaskState>,
}

impl Task {
    pub(crate) fn from_declaration(declaration: TaskDeclaration) -> Self {
        Self {
            id: declaration.id,
            dependencies: declaration.dependencies,
            agent_role: declaration.agent_role,
            payload: declaration.payload,
            timeout: declaration.timeout,
            dependency_policy: declaration.dependency_policy,
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                result: None,
                error: None,
            }),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn snapshot(&self) -> TaskState {
        self.state.lock().clone()
    }

    pub fn result(&self) -> Option<serde_json::Value> {
        self.state.lock().result.clone()
    }

    /// Compare-and-set a status transition.
    pub fn transition(&self, expected: TaskStatus, next: TaskStatus) -> Result<(), TransitionError> {
        let mut state = self.state.lock();
        Self::check(&self.id, &state, expected, next)?;
        state.status = next;
        Ok(())
    }

    /// `Running -> Succeeded`, recording the worker's result.
    pub fn succeed(&self, result: serde_json::Value) -> Result<(), TransitionError> {
        let mut state = self.state.lock();
        Self::check(&self.id, &state, TaskStatus::Running, TaskStatus::Succeeded)?;
        state.status = TaskStatus::Succeeded;
        state.result = Some(result);
        Ok(())
    }

    /// `Running -> Failed`.
    pub fn fail(&self, error: TaskError) -> Result<(), TransitionError> {
        let mut state = self.state.lock();
        Self::check(&self.id, &state, TaskStatus::Running, TaskStatus::Failed)?;
        state.status = TaskStatus::Failed;
        state.error = Some(error);
        Ok(())
    }

    /// `Pending -> Blocked` with a synthesized `DependencyFailure`.
    pub fn block(&self, failed_dependency: TaskId) -> Result<(), TransitionError> {
        let mut state = self.state.lock();
        Self::check(&self.id, &state, TaskStatus::Pending, TaskStatus::Blocked)?;
        state.status = TaskStatus::Blocked;
        state.error = Some(TaskError::DependencyFailure {
            dependency: failed_dependency,
        });
        Ok(())
    }

    fn check(
        id: &TaskId,
        state: &TaskState,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> Result<(), TransitionError> {
        if state.status != expected {
            return Err(TransitionError::UnexpectedStatus {
                task_id: id.clone(),
                expected,
                actual: state.status,
            });
        }
        if !expected.can_transition_to(next) {
            return Err(TransitionError::IllegalTransition {
                task_id: id.clone(),
                from: expected,
                to: next,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

/// Per-task failure recorded in the workflow result. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task execution failed: {message}")]
    Execution { message: String },

    #[error("Task timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Dependency '{dependency}' did not succeed")]
    DependencyFailure { dependency: TaskId },

    #[error("No agent worker registered for role '{role}'")]
    WorkerNotFound { role: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Task '{task_id}' expected status {expected} but was {actual}")]
    UnexpectedStatus {
        task_id: TaskId,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    #[error("Task '{task_id}' cannot move from {from} to {to}")]
    IllegalTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

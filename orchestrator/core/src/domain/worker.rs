// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Worker
//!
//! The opaque capability that performs a task's actual work. The orchestrator
//! imposes nothing beyond the result/error contract and the per-task timeout;
//! a worker may be slow, may fail, and is never cancelled cooperatively (a
//! timed-out invocation keeps running and its result is discarded).
//!
//! Role-specific behavior is expressed by registering different implementations
//! under different `agent_role` strings, see
//! [`WorkerRegistry`](crate::infrastructure::worker_registry::WorkerRegistry).

use crate::domain::context::ContextView;
use crate::domain::task::TaskId;
use async_trait::async_trait;

/// Everything a worker receives for one invocation.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub task_id: TaskId,
    pub role: String,
    pub payload: serde_json::Value,
    /// Read-only view of the shared context store
    pub context: ContextView,
}

#[async_trait]
pub trait AgentWorker: Send + Sync {
    async fn invoke(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError>;

    /// Short label for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Worker failed: {0}")]
    Failed(String),
}

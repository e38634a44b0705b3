// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Built-in Agent Workers
//
// - EchoWorker: returns its payload with a short context summary. Used by the
//   CLI `run` command and as a stand-in worker in tests.
// - RiskScoringWorker: runs the risk scorer over a `RiskInput` payload.

use crate::domain::risk::{RiskConfig, RiskInput, RiskScorer};
use crate::domain::worker::{AgentWorker, WorkerError, WorkerRequest};
use async_trait::async_trait;
use serde_json::json;

pub const ECHO_ROLE: &str = "echo";
pub const RISK_SCORING_ROLE: &str = "risk_scoring";

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoWorker;

#[async_trait]
impl AgentWorker for EchoWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError> {
        let summary = request.context.summary();
        let upstream = request
            .payload
            .get("upstream")
            .and_then(serde_json::Value::as_array)
            .map(|producers| producers.len())
            .unwrap_or(0);

        Ok(json!({
            "task_id": request.task_id,
            "role": request.role,
            "echo": request.payload,
            "upstream_results": upstream,
            "context_entries": summary.total_entries,
        }))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Scores a [`RiskInput`]. Accepts the input either as the whole payload or
/// under `"input"` (the shape produced by payload synthesis).
pub struct RiskScoringWorker {
    scorer: RiskScorer,
}

impl RiskScoringWorker {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            scorer: RiskScorer::new(config),
        }
    }
}

impl Default for RiskScoringWorker {
    fn default() -> Self {
        Self::new(&RiskConfig::default())
    }
}

#[async_trait]
impl AgentWorker for RiskScoringWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError> {
        let raw = if request.payload.get("documents").is_some() {
            request.payload
        } else {
            request
                .payload
                .get("input")
                .cloned()
                .ok_or_else(|| WorkerError::InvalidPayload("expected a 'documents' list".into()))?
        };

        let input: RiskInput = serde_json::from_value(raw)
            .map_err(|e| WorkerError::InvalidPayload(e.to_string()))?;
        let assessment = self.scorer.assess(&input);

        serde_json::to_value(assessment).map_err(|e| WorkerError::Failed(e.to_string()))
    }

    fn name(&self) -> &str {
        "risk_scoring"
    }
}

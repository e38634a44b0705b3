// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Loop topology (iterative refinement)
//!
//! Re-invokes one task body until the [`ConvergenceDetector`] stops the run.
//! Each iteration receives:
//!
//! ```json
//! { "input": <declared payload>,
//!   "iteration": 2,
//!   "previous_result": <last successful result or null>,
//!   "improvement_targets": ["increase_analysis_depth", "refine_existing_analysis"] }
//! ```
//!
//! A failed iteration is recorded and the loop moves on: the next iteration
//! still gets the last successful result and fresh targets. Only the detector
//! stops the run, and `max_iterations` counts failed attempts too.
//!
//! This is the only topology that invokes the same task id more than once per
//! run. Every iteration's result is committed to the shared context under the
//! task id, so the store history holds one version per iteration.

use crate::application::scheduler::Scheduler;
use crate::domain::context::SharedContextStore;
use crate::domain::convergence::{
    ConvergenceConfig, ConvergenceDetector, ConvergenceState, QualityFunction, StopReason,
};
use crate::domain::events::WorkflowEvent;
use crate::domain::result::{RunId, TaskReport, WorkflowResult};
use crate::domain::task::{TaskError, TaskId};
use crate::domain::topology::{LoopSpec, TopologyKind};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Raw per-iteration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub final_result: Option<serde_json::Value>,
    pub history: Vec<ConvergenceState>,
    pub iterations: Vec<IterationRecord>,
    pub stop_reason: StopReason,
    /// Single-task view in the common result schema
    pub result: WorkflowResult,
    /// Store the iterations were committed to
    #[serde(skip)]
    pub context: SharedContextStore,
}

pub struct LoopAdapter {
    scheduler: Scheduler,
    config: ConvergenceConfig,
    quality: Arc<dyn QualityFunction>,
}

impl LoopAdapter {
    pub fn new(
        scheduler: Scheduler,
        config: ConvergenceConfig,
        quality: Arc<dyn QualityFunction>,
    ) -> Self {
        Self {
            scheduler: scheduler.with_topology(TopologyKind::Loop),
            config,
            quality,
        }
    }

    pub async fn run(&self, spec: &LoopSpec) -> LoopOutcome {
        let mut config = self.config.clone();
        if let Some(max) = spec.max_iterations {
            config.max_iterations = max;
        }
        if let Some(threshold) = spec.improvement_threshold {
            config.improvement_threshold = threshold;
        }
        // a zero bound would never start; one iteration is the floor
        config.max_iterations = config.max_iterations.max(1);

        let scheduler = self.scheduler.for_run();
        let deadline = scheduler.start_deadline();
        let run_id = RunId::new();
        let task = &spec.task;
        let options = scheduler.options();
        let timeout = task.timeout.unwrap_or(options.task_timeout);
        let mut detector = ConvergenceDetector::new(config);
        let mut iterations = Vec::new();
        let mut final_result: Option<serde_json::Value> = None;
        let mut last_error: Option<TaskError> = None;

        info!(
            run_id = %run_id,
            task_id = %task.id,
            max_iterations = detector.config().max_iterations,
            "Starting loop workflow"
        );
        scheduler.event_bus().publish(WorkflowEvent::WorkflowStarted {
            run_id,
            topology: TopologyKind::Loop.to_string(),
            task_count: 1,
            started_at: Utc::now(),
        });

        while !detector.should_stop() {
            let iteration = detector.attempts() + 1;
            let payload = json!({
                "input": task.payload,
                "iteration": iteration,
                "previous_result": final_result,
                "improvement_targets": detector.improvement_targets(),
            });

            let outcome = scheduler
                .invoke_within(&task.id, &task.agent_role, payload, timeout, deadline, None)
                .await;

            match outcome {
                Ok(result) => {
                    if let Err(e) = scheduler.store().put(
                        &options.results_category,
                        task.id.as_str(),
                        result.clone(),
                        task.id.as_str(),
                    ) {
                        warn!(run_id = %run_id, error = %e, "Iteration result not committed");
                    }

                    let score = self.quality.score(&result, iteration);
                    let state = detector.observe(score).clone();
                    info!(
                        run_id = %run_id,
                        iteration,
                        quality = state.quality_score,
                        delta = state.improvement_delta,
                        "Iteration completed"
                    );
                    scheduler.event_bus().publish(WorkflowEvent::IterationCompleted {
                        run_id,
                        iteration,
                        quality_score: state.quality_score,
                        improvement_delta: state.improvement_delta,
                        completed_at: Utc::now(),
                    });

                    iterations.push(IterationRecord {
                        iteration,
                        result: Some(result.clone()),
                        error: None,
                    });
                    final_result = Some(result);
                }
                Err(error) => {
                    warn!(run_id = %run_id, iteration, error = %error, "Iteration failed");
                    iterations.push(IterationRecord {
                        iteration,
                        result: None,
                        error: Some(error.to_string()),
                    });
                    last_error = Some(error);
                    detector.record_failure();
                }
            }
        }

        let stop_reason = detector.stop_reason().unwrap_or(StopReason::MaxIterations);
        info!(run_id = %run_id, stop_reason = %stop_reason, iterations = iterations.len(), "Loop stopped");

        // the last successful iteration wins even if later attempts failed
        let report = match (&final_result, last_error) {
            (Some(result), _) => TaskReport::succeeded(result.clone()),
            (None, Some(error)) => TaskReport::failed(error),
            (None, None) => TaskReport::failed("loop produced no iterations"),
        };
        let result = WorkflowResult::from_reports(BTreeMap::from([(task.id.clone(), report)]));

        scheduler.event_bus().publish(WorkflowEvent::WorkflowCompleted {
            run_id,
            partial_success: result.partial_success,
            succeeded: usize::from(result.partial_success),
            failed: usize::from(!result.partial_success),
            blocked: 0,
            completed_at: Utc::now(),
        });

        LoopOutcome {
            run_id,
            task_id: task.id.clone(),
            final_result,
            history: detector.into_history(),
            iterations,
            stop_reason,
            result,
            context: scheduler.store().clone(),
        }
    }
}

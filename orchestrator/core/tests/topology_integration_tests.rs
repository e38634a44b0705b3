// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Topology integration tests
//!
//! Verifies the topology adapters on top of the scheduler:
//! - sequential chains see every earlier result
//! - hierarchical runs survive failed specialists
//! - loop runs stop on quality target, plateau, iteration cap or failure
//! - a risk scoring worker composes with a DAG through payload synthesis

mod common;

use async_trait::async_trait;
use common::{id, scheduler, task, ScriptedWorker};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use taskweave_core::application::hierarchical::HierarchicalAdapter;
use taskweave_core::application::loop_refinement::LoopAdapter;
use taskweave_core::application::scheduler::{PayloadSynthesis, Scheduler, SchedulerOptions};
use taskweave_core::application::sequential::SequentialAdapter;
use taskweave_core::domain::convergence::{ConvergenceConfig, FieldQuality, StopReason};
use taskweave_core::domain::events::WorkflowEvent;
use taskweave_core::domain::risk::RiskConfig;
use taskweave_core::domain::task::{TaskDeclaration, TaskStatus};
use taskweave_core::domain::topology::{AgentSpec, HierarchySpec, LoopSpec, ManagerSpec};
use taskweave_core::domain::worker::{AgentWorker, WorkerError, WorkerRequest};
use taskweave_core::infrastructure::event_bus::EventBus;
use taskweave_core::infrastructure::worker_registry::WorkerRegistry;
use taskweave_core::infrastructure::workers::RISK_SCORING_ROLE;

fn agent(name: &str) -> AgentSpec {
    AgentSpec::new(id(name), "scripted", json!({ "name": name }))
}

fn upstream_producers(result: &serde_json::Value) -> Vec<String> {
    result["payload"]["upstream"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["producer"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Sequential
// ============================================================================

#[tokio::test]
async fn test_sequential_accumulates_prior_results() {
    let worker = Arc::new(ScriptedWorker::new());
    let adapter = SequentialAdapter::new(scheduler(worker.clone()));

    let outcome = adapter
        .run(vec![task("intake", &[]), task("verify", &[]), task("settle", &[])])
        .await
        .unwrap();

    assert_eq!(
        outcome.batches,
        vec![vec![id("intake")], vec![id("verify")], vec![id("settle")]]
    );
    let settle = outcome.result.result(&id("settle")).unwrap();
    assert_eq!(upstream_producers(settle), vec!["intake", "verify"]);
    assert_eq!(settle["payload"]["input"], json!({ "name": "settle" }));
    assert_eq!(
        worker.log(),
        vec!["start:intake", "end:intake", "start:verify", "end:verify", "start:settle", "end:settle"]
    );
}

#[tokio::test]
async fn test_sequential_failure_blocks_the_rest() {
    let worker = Arc::new(ScriptedWorker::new().fail("verify"));
    let outcome = SequentialAdapter::new(scheduler(worker))
        .run(vec![task("intake", &[]), task("verify", &[]), task("settle", &[])])
        .await
        .unwrap();

    assert_eq!(outcome.result.status(&id("intake")), Some(TaskStatus::Succeeded));
    assert_eq!(outcome.result.status(&id("verify")), Some(TaskStatus::Failed));
    assert_eq!(outcome.result.status(&id("settle")), Some(TaskStatus::Blocked));
}

// ============================================================================
// Hierarchical
// ============================================================================

fn underwriting() -> HierarchySpec {
    HierarchySpec {
        supervisor: agent("underwriter"),
        managers: vec![
            ManagerSpec {
                agent: agent("financial"),
                specialists: vec![agent("credit"), agent("income")],
            },
            ManagerSpec {
                agent: agent("compliance"),
                specialists: vec![agent("kyc"), agent("sanctions")],
            },
        ],
    }
}

#[tokio::test]
async fn test_failed_specialist_only_narrows_its_manager() {
    let worker = Arc::new(ScriptedWorker::new().fail("income"));
    let outcome = HierarchicalAdapter::new(scheduler(worker))
        .run(&underwriting())
        .await
        .unwrap();
    let result = &outcome.result;

    assert_eq!(outcome.batches.len(), 3);
    assert_eq!(result.tasks.len(), 7);
    assert_eq!(result.status(&id("income")), Some(TaskStatus::Failed));
    assert!(!result.partial_success);

    let financial = result.result(&id("financial")).unwrap();
    assert_eq!(upstream_producers(financial), vec!["credit"]);

    let compliance = result.result(&id("compliance")).unwrap();
    assert_eq!(upstream_producers(compliance), vec!["kyc", "sanctions"]);

    let underwriter = result.result(&id("underwriter")).unwrap();
    assert_eq!(upstream_producers(underwriter), vec!["financial", "compliance"]);
}

#[tokio::test]
async fn test_manager_blocked_when_all_specialists_fail() {
    let worker = Arc::new(ScriptedWorker::new().fail("credit").fail("income"));
    let outcome = HierarchicalAdapter::new(scheduler(worker))
        .run(&underwriting())
        .await
        .unwrap();
    let result = &outcome.result;

    assert_eq!(result.status(&id("financial")), Some(TaskStatus::Blocked));
    assert_eq!(result.status(&id("compliance")), Some(TaskStatus::Succeeded));
    assert_eq!(result.status(&id("underwriter")), Some(TaskStatus::Succeeded));
    let underwriter = result.result(&id("underwriter")).unwrap();
    assert_eq!(upstream_producers(underwriter), vec!["compliance"]);
}

// ============================================================================
// Loop
// ============================================================================

/// Returns `{"quality": q}` for the scripted iteration, or fails where the
/// script has `None`. Keeps every payload it was given.
struct QualityScript {
    scores: Vec<Option<f64>>,
    payloads: Mutex<Vec<serde_json::Value>>,
}

impl QualityScript {
    fn new(scores: Vec<Option<f64>>) -> Self {
        Self {
            scores,
            payloads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentWorker for QualityScript {
    async fn invoke(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError> {
        let iteration = request.payload["iteration"].as_u64().unwrap_or(1) as usize;
        self.payloads.lock().push(request.payload);
        match self.scores.get(iteration - 1).copied().flatten() {
            Some(quality) => Ok(json!({ "quality": quality, "iteration": iteration })),
            None => Err(WorkerError::Failed(format!("iteration {iteration} failed"))),
        }
    }
}

fn loop_adapter(worker: Arc<QualityScript>, bus: EventBus) -> LoopAdapter {
    let registry = WorkerRegistry::new().with_worker("refiner", worker);
    let scheduler = Scheduler::new(Arc::new(registry), SchedulerOptions::default()).with_event_bus(bus);
    LoopAdapter::new(scheduler, ConvergenceConfig::default(), Arc::new(FieldQuality::default()))
}

fn loop_spec(max_iterations: Option<u32>) -> LoopSpec {
    LoopSpec {
        task: AgentSpec::new(id("refine"), "refiner", json!({ "claim": "C-1" })),
        max_iterations,
        improvement_threshold: None,
    }
}

#[tokio::test]
async fn test_loop_stops_at_quality_target() {
    let worker = Arc::new(QualityScript::new(vec![Some(0.5), Some(0.96), Some(0.99)]));
    let outcome = loop_adapter(worker.clone(), EventBus::default())
        .run(&loop_spec(None))
        .await;

    assert_eq!(outcome.stop_reason, StopReason::QualityTarget);
    assert_eq!(outcome.iterations.len(), 2);
    assert_eq!(outcome.final_result.as_ref().unwrap()["iteration"], 2);
    assert!(outcome.result.partial_success);

    let payloads = worker.payloads.lock();
    assert_eq!(payloads[0]["previous_result"], serde_json::Value::Null);
    assert_eq!(payloads[0]["input"], json!({ "claim": "C-1" }));
    assert_eq!(payloads[1]["previous_result"], json!({ "quality": 0.5, "iteration": 1 }));
    assert!(payloads[1]["improvement_targets"]
        .as_array()
        .unwrap()
        .contains(&json!("refine_existing_analysis")));
}

#[tokio::test]
async fn test_loop_stops_on_plateau() {
    let worker = Arc::new(QualityScript::new(vec![
        Some(0.5),
        Some(0.6),
        Some(0.62),
        Some(0.63),
        Some(0.9),
    ]));
    let outcome = loop_adapter(worker, EventBus::default())
        .run(&loop_spec(None))
        .await;

    assert_eq!(outcome.stop_reason, StopReason::Plateau);
    assert_eq!(outcome.iterations.len(), 4);
    assert!(outcome.history.windows(2).all(|w| w[1].quality_score >= w[0].quality_score));
}

#[tokio::test]
async fn test_loop_respects_iteration_cap() {
    let scores = (1..=10).map(|i| Some(i as f64 * 0.1)).collect();
    let bus = EventBus::default();
    let mut receiver = bus.subscribe();

    let outcome = loop_adapter(Arc::new(QualityScript::new(scores)), bus)
        .run(&loop_spec(Some(3)))
        .await;

    assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
    assert_eq!(outcome.history.len(), 3);

    let iterations = receiver
        .drain()
        .into_iter()
        .filter(|e| matches!(e, WorkflowEvent::IterationCompleted { .. }))
        .count();
    assert_eq!(iterations, 3);
}

#[tokio::test]
async fn test_loop_continues_after_failed_iteration() {
    let worker = Arc::new(QualityScript::new(vec![None, Some(0.6), Some(0.97)]));
    let outcome = loop_adapter(worker.clone(), EventBus::default())
        .run(&loop_spec(None))
        .await;

    assert_eq!(outcome.stop_reason, StopReason::QualityTarget);
    assert_eq!(outcome.iterations.len(), 3);
    assert!(outcome.iterations[0].error.is_some());
    assert_eq!(outcome.final_result.as_ref().unwrap()["quality"], 0.97);
    assert_eq!(outcome.result.status(&id("refine")), Some(TaskStatus::Succeeded));

    // failed attempts add no quality state
    assert_eq!(outcome.history.len(), 2);
    assert_eq!(outcome.history[0].iteration, 2);

    let payloads = worker.payloads.lock();
    assert_eq!(payloads[1]["iteration"], 2);
    assert_eq!(payloads[1]["previous_result"], serde_json::Value::Null);
    assert!(payloads[1]["improvement_targets"]
        .as_array()
        .unwrap()
        .contains(&json!("increase_analysis_depth")));
}

#[tokio::test]
async fn test_loop_keeps_last_good_result_after_late_failure() {
    let worker = Arc::new(QualityScript::new(vec![Some(0.4), Some(0.5), None]));
    let outcome = loop_adapter(worker, EventBus::default())
        .run(&loop_spec(Some(3)))
        .await;

    assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
    assert_eq!(outcome.iterations.len(), 3);
    assert!(outcome.iterations[2].error.is_some());
    assert_eq!(outcome.final_result.unwrap()["quality"], 0.5);
    assert!(outcome.result.partial_success);
}

#[tokio::test]
async fn test_loop_with_no_successful_iteration_reports_failed() {
    let worker = Arc::new(QualityScript::new(vec![None]));
    let outcome = loop_adapter(worker.clone(), EventBus::default())
        .run(&loop_spec(Some(3)))
        .await;

    assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
    assert_eq!(outcome.iterations.len(), 3);
    assert!(outcome.history.is_empty());
    assert_eq!(worker.payloads.lock().len(), 3);
    assert_eq!(outcome.result.status(&id("refine")), Some(TaskStatus::Failed));
    assert!(!outcome.result.partial_success);
}

// ============================================================================
// Risk scoring in a DAG
// ============================================================================

#[tokio::test]
async fn test_risk_scoring_worker_in_pipeline() {
    let registry = WorkerRegistry::with_builtin(&RiskConfig::default());
    let scheduler = Scheduler::new(Arc::new(registry), SchedulerOptions::default())
        .with_payload_synthesis(PayloadSynthesis::Dependencies);

    let documents = json!({
        "documents": [
            {"kind": "loan_application", "fields": {"name": "Jordan Avery", "income": "$102,000"}},
            {"kind": "tax_return", "fields": {"name": "Jordan Avery", "income": "$75,750"}},
            {"kind": "id_verification", "fields": {"name": "J. Avery", "issuer": "Republic of Testlandia"}}
        ]
    });

    let outcome = scheduler
        .run(vec![
            TaskDeclaration::new(id("extract"), "echo", json!(null)),
            TaskDeclaration::new(id("score"), RISK_SCORING_ROLE, documents).depends_on(id("extract")),
        ])
        .await
        .unwrap();

    assert!(outcome.result.partial_success);
    let assessment = outcome.result.result(&id("score")).unwrap();
    assert_eq!(assessment["level"], "HIGH");
    assert_eq!(
        assessment["triggered"],
        json!(["cross_field_inconsistency", "placeholder_markers", "identity_mismatch"])
    );
    assert_eq!(assessment["recommendations"].as_array().unwrap().len(), 3);
}

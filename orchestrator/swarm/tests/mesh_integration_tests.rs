// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mesh coordinator integration tests
//!
//! Verifies:
//! - no refinement round starts before every peer finished the previous round
//! - refinement payloads carry every committed peer result
//! - a failed peer is blocked in later rounds without stalling the barrier
//! - extra refinement rounds are each gated by a barrier
//! - timed-out peers keep their worker slot; the run budget bounds the mesh
//! - every peer sees the shared input
//! - participant validation

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskweave_core::application::scheduler::{Scheduler, SchedulerOptions};
use taskweave_core::domain::config::MeshConfig;
use taskweave_core::domain::events::WorkflowEvent;
use taskweave_core::domain::task::{TaskId, TaskStatus};
use taskweave_core::domain::topology::{AgentSpec, MeshSpec};
use taskweave_core::domain::worker::{AgentWorker, WorkerError, WorkerRequest};
use taskweave_core::infrastructure::event_bus::EventBus;
use taskweave_core::infrastructure::worker_registry::WorkerRegistry;
use taskweave_swarm::{MeshCoordinator, MeshError};

/// Peer worker keyed by reported task id (`<peer>/round-<n>`).
#[derive(Default)]
struct PeerWorker {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    log: Mutex<Vec<String>>,
    payloads: Mutex<HashMap<String, serde_json::Value>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl PeerWorker {
    fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    fn fail(mut self, task: &str) -> Self {
        self.failures.insert(task.to_string());
        self
    }

    fn position(&self, event: &str) -> usize {
        self.log
            .lock()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not logged"))
    }

    fn payload(&self, task: &str) -> serde_json::Value {
        self.payloads.lock()[task].clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentWorker for PeerWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError> {
        let id = request.task_id.as_str().to_string();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log.lock().push(format!("start:{id}"));
        self.payloads.lock().insert(id.clone(), request.payload.clone());

        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().push(format!("end:{id}"));

        if self.failures.contains(&id) {
            return Err(WorkerError::Failed(format!("{id} failed")));
        }
        Ok(json!({ "by": id }))
    }
}

fn id(s: &str) -> TaskId {
    TaskId::new(s).unwrap()
}

fn agent(name: &str) -> AgentSpec {
    AgentSpec::new(id(name), "peer", json!({ "claim": "C-7" }))
}

fn mesh(peers: &[&str], refinement_rounds: Option<u32>) -> MeshSpec {
    MeshSpec {
        input: None,
        peers: peers.iter().map(|p| agent(p)).collect(),
        synthesizer: agent("synthesis"),
        refinement_rounds,
    }
}

fn coordinator(worker: Arc<PeerWorker>, pool_size: usize, bus: EventBus) -> MeshCoordinator {
    let options = SchedulerOptions {
        worker_pool_size: pool_size,
        ..SchedulerOptions::default()
    };
    coordinator_with(worker, options, bus)
}

fn coordinator_with(worker: Arc<PeerWorker>, options: SchedulerOptions, bus: EventBus) -> MeshCoordinator {
    let registry = WorkerRegistry::new().with_worker("peer", worker);
    let scheduler = Scheduler::new(Arc::new(registry), options).with_event_bus(bus);
    MeshCoordinator::new(scheduler, MeshConfig::default())
}

fn producers(payload: &serde_json::Value, field: &str) -> Vec<String> {
    payload[field]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["producer"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_slow_peer_holds_back_every_refinement() {
    let worker = Arc::new(
        PeerWorker::default().delay("fraud/round-0", Duration::from_millis(150)),
    );
    let bus = EventBus::default();
    let mut events = bus.subscribe();

    let outcome = coordinator(worker.clone(), 4, bus)
        .run(&mesh(&["income", "fraud", "identity"], None))
        .await
        .unwrap();

    assert!(outcome.result.partial_success);
    assert_eq!(outcome.refinement_rounds, 1);
    assert_eq!(outcome.result.tasks.len(), 7);

    let slow_end = worker.position("end:fraud/round-0");
    for peer in ["income", "fraud", "identity"] {
        assert!(worker.position(&format!("start:{peer}/round-1")) > slow_end);

        let refined = worker.payload(&format!("{peer}/round-1"));
        assert_eq!(refined["round"], 1);
        assert_eq!(
            producers(&refined, "peers"),
            vec!["income/round-0", "fraud/round-0", "identity/round-0"]
        );
    }

    let synthesis = worker.payload("synthesis");
    assert_eq!(
        producers(&synthesis, "upstream"),
        vec!["income/round-1", "fraud/round-1", "identity/round-1"]
    );

    let barriers: Vec<_> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::BarrierReleased {
                round, participants, ..
            } => Some((round, participants)),
            _ => None,
        })
        .collect();
    assert_eq!(barriers, vec![(0, 3)]);
}

#[tokio::test]
async fn test_failed_peer_blocked_in_later_rounds() {
    let worker = Arc::new(PeerWorker::default().fail("fraud/round-0"));
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator(worker.clone(), 4, EventBus::default())
            .run(&mesh(&["income", "fraud", "identity"], None)),
    )
    .await
    .expect("mesh run must not stall on a failed peer")
    .unwrap();
    let result = &outcome.result;

    assert!(!result.partial_success);
    assert_eq!(result.status(&id("fraud/round-0")), Some(TaskStatus::Failed));
    assert_eq!(result.status(&id("fraud/round-1")), Some(TaskStatus::Blocked));
    assert_eq!(result.status(&id("income/round-1")), Some(TaskStatus::Succeeded));
    assert_eq!(result.status(&id("synthesis")), Some(TaskStatus::Succeeded));

    let refined = worker.payload("income/round-1");
    assert_eq!(
        producers(&refined, "peers"),
        vec!["income/round-0", "identity/round-0"]
    );
    assert_eq!(
        producers(&worker.payload("synthesis"), "upstream"),
        vec!["income/round-1", "identity/round-1"]
    );
}

#[tokio::test]
async fn test_extra_rounds_each_gated_by_barrier() {
    let worker = Arc::new(PeerWorker::default().delay("b/round-1", Duration::from_millis(80)));
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let coordinator = coordinator(worker.clone(), 4, bus);

    let outcome = coordinator.run(&mesh(&["a", "b"], Some(2))).await.unwrap();

    assert_eq!(outcome.result.tasks.len(), 7);
    assert!(worker.position("start:a/round-2") > worker.position("end:b/round-1"));

    let store = &outcome.context;
    for round in 0..=2 {
        let category = format!("mesh:{}:round-{round}", outcome.run_id);
        assert_eq!(store.category(&category).len(), 2, "round {round}");
    }

    let released = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, WorkflowEvent::BarrierReleased { .. }))
        .count();
    assert_eq!(released, 2);
}

#[tokio::test]
async fn test_pool_of_one_does_not_deadlock_at_barrier() {
    let worker = Arc::new(PeerWorker::default());
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator(worker, 1, EventBus::default()).run(&mesh(&["a", "b", "c"], None)),
    )
    .await
    .expect("mesh run must finish with a single worker slot")
    .unwrap();

    assert!(outcome.result.partial_success);
}

#[tokio::test]
async fn test_synthesizer_blocked_without_final_results() {
    let worker = Arc::new(PeerWorker::default().fail("a/round-0").fail("b/round-1"));
    let outcome = coordinator(worker, 4, EventBus::default())
        .run(&mesh(&["a", "b"], None))
        .await
        .unwrap();

    let synthesis = &outcome.result.tasks[&id("synthesis")];
    assert_eq!(synthesis.status, TaskStatus::Blocked);
    assert!(synthesis.error.as_deref().unwrap().contains("a/round-1"));
}

#[tokio::test]
async fn test_rejects_malformed_participants() {
    let worker = Arc::new(PeerWorker::default());
    let coordinator = coordinator(worker, 4, EventBus::default());

    let err = coordinator.run(&mesh(&[], None)).await.unwrap_err();
    assert!(matches!(err, MeshError::NoPeers));

    let err = coordinator.run(&mesh(&["a", "a"], None)).await.unwrap_err();
    assert!(matches!(err, MeshError::DuplicateParticipant(ref dup) if dup.as_str() == "a"));

    let err = coordinator
        .run(&mesh(&["synthesis", "b"], None))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::DuplicateParticipant(_)));
}

#[tokio::test]
async fn test_timed_out_peer_keeps_its_worker_slot() {
    let worker = Arc::new(PeerWorker::default().delay("a/round-0", Duration::from_millis(300)));
    let mut spec = mesh(&["a", "b"], None);
    for peer in &mut spec.peers {
        peer.timeout = Some(Duration::from_millis(20));
    }

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator(worker.clone(), 1, EventBus::default()).run(&spec),
    )
    .await
    .expect("mesh run must finish once the slow worker returns")
    .unwrap();
    let result = &outcome.result;

    assert_eq!(result.status(&id("a/round-0")), Some(TaskStatus::Failed));
    assert_eq!(result.status(&id("a/round-1")), Some(TaskStatus::Blocked));
    assert_eq!(result.status(&id("b/round-1")), Some(TaskStatus::Succeeded));
    assert_eq!(result.status(&id("synthesis")), Some(TaskStatus::Succeeded));
    // b's refinement needs the slot the timed-out worker still holds
    assert!(worker.position("start:b/round-1") > worker.position("end:a/round-0"));
    assert_eq!(worker.peak(), 1);
}

#[tokio::test]
async fn test_execution_timeout_bounds_the_mesh() {
    let worker = Arc::new(PeerWorker::default().delay("b/round-0", Duration::from_secs(5)));
    let options = SchedulerOptions {
        execution_timeout: Some(Duration::from_millis(200)),
        ..SchedulerOptions::default()
    };
    let started = std::time::Instant::now();

    let outcome = coordinator_with(worker, options, EventBus::default())
        .run(&mesh(&["a", "b"], None))
        .await
        .unwrap();
    let result = &outcome.result;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.tasks.len(), 5);
    assert_eq!(result.status(&id("a/round-0")), Some(TaskStatus::Succeeded));

    let slow = &result.tasks[&id("b/round-0")];
    assert_eq!(slow.status, TaskStatus::Failed);
    assert!(slow.error.as_deref().unwrap().contains("timed out after 200ms"));

    assert_eq!(result.status(&id("a/round-1")), Some(TaskStatus::Failed));
    assert_eq!(result.status(&id("b/round-1")), Some(TaskStatus::Blocked));
    assert_eq!(result.status(&id("synthesis")), Some(TaskStatus::Blocked));
}

#[tokio::test]
async fn test_peers_share_the_mesh_input() {
    let worker = Arc::new(PeerWorker::default());
    let mut spec = mesh(&["a", "b"], None);
    spec.input = Some(json!({ "ticker": "ACME", "claim": "shared" }));

    coordinator(worker.clone(), 4, EventBus::default())
        .run(&spec)
        .await
        .unwrap();

    for task in ["a/round-0", "b/round-0", "a/round-1"] {
        assert_eq!(
            worker.payload(task)["input"],
            json!({ "ticker": "ACME", "claim": "C-7" })
        );
    }
}

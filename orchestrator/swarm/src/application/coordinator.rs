// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mesh Coordinator
//!
//! Drives one mesh run:
//!
//! 1. Every peer is spawned as its own driver task and runs round 0 against the
//!    shared input.
//! 2. After each round the drivers meet at a [`Barrier`] sized to the number of
//!    peers. Only once all of them have committed their round result (or
//!    failed) does any driver start the next round.
//! 3. In refinement round `n` a peer receives the results of round `n - 1`
//!    from every peer that produced one, in declaration order.
//! 4. The synthesizer runs on the final-round results.
//!
//! A peer that fails stops refining: its later rounds are reported `Blocked`,
//! but its driver keeps arriving at every barrier so the others are never left
//! waiting. Worker invocations share the scheduler's pool bound; a permit is
//! never held while waiting at a barrier, and a timed-out worker keeps its
//! permit until it returns. The scheduler's `execution_timeout`, when set,
//! bounds the whole run, synthesizer included.

use crate::domain::mesh::{peer_input, MeshError, MeshOutcome, MeshRound};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use taskweave_core::application::scheduler::{RunDeadline, Scheduler};
use taskweave_core::domain::config::MeshConfig;
use taskweave_core::domain::events::WorkflowEvent;
use taskweave_core::domain::result::{RunId, TaskReport, WorkflowResult};
use taskweave_core::domain::task::{TaskError, TaskId, TaskStatus};
use taskweave_core::domain::topology::{AgentSpec, MeshSpec, TopologyKind};
use tokio::sync::{Barrier, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

pub struct MeshCoordinator {
    scheduler: Scheduler,
    config: MeshConfig,
}

impl MeshCoordinator {
    pub fn new(scheduler: Scheduler, config: MeshConfig) -> Self {
        Self {
            scheduler: scheduler.with_topology(TopologyKind::Mesh),
            config,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run every round and the synthesizer.
    ///
    /// Fails only when the participants are malformed; peer and synthesizer
    /// failures are reported per task in the outcome.
    pub async fn run(&self, spec: &MeshSpec) -> Result<MeshOutcome, MeshError> {
        let refinement_rounds = spec
            .refinement_rounds
            .unwrap_or(self.config.refinement_rounds);
        let run_id = RunId::new();
        let round_ids = Self::round_ids(spec, &self.config.category_prefix, run_id, refinement_rounds)?;

        let participants = spec.peers.len();
        let scheduler = self.scheduler.for_run();
        let run = MeshRun {
            pool: Arc::new(Semaphore::new(scheduler.options().worker_pool_size.max(1))),
            deadline: scheduler.start_deadline(),
            scheduler,
            run_id,
        };
        let bus = run.scheduler.event_bus();
        info!(
            run_id = %run_id,
            peers = participants,
            refinement_rounds,
            execution_timeout = ?run.scheduler.options().execution_timeout,
            "Starting mesh workflow"
        );
        bus.publish(WorkflowEvent::WorkflowStarted {
            run_id,
            topology: TopologyKind::Mesh.to_string(),
            task_count: participants * (refinement_rounds as usize + 1) + 1,
            started_at: Utc::now(),
        });

        let barrier = Arc::new(Barrier::new(participants));
        let peer_ids: Arc<Vec<TaskId>> = Arc::new(spec.peers.iter().map(|p| p.id.clone()).collect());

        let handles: Vec<_> = spec
            .peers
            .iter()
            .zip(round_ids)
            .map(|(peer, ids)| {
                let driver = PeerDriver {
                    run: run.clone(),
                    prefix: self.config.category_prefix.clone(),
                    barrier: barrier.clone(),
                    peer_ids: peer_ids.clone(),
                    participants,
                    input: peer_input(spec.input.as_ref(), &peer.payload),
                };
                let fallback = ids.clone();
                (fallback, tokio::spawn(driver.run(peer.clone(), ids)))
            })
            .collect();

        let mut reports = BTreeMap::new();
        let (fallbacks, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (ids, outcome) in fallbacks.into_iter().zip(join_all(handles).await) {
            match outcome {
                Ok(peer_reports) => reports.extend(peer_reports),
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Peer driver panicked");
                    for id in ids {
                        reports.insert(id, TaskReport::failed("peer driver did not complete"));
                    }
                }
            }
        }

        let last = MeshRound::new(&self.config.category_prefix, run_id, refinement_rounds);
        let synthesizer = Self::synthesize(&run, &spec.synthesizer, &last, &peer_ids).await;
        reports.insert(spec.synthesizer.id.clone(), synthesizer);

        let result = WorkflowResult::from_reports(reports);
        let succeeded = result.count(TaskStatus::Succeeded);
        let failed = result.count(TaskStatus::Failed);
        let blocked = result.count(TaskStatus::Blocked);
        info!(
            run_id = %run_id,
            succeeded,
            failed,
            blocked,
            partial_success = result.partial_success,
            "Mesh workflow completed"
        );
        bus.publish(WorkflowEvent::WorkflowCompleted {
            run_id,
            partial_success: result.partial_success,
            succeeded,
            failed,
            blocked,
            completed_at: Utc::now(),
        });

        Ok(MeshOutcome {
            run_id,
            refinement_rounds,
            result,
            context: run.scheduler.store().clone(),
        })
    }

    /// Per-peer task ids for every round, checking all reported ids are unique.
    fn round_ids(
        spec: &MeshSpec,
        prefix: &str,
        run_id: RunId,
        refinement_rounds: u32,
    ) -> Result<Vec<Vec<TaskId>>, MeshError> {
        if spec.peers.is_empty() {
            return Err(MeshError::NoPeers);
        }

        let mut seen = HashSet::new();
        for id in spec.peers.iter().map(|p| &p.id).chain([&spec.synthesizer.id]) {
            if !seen.insert(id.clone()) {
                return Err(MeshError::DuplicateParticipant(id.clone()));
            }
        }

        let mut all = Vec::with_capacity(spec.peers.len());
        for peer in &spec.peers {
            let mut ids = Vec::with_capacity(refinement_rounds as usize + 1);
            for round in 0..=refinement_rounds {
                let id = MeshRound::new(prefix, run_id, round).task_id(&peer.id)?;
                if !seen.insert(id.clone()) {
                    return Err(MeshError::DuplicateParticipant(id));
                }
                ids.push(id);
            }
            all.push(ids);
        }
        Ok(all)
    }

    async fn synthesize(
        run: &MeshRun,
        synthesizer: &AgentSpec,
        last: &MeshRound<'_>,
        peers: &[TaskId],
    ) -> TaskReport {
        let run_id = run.run_id;
        let upstream = round_results(&run.scheduler, last, peers);

        if upstream.is_empty() {
            warn!(run_id = %run_id, task_id = %synthesizer.id, "No final-round results to synthesize");
            let Some(cause) = peers.first().and_then(|peer| last.task_id(peer).ok()) else {
                return TaskReport::blocked("no peer results to synthesize");
            };
            run.scheduler.event_bus().publish(WorkflowEvent::TaskBlocked {
                run_id,
                task_id: synthesizer.id.clone(),
                dependency: cause.clone(),
                blocked_at: Utc::now(),
            });
            return TaskReport::blocked(TaskError::DependencyFailure { dependency: cause });
        }

        let payload = json!({
            "input": synthesizer.payload,
            "upstream": upstream,
        });
        let results_category = run.scheduler.options().results_category.clone();
        match invoke(
            run,
            &synthesizer.id,
            synthesizer,
            payload,
            (results_category.as_str(), synthesizer.id.as_str()),
        )
        .await
        {
            Ok(value) => TaskReport::succeeded(value),
            Err(error) => TaskReport::failed(error),
        }
    }
}

/// Per-run state shared by the peer drivers and the synthesizer.
#[derive(Clone)]
struct MeshRun {
    scheduler: Scheduler,
    run_id: RunId,
    pool: Arc<Semaphore>,
    deadline: Option<RunDeadline>,
}

impl MeshRun {
    /// Wait for a worker slot, but never past the run deadline.
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, TaskError> {
        let acquire = self.pool.clone().acquire_owned();
        let acquired = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.instant(), acquire)
                .await
                .map_err(|_| deadline.expired())?,
            None => acquire.await,
        };
        acquired.map_err(|e| TaskError::Execution {
            message: format!("worker pool closed: {e}"),
        })
    }
}

/// One peer's walk through every round.
struct PeerDriver {
    run: MeshRun,
    prefix: String,
    barrier: Arc<Barrier>,
    peer_ids: Arc<Vec<TaskId>>,
    participants: usize,
    /// Shared mesh input overlaid with this peer's payload
    input: serde_json::Value,
}

impl PeerDriver {
    async fn run(self, peer: AgentSpec, round_ids: Vec<TaskId>) -> Vec<(TaskId, TaskReport)> {
        let run_id = self.run.run_id;
        let last_round = round_ids.len().saturating_sub(1);
        let mut reports = Vec::with_capacity(round_ids.len());
        let mut failed_at: Option<TaskId> = None;

        for (index, task_id) in round_ids.into_iter().enumerate() {
            let round = MeshRound::new(&self.prefix, run_id, index as u32);

            let report = match &failed_at {
                Some(cause) => {
                    debug!(run_id = %run_id, task_id = %task_id, dependency = %cause, "Peer skips round");
                    self.run.scheduler.event_bus().publish(WorkflowEvent::TaskBlocked {
                        run_id,
                        task_id: task_id.clone(),
                        dependency: cause.clone(),
                        blocked_at: Utc::now(),
                    });
                    TaskReport::blocked(TaskError::DependencyFailure {
                        dependency: cause.clone(),
                    })
                }
                None => {
                    let payload = self.payload(&round);
                    let category = round.category();
                    match invoke(
                        &self.run,
                        &task_id,
                        &peer,
                        payload,
                        (category.as_str(), peer.id.as_str()),
                    )
                    .await
                    {
                        Ok(value) => TaskReport::succeeded(value),
                        Err(error) => {
                            failed_at = Some(task_id.clone());
                            TaskReport::failed(error)
                        }
                    }
                }
            };
            reports.push((task_id, report));

            if index < last_round {
                let wait = self.barrier.wait().await;
                if wait.is_leader() {
                    info!(run_id = %run_id, round = round.round, participants = self.participants, "Barrier released");
                    self.run.scheduler.event_bus().publish(WorkflowEvent::BarrierReleased {
                        run_id,
                        round: round.round,
                        participants: self.participants,
                        released_at: Utc::now(),
                    });
                }
            }
        }

        reports
    }

    fn payload(&self, round: &MeshRound<'_>) -> serde_json::Value {
        match round.previous() {
            None => json!({
                "input": self.input,
                "round": round.round,
            }),
            Some(previous) => json!({
                "input": self.input,
                "round": round.round,
                "peers": round_results(&self.run.scheduler, &previous, &self.peer_ids),
            }),
        }
    }
}

/// Committed results of `round`, in peer declaration order.
fn round_results(
    scheduler: &Scheduler,
    round: &MeshRound<'_>,
    peers: &[TaskId],
) -> Vec<serde_json::Value> {
    let committed: HashMap<String, serde_json::Value> = scheduler
        .store()
        .category(&round.category())
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect();

    peers
        .iter()
        .filter_map(|peer| {
            committed.get(peer.as_str()).map(|result| {
                json!({
                    "producer": round.label(peer),
                    "result": result,
                })
            })
        })
        .collect()
}

/// Invoke `agent` as `task_id` once a pool slot is free, commit a success to
/// `(category, key)` and publish the task's lifecycle events.
async fn invoke(
    run: &MeshRun,
    task_id: &TaskId,
    agent: &AgentSpec,
    payload: serde_json::Value,
    (category, key): (&str, &str),
) -> Result<serde_json::Value, TaskError> {
    let scheduler = &run.scheduler;
    let run_id = run.run_id;
    let bus = scheduler.event_bus();
    let started = Instant::now();

    let outcome = match run.acquire().await {
        Ok(permit) => {
            debug!(run_id = %run_id, task_id = %task_id, role = %agent.agent_role, "Task started");
            bus.publish(WorkflowEvent::TaskStarted {
                run_id,
                task_id: task_id.clone(),
                role: agent.agent_role.clone(),
                started_at: Utc::now(),
            });

            let timeout = agent.timeout.unwrap_or(scheduler.options().task_timeout);
            scheduler
                .invoke_within(
                    task_id,
                    &agent.agent_role,
                    payload,
                    timeout,
                    run.deadline,
                    Some(permit),
                )
                .await
                .and_then(|value| {
                    scheduler
                        .store()
                        .put(category, key, value.clone(), task_id.as_str())
                        .map(|_| value)
                        .map_err(|e| TaskError::Execution {
                            message: e.to_string(),
                        })
                })
        }
        Err(error) => Err(error),
    };

    match &outcome {
        Ok(_) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(run_id = %run_id, task_id = %task_id, duration_ms, "Task succeeded");
            bus.publish(WorkflowEvent::TaskSucceeded {
                run_id,
                task_id: task_id.clone(),
                duration_ms,
                completed_at: Utc::now(),
            });
        }
        Err(error) => {
            warn!(run_id = %run_id, task_id = %task_id, error = %error, "Task failed");
            bus.publish(WorkflowEvent::TaskFailed {
                run_id,
                task_id: task_id.clone(),
                error: error.to_string(),
                failed_at: Utc::now(),
            });
        }
    }
    outcome
}

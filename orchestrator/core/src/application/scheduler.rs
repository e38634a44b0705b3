// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scheduler / Executor
//!
//! Drives a [`WorkflowGraph`] batch by batch:
//!
//! 1. The current batch is moved `Pending -> Ready` and every task is spawned.
//!    A semaphore sized to `worker_pool_size` bounds how many run at once;
//!    the rest queue for a permit.
//! 2. Each task resolves its Agent Worker by role and invokes it under the
//!    task's timeout. The worker runs in its own spawned task: on timeout the
//!    scheduler stops waiting and discards the eventual result, but does not
//!    cancel the worker. The pool permit moves into that spawned task, so a
//!    timed-out worker keeps its slot until it really returns.
//! 3. Once the whole batch has resolved, the [`ReadinessTracker`] folds the
//!    outcomes in. Dependents of failures are blocked transitively before the
//!    next batch is formed.
//!
//! An optional `execution_timeout` bounds the whole run. Every invocation's
//! timeout is cut to what is left of it; tasks still queued or not yet started
//! when it expires fail with `Timeout`, and their dependents are blocked as
//! usual.
//!
//! Each run gets its own [`SharedContextStore`] unless one was injected with
//! [`Scheduler::with_store`], so workers never see another run's results.
//!
//! The scheduler never returns an error for task failures. The outcome always
//! contains every task of the graph.

use crate::domain::config::SchedulerConfig;
use crate::domain::context::SharedContextStore;
use crate::domain::events::WorkflowEvent;
use crate::domain::graph::{GraphError, WorkflowGraph};
use crate::domain::plan::{ExecutionPlan, ReadinessTracker};
use crate::domain::result::{RunId, WorkflowResult};
use crate::domain::task::{Task, TaskDeclaration, TaskError, TaskId, TaskStatus};
use crate::domain::topology::TopologyKind;
use crate::domain::worker::WorkerRequest;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::worker_registry::WorkerRegistry;
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// How a task's payload is built before invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadSynthesis {
    /// Declared payload, unchanged
    #[default]
    None,
    /// `{input, upstream}` over succeeded direct dependencies, in declaration order
    Dependencies,
    /// `{input, upstream}` over every succeeded ancestor, in execution order
    Ancestors,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub worker_pool_size: usize,
    pub task_timeout: Duration,
    pub results_category: String,
    /// Bound on a whole run, if any
    pub execution_timeout: Option<Duration>,
    pub payload_synthesis: PayloadSynthesis,
    /// Label carried on events
    pub topology: TopologyKind,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            worker_pool_size: config.worker_pool_size,
            task_timeout: config.task_timeout,
            results_category: config.results_category.clone(),
            execution_timeout: config.execution_timeout,
            payload_synthesis: PayloadSynthesis::None,
            topology: TopologyKind::Dag,
        }
    }
}

/// What one scheduler run produced.
#[derive(Debug, Clone)]
pub struct SchedulerOutcome {
    pub run_id: RunId,
    /// Batches in the order they were started
    pub batches: Vec<Vec<TaskId>>,
    pub result: WorkflowResult,
    /// Store the run's workers read from and its results were committed to
    pub context: SharedContextStore,
}

/// Execution budget of one run, fixed when the run starts.
#[derive(Debug, Clone, Copy)]
pub struct RunDeadline {
    at: tokio::time::Instant,
    budget: Duration,
}

impl RunDeadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            at: tokio::time::Instant::now() + budget,
            budget,
        }
    }

    pub fn instant(&self) -> tokio::time::Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(tokio::time::Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The error recorded for work cut off by this deadline.
    pub fn expired(&self) -> TaskError {
        TaskError::Timeout { after: self.budget }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<WorkerRegistry>,
    store: SharedContextStore,
    /// Set by `with_store`: every run writes to the same store
    shared_store: bool,
    event_bus: EventBus,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(registry: Arc<WorkerRegistry>, options: SchedulerOptions) -> Self {
        Self {
            registry,
            store: SharedContextStore::new(),
            shared_store: false,
            event_bus: EventBus::default(),
            options,
        }
    }

    /// Share `store` across every run of this scheduler.
    pub fn with_store(mut self, store: SharedContextStore) -> Self {
        self.store = store;
        self.shared_store = true;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_payload_synthesis(mut self, synthesis: PayloadSynthesis) -> Self {
        self.options.payload_synthesis = synthesis;
        self
    }

    pub fn with_topology(mut self, topology: TopologyKind) -> Self {
        self.options.topology = topology;
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Store behind the workers' context views. Unless the store is shared,
    /// this is only populated on a handle returned by [`Scheduler::for_run`].
    pub fn store(&self) -> &SharedContextStore {
        &self.store
    }

    /// Handle for a single run: same workers, bus and options, with a fresh
    /// context store unless one was injected with [`Scheduler::with_store`].
    pub fn for_run(&self) -> Self {
        let mut run = self.clone();
        if !self.shared_store {
            run.store = SharedContextStore::new();
        }
        run
    }

    /// Start the run budget, when `execution_timeout` is configured.
    pub fn start_deadline(&self) -> Option<RunDeadline> {
        self.options.execution_timeout.map(RunDeadline::start)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Static layering of a graph, as a fully successful run would execute it.
    pub fn plan(graph: &WorkflowGraph) -> ExecutionPlan {
        ExecutionPlan::compute(graph)
    }

    /// Build and execute. Only graph validation can fail.
    pub async fn run(&self, declarations: Vec<TaskDeclaration>) -> Result<SchedulerOutcome, GraphError> {
        let graph = WorkflowGraph::build(declarations)?;
        Ok(self.execute(&graph).await)
    }

    pub async fn execute(&self, graph: &WorkflowGraph) -> SchedulerOutcome {
        self.for_run().execute_run(graph).await
    }

    async fn execute_run(&self, graph: &WorkflowGraph) -> SchedulerOutcome {
        let run_id = RunId::new();
        let pool_size = self.options.worker_pool_size.max(1);
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let deadline = self.start_deadline();

        info!(
            run_id = %run_id,
            topology = %self.options.topology,
            tasks = graph.len(),
            pool_size,
            execution_timeout = ?self.options.execution_timeout,
            "Starting workflow"
        );
        self.event_bus.publish(WorkflowEvent::WorkflowStarted {
            run_id,
            topology: self.options.topology.to_string(),
            task_count: graph.len(),
            started_at: Utc::now(),
        });

        let mut tracker = ReadinessTracker::new(graph);
        let mut batch = tracker.initial_batch();
        let mut batches = Vec::new();
        let mut completed: Vec<TaskId> = Vec::new();

        while !batch.is_empty() {
            let index = batches.len();
            info!(run_id = %run_id, batch = index, tasks = ?batch, "Starting batch");
            self.event_bus.publish(WorkflowEvent::BatchStarted {
                run_id,
                batch: index,
                task_ids: batch.clone(),
                started_at: Utc::now(),
            });

            let mut handles = Vec::with_capacity(batch.len());
            for id in &batch {
                let Some(task) = graph.task(id).cloned() else {
                    error!(task_id = %id, "Batch references a task outside the graph");
                    continue;
                };
                if let Err(e) = task.transition(TaskStatus::Pending, TaskStatus::Ready) {
                    error!(task_id = %id, error = %e, "Task could not be made ready");
                    continue;
                }
                let payload = self.synthesize_payload(graph, &task, &completed);
                handles.push(tokio::spawn(self.clone().run_task(
                    run_id,
                    task,
                    payload,
                    semaphore.clone(),
                    deadline,
                )));
            }

            let mut succeeded = Vec::new();
            let mut failed = Vec::new();
            for outcome in futures::future::join_all(handles).await {
                match outcome {
                    Ok((id, true)) => succeeded.push(id),
                    Ok((id, false)) => failed.push(id),
                    Err(e) => error!(run_id = %run_id, error = %e, "Task driver panicked"),
                }
            }

            // tasks whose driver died never resolved; treat them as failed
            for id in &batch {
                if !succeeded.contains(id) && !failed.contains(id) {
                    if let Some(task) = graph.task(id) {
                        Self::force_fail(task);
                    }
                    failed.push(id.clone());
                }
            }

            completed.extend(batch.iter().filter(|id| succeeded.contains(id)).cloned());
            batches.push(std::mem::take(&mut batch));

            let resolution = tracker.resolve(&succeeded, &failed);
            for (blocked, cause) in resolution.blocked {
                let Some(task) = graph.task(&blocked) else {
                    continue;
                };
                match task.block(cause.clone()) {
                    Ok(()) => {
                        warn!(run_id = %run_id, task_id = %blocked, dependency = %cause, "Task blocked");
                        self.event_bus.publish(WorkflowEvent::TaskBlocked {
                            run_id,
                            task_id: blocked,
                            dependency: cause,
                            blocked_at: Utc::now(),
                        });
                    }
                    Err(e) => error!(task_id = %blocked, error = %e, "Block transition rejected"),
                }
            }
            batch = resolution.ready;
        }

        let result = WorkflowResult::from_graph(graph);
        let succeeded = result.count(TaskStatus::Succeeded);
        let failed = result.count(TaskStatus::Failed);
        let blocked = result.count(TaskStatus::Blocked);

        info!(
            run_id = %run_id,
            succeeded,
            failed,
            blocked,
            partial_success = result.partial_success,
            "Workflow completed"
        );
        self.event_bus.publish(WorkflowEvent::WorkflowCompleted {
            run_id,
            partial_success: result.partial_success,
            succeeded,
            failed,
            blocked,
            completed_at: Utc::now(),
        });

        SchedulerOutcome {
            run_id,
            batches,
            result,
            context: self.store.clone(),
        }
    }

    /// Runs one task to a terminal status. Returns whether it succeeded.
    async fn run_task(
        self,
        run_id: RunId,
        task: Arc<Task>,
        payload: serde_json::Value,
        semaphore: Arc<Semaphore>,
        deadline: Option<RunDeadline>,
    ) -> (TaskId, bool) {
        let id = task.id.clone();

        let acquired = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.instant(), semaphore.acquire_owned())
                .await
                .map_err(|_| deadline.expired()),
            None => Ok(semaphore.acquire_owned().await),
        };
        let permit = match acquired {
            Ok(Ok(permit)) => match deadline {
                // the budget may have run out while this task waited for a slot
                Some(deadline) if deadline.is_expired() => Err(deadline.expired()),
                _ => Ok(permit),
            },
            Ok(Err(e)) => {
                error!(task_id = %id, error = %e, "Worker pool closed");
                Self::force_fail(&task);
                return (id, false);
            }
            Err(expired) => Err(expired),
        };

        if let Err(e) = task.transition(TaskStatus::Ready, TaskStatus::Running) {
            error!(task_id = %id, error = %e, "Task could not be started");
            return (id, false);
        }

        let started = Instant::now();
        let outcome = match permit {
            Ok(permit) => {
                debug!(run_id = %run_id, task_id = %id, role = %task.agent_role, "Task started");
                self.event_bus.publish(WorkflowEvent::TaskStarted {
                    run_id,
                    task_id: id.clone(),
                    role: task.agent_role.clone(),
                    started_at: Utc::now(),
                });

                let timeout = task.timeout.unwrap_or(self.options.task_timeout);
                self.invoke_within(
                    &task.id,
                    &task.agent_role,
                    payload,
                    timeout,
                    deadline,
                    Some(permit),
                )
                .await
            }
            Err(expired) => {
                debug!(run_id = %run_id, task_id = %id, "Execution budget spent before task start");
                Err(expired)
            }
        };

        let outcome = match outcome {
            Ok(value) => self
                .store
                .put(&self.options.results_category, id.as_str(), value.clone(), id.as_str())
                .map(|_| value)
                .map_err(|e| TaskError::Execution {
                    message: e.to_string(),
                }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                if let Err(e) = task.succeed(value) {
                    error!(task_id = %id, error = %e, "Success transition rejected");
                    return (id, false);
                }
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(run_id = %run_id, task_id = %id, duration_ms, "Task succeeded");
                self.event_bus.publish(WorkflowEvent::TaskSucceeded {
                    run_id,
                    task_id: id.clone(),
                    duration_ms,
                    completed_at: Utc::now(),
                });
                (id, true)
            }
            Err(error) => {
                warn!(run_id = %run_id, task_id = %id, error = %error, "Task failed");
                self.event_bus.publish(WorkflowEvent::TaskFailed {
                    run_id,
                    task_id: id.clone(),
                    error: error.to_string(),
                    failed_at: Utc::now(),
                });
                if let Err(e) = task.fail(error) {
                    error!(task_id = %id, error = %e, "Failure transition rejected");
                }
                (id, false)
            }
        }
    }

    /// Resolve the worker for `role` and invoke it under `timeout`, cut short
    /// by `deadline` when one is given.
    ///
    /// Used directly by topologies that drive invocations themselves (loop,
    /// mesh) instead of going through a graph. The permit, if any, is held by
    /// the spawned worker rather than the caller: after a timeout the slot
    /// stays taken until the worker actually returns.
    pub async fn invoke_within(
        &self,
        task_id: &TaskId,
        role: &str,
        payload: serde_json::Value,
        timeout: Duration,
        deadline: Option<RunDeadline>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<serde_json::Value, TaskError> {
        let (timeout, expiry) = match deadline.map(|d| (d.remaining(), d)) {
            Some((remaining, deadline)) if remaining < timeout => (remaining, deadline.expired()),
            _ => (timeout, TaskError::Timeout { after: timeout }),
        };
        if timeout.is_zero() {
            return Err(expiry);
        }

        let worker = self
            .registry
            .resolve(role)
            .ok_or_else(|| TaskError::WorkerNotFound {
                role: role.to_string(),
            })?;

        let request = WorkerRequest {
            task_id: task_id.clone(),
            role: role.to_string(),
            payload,
            context: self.store.view(),
        };

        // detached so a timeout discards the result without cancelling the worker
        let handle = tokio::spawn(async move {
            let _permit = permit;
            worker.invoke(request).await
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(TaskError::Execution {
                message: e.to_string(),
            }),
            Ok(Err(join_error)) => Err(TaskError::Execution {
                message: format!("worker aborted: {join_error}"),
            }),
            Err(_) => Err(expiry),
        }
    }

    /// Move a task that never got to run into `Failed`.
    fn force_fail(task: &Task) {
        let message = "task driver did not complete".to_string();
        let _ = task.transition(TaskStatus::Ready, TaskStatus::Running);
        if task.status() == TaskStatus::Running {
            let _ = task.fail(TaskError::Execution { message });
        }
    }

    fn synthesize_payload(
        &self,
        graph: &WorkflowGraph,
        task: &Task,
        completed: &[TaskId],
    ) -> serde_json::Value {
        let producers: Vec<TaskId> = match self.options.payload_synthesis {
            PayloadSynthesis::None => return task.payload.clone(),
            PayloadSynthesis::Dependencies => task.dependencies.clone(),
            PayloadSynthesis::Ancestors => {
                let ancestors: HashSet<TaskId> = graph.ancestors(&task.id);
                completed
                    .iter()
                    .filter(|id| ancestors.contains(*id))
                    .cloned()
                    .collect()
            }
        };

        let upstream: Vec<serde_json::Value> = producers
            .iter()
            .filter_map(|producer| {
                let dependency = graph.task(producer)?;
                let state = dependency.snapshot();
                (state.status == TaskStatus::Succeeded).then(|| {
                    json!({
                        "producer": producer,
                        "result": state.result,
                    })
                })
            })
            .collect();

        json!({
            "input": task.payload,
            "upstream": upstream,
        })
    }
}

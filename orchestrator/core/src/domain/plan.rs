// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Plan
//!
//! Batch computation over a [`WorkflowGraph`] using a layered variant of Kahn's
//! algorithm.
//!
//! - [`ExecutionPlan`] is the static layering computed once per build, assuming
//!   every task succeeds. It is what `taskweave plan` prints and what a fully
//!   successful run executes.
//! - [`ReadinessTracker`] is the dynamic form the scheduler drives: in-degree
//!   counts only *unresolved* dependencies, failures block their dependents
//!   transitively before the next batch is formed, and independent branches keep
//!   going.

use crate::domain::graph::WorkflowGraph;
use crate::domain::task::{DependencyPolicy, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordered sequence of batches; tasks inside one batch may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Vec<TaskId>>,
}

impl ExecutionPlan {
    /// Layered topological sort. The graph is acyclic by construction, so every
    /// task lands in exactly one batch.
    pub fn compute(graph: &WorkflowGraph) -> Self {
        let mut in_degree: HashMap<&TaskId, usize> = graph
            .tasks()
            .map(|task| (&task.id, task.dependencies.len()))
            .collect();

        let mut current: Vec<TaskId> = graph
            .task_ids()
            .iter()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .cloned()
            .collect();

        let mut batches = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for dependent in graph.dependents(id) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.clone());
                        }
                    }
                }
            }
            sort_by_declaration(graph, &mut next);
            batches.push(std::mem::replace(&mut current, next));
        }

        Self { batches }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Index of the batch that contains `id`.
    pub fn batch_of(&self, id: &TaskId) -> Option<usize> {
        self.batches.iter().position(|batch| batch.contains(id))
    }

    /// Every task in batch order.
    pub fn flatten(&self) -> Vec<TaskId> {
        self.batches.iter().flatten().cloned().collect()
    }
}

fn sort_by_declaration(graph: &WorkflowGraph, ids: &mut [TaskId]) {
    ids.sort_by_key(|id| graph.position(id).unwrap_or(usize::MAX));
}

/// Outcome of resolving one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Tasks whose dependencies are now all resolved and which may run next
    pub ready: Vec<TaskId>,
    /// Newly blocked tasks with the dependency that caused the block
    pub blocked: Vec<(TaskId, TaskId)>,
}

/// Dynamic Kahn state for one scheduler run.
#[derive(Debug)]
pub struct ReadinessTracker<'g> {
    graph: &'g WorkflowGraph,
    unresolved: HashMap<TaskId, usize>,
    succeeded_dependencies: HashMap<TaskId, usize>,
    /// First failed dependency seen per task, used as the block cause for
    /// `AnySucceeded` tasks
    first_failure: HashMap<TaskId, TaskId>,
    blocked: HashSet<TaskId>,
}

impl<'g> ReadinessTracker<'g> {
    pub fn new(graph: &'g WorkflowGraph) -> Self {
        let unresolved = graph
            .tasks()
            .map(|task| (task.id.clone(), task.dependencies.len()))
            .collect();

        Self {
            graph,
            unresolved,
            succeeded_dependencies: HashMap::new(),
            first_failure: HashMap::new(),
            blocked: HashSet::new(),
        }
    }

    /// Tasks with no dependencies at all.
    pub fn initial_batch(&self) -> Vec<TaskId> {
        self.graph
            .task_ids()
            .iter()
            .filter(|id| self.unresolved.get(*id).copied() == Some(0))
            .cloned()
            .collect()
    }

    /// Fold the outcomes of a finished batch into the counters.
    ///
    /// Failures are propagated transitively (a blocked task counts as a failed
    /// dependency for its own dependents) before the ready set is returned.
    pub fn resolve(&mut self, succeeded: &[TaskId], failed: &[TaskId]) -> Resolution {
        let mut resolution = Resolution::default();
        let mut worklist: Vec<(TaskId, bool)> = succeeded
            .iter()
            .map(|id| (id.clone(), true))
            .chain(failed.iter().map(|id| (id.clone(), false)))
            .collect();

        while let Some((resolved, ok)) = worklist.pop() {
            for dependent in self.graph.dependents(&resolved) {
                if self.blocked.contains(dependent) {
                    continue;
                }
                let Some(task) = self.graph.task(dependent) else {
                    continue;
                };
                let Some(remaining) = self.unresolved.get_mut(dependent) else {
                    continue;
                };
                *remaining = remaining.saturating_sub(1);
                let remaining = *remaining;

                if ok {
                    *self.succeeded_dependencies.entry(dependent.clone()).or_insert(0) += 1;
                } else {
                    self.first_failure
                        .entry(dependent.clone())
                        .or_insert_with(|| resolved.clone());
                }

                let block_now = match task.dependency_policy {
                    DependencyPolicy::All => !ok,
                    DependencyPolicy::AnySucceeded => {
                        remaining == 0
                            && self.succeeded_dependencies.get(dependent).copied().unwrap_or(0) == 0
                    }
                };

                if block_now {
                    let cause = self
                        .first_failure
                        .get(dependent)
                        .cloned()
                        .unwrap_or_else(|| resolved.clone());
                    self.blocked.insert(dependent.clone());
                    resolution.blocked.push((dependent.clone(), cause));
                    worklist.push((dependent.clone(), false));
                } else if remaining == 0 {
                    resolution.ready.push(dependent.clone());
                }
            }
        }

        sort_by_declaration(self.graph, &mut resolution.ready);
        resolution
            .blocked
            .sort_by_key(|(id, _)| self.graph.position(id).unwrap_or(usize::MAX));
        resolution
    }

    pub fn is_blocked(&self, id: &TaskId) -> bool {
        self.blocked.contains(id)
    }
}

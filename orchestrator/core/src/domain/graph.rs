// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Graph (Task Graph Builder)
//!
//! Validates a list of [`TaskDeclaration`]s and compiles them into a
//! [`WorkflowGraph`]: the owned set of tasks plus a reverse adjacency index
//! (dependents per task) used for O(1) readiness propagation.
//!
//! Validation is a pure transformation. It rejects, in this order:
//!
//! | Violation | Error |
//! |-----------|-------|
//! | Same id declared twice | [`GraphError::DuplicateTaskId`] |
//! | Dependency on an id not in the graph | [`GraphError::UnknownDependency`] |
//! | Any cycle, including self-dependency | [`GraphError::CycleDetected`] |
//!
//! A graph that fails validation is never handed to the scheduler.

use crate::domain::task::{Task, TaskDeclaration, TaskId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate task id '{0}'")]
    DuplicateTaskId(TaskId),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Circular dependency detected: {}", format_cycle(.path))]
    CycleDetected { path: Vec<TaskId> },

    #[error("Workflow must contain at least one task")]
    Empty,
}

fn format_cycle(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Immutable task graph produced by [`GraphBuilder`].
///
/// Only task status and results change after build; each [`Task`] guards its
/// own state.
#[derive(Debug)]
pub struct WorkflowGraph {
    tasks: HashMap<TaskId, Arc<Task>>,
    /// Declaration order, used to make batch contents deterministic
    order: Vec<TaskId>,
    /// task_id -> tasks that depend on it
    dependents: HashMap<TaskId, Vec<TaskId>>,
}

impl WorkflowGraph {
    /// Validate declarations and build the graph.
    pub fn build(declarations: Vec<TaskDeclaration>) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new();
        for declaration in declarations {
            builder.add_task(declaration);
        }
        builder.build()
    }

    pub fn task(&self, id: &TaskId) -> Option<&Arc<Task>> {
        self.tasks.get(id)
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    pub fn dependents(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of a task in declaration order.
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.order.iter().position(|candidate| candidate == id)
    }

    /// All transitive dependencies of `id`, excluding `id` itself.
    pub fn ancestors(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<TaskId> = self
            .task(id)
            .map(|task| task.dependencies.clone())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if seen.insert(current.clone()) {
                if let Some(task) = self.task(&current) {
                    stack.extend(task.dependencies.iter().cloned());
                }
            }
        }
        seen
    }
}

/// Collects declarations and validates them into a [`WorkflowGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    declarations: Vec<TaskDeclaration>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, declaration: TaskDeclaration) -> &mut Self {
        self.declarations.push(declaration);
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        if self.declarations.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut tasks = HashMap::new();
        let mut order = Vec::with_capacity(self.declarations.len());

        // First pass: ids
        for declaration in &self.declarations {
            if order.contains(&declaration.id) {
                return Err(GraphError::DuplicateTaskId(declaration.id.clone()));
            }
            order.push(declaration.id.clone());
        }

        // Second pass: dependencies exist, build reverse edges
        let mut dependents: HashMap<TaskId, Vec<TaskId>> =
            order.iter().map(|id| (id.clone(), Vec::new())).collect();

        for mut declaration in self.declarations {
            let mut unique = Vec::with_capacity(declaration.dependencies.len());
            for dependency in declaration.dependencies.drain(..) {
                if !dependents.contains_key(&dependency) {
                    return Err(GraphError::UnknownDependency {
                        task: declaration.id.clone(),
                        dependency,
                    });
                }
                if !unique.contains(&dependency) {
                    unique.push(dependency);
                }
            }
            for dependency in &unique {
                if let Some(list) = dependents.get_mut(dependency) {
                    list.push(declaration.id.clone());
                }
            }
            declaration.dependencies = unique;
            tasks.insert(declaration.id.clone(), Arc::new(Task::from_declaration(declaration)));
        }

        if let Some(path) = find_cycle(&order, &tasks) {
            return Err(GraphError::CycleDetected { path });
        }

        Ok(WorkflowGraph {
            tasks,
            order,
            dependents,
        })
    }
}

/// Depth-first search over dependency edges. Returns the first cycle found as
/// a closed path (`a -> b -> a`).
fn find_cycle(order: &[TaskId], tasks: &HashMap<TaskId, Arc<Task>>) -> Option<Vec<TaskId>> {
    fn visit(
        id: &TaskId,
        tasks: &HashMap<TaskId, Arc<Task>>,
        visited: &mut HashSet<TaskId>,
        on_stack: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> Option<Vec<TaskId>> {
        visited.insert(id.clone());
        on_stack.insert(id.clone());
        path.push(id.clone());

        if let Some(task) = tasks.get(id) {
            for dependency in &task.dependencies {
                if on_stack.contains(dependency) {
                    let start = path.iter().position(|p| p == dependency).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dependency.clone());
                    return Some(cycle);
                }
                if !visited.contains(dependency) {
                    if let Some(cycle) = visit(dependency, tasks, visited, on_stack, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        on_stack.remove(id);
        None
    }

    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();

    for id in order {
        if !visited.contains(id) {
            if let Some(cycle) = visit(id, tasks, &mut visited, &mut on_stack, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

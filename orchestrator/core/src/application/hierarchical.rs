// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hierarchical topology
//!
//! ```text
//!                supervisor
//!              /            \
//!        manager-a        manager-b
//!        /      \          /      \
//!     spec-1  spec-2    spec-3  spec-4
//! ```
//!
//! Specialists have no dependencies and form the first batch. Each manager
//! depends on its own specialists; the supervisor depends on every manager.
//! Managers and the supervisor are invoked with their dependencies' results
//! synthesized into the payload (tagged by producer).
//!
//! Managers and the supervisor use [`DependencyPolicy::AnySucceeded`]: a failed
//! specialist only removes its result from its own manager's input. A manager
//! is blocked only when all of its specialists failed, and that never touches
//! sibling managers.

use crate::application::scheduler::{PayloadSynthesis, Scheduler, SchedulerOutcome};
use crate::domain::graph::GraphError;
use crate::domain::task::{DependencyPolicy, TaskDeclaration};
use crate::domain::topology::{HierarchySpec, TopologyKind};

pub struct HierarchicalAdapter {
    scheduler: Scheduler,
}

impl HierarchicalAdapter {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler: scheduler
                .with_payload_synthesis(PayloadSynthesis::Dependencies)
                .with_topology(TopologyKind::Hierarchical),
        }
    }

    /// Layer-aware dependency wiring.
    pub fn declarations(spec: &HierarchySpec) -> Vec<TaskDeclaration> {
        let mut declarations = Vec::new();

        for manager in &spec.managers {
            for specialist in &manager.specialists {
                declarations.push(specialist.to_declaration(Vec::new(), DependencyPolicy::All));
            }
        }

        for manager in &spec.managers {
            let delegates = manager.specialists.iter().map(|s| s.id.clone()).collect();
            declarations.push(
                manager
                    .agent
                    .to_declaration(delegates, DependencyPolicy::AnySucceeded),
            );
        }

        let managers = spec.managers.iter().map(|m| m.agent.id.clone()).collect();
        declarations.push(
            spec.supervisor
                .to_declaration(managers, DependencyPolicy::AnySucceeded),
        );

        declarations
    }

    pub async fn run(&self, spec: &HierarchySpec) -> Result<SchedulerOutcome, GraphError> {
        tracing::info!(
            managers = spec.managers.len(),
            specialists = spec.managers.iter().map(|m| m.specialists.len()).sum::<usize>(),
            "Running hierarchical workflow"
        );
        self.scheduler.run(Self::declarations(spec)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::WorkflowGraph;
    use crate::domain::plan::ExecutionPlan;
    use crate::domain::task::TaskId;
    use crate::domain::topology::{AgentSpec, ManagerSpec};
    use serde_json::json;

    fn agent(id: &str) -> AgentSpec {
        AgentSpec::new(TaskId::new(id).unwrap(), "echo", json!(null))
    }

    #[test]
    fn test_three_tier_layering() {
        let spec = HierarchySpec {
            supervisor: agent("ceo"),
            managers: vec![
                ManagerSpec {
                    agent: agent("fin"),
                    specialists: vec![agent("credit"), agent("income")],
                },
                ManagerSpec {
                    agent: agent("ops"),
                    specialists: vec![agent("docs")],
                },
            ],
        };

        let declarations = HierarchicalAdapter::declarations(&spec);
        assert_eq!(declarations.len(), 6);
        let supervisor = declarations.last().unwrap();
        assert_eq!(supervisor.dependency_policy, DependencyPolicy::AnySucceeded);

        let plan = ExecutionPlan::compute(&WorkflowGraph::build(declarations).unwrap());
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.batches[0].len(), 3);
        assert_eq!(plan.batches[1].len(), 2);
        assert_eq!(plan.batches[2], vec![TaskId::new("ceo").unwrap()]);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sequential topology
//!
//! Chains tasks in list order: each task depends on exactly its predecessor, so
//! the plan is a sequence of singleton batches. Every task receives the results
//! of all earlier tasks (`PayloadSynthesis::Ancestors`). Declared dependencies
//! are replaced by the chain.

use crate::application::scheduler::{PayloadSynthesis, Scheduler, SchedulerOutcome};
use crate::domain::graph::GraphError;
use crate::domain::task::{DependencyPolicy, TaskDeclaration};
use crate::domain::topology::TopologyKind;

pub struct SequentialAdapter {
    scheduler: Scheduler,
}

impl SequentialAdapter {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler: scheduler
                .with_payload_synthesis(PayloadSynthesis::Ancestors)
                .with_topology(TopologyKind::Sequential),
        }
    }

    /// Rewire `declarations` into a chain.
    pub fn chain(declarations: Vec<TaskDeclaration>) -> Vec<TaskDeclaration> {
        let mut previous = None;
        declarations
            .into_iter()
            .map(|mut declaration| {
                if !declaration.dependencies.is_empty() {
                    tracing::debug!(
                        task_id = %declaration.id,
                        "Declared dependencies replaced by sequential chain"
                    );
                }
                declaration.dependencies = previous.iter().cloned().collect();
                declaration.dependency_policy = DependencyPolicy::All;
                previous = Some(declaration.id.clone());
                declaration
            })
            .collect()
    }

    pub async fn run(&self, declarations: Vec<TaskDeclaration>) -> Result<SchedulerOutcome, GraphError> {
        self.scheduler.run(Self::chain(declarations)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskId;
    use serde_json::json;

    #[test]
    fn test_chain_wires_predecessors() {
        let ids = ["intake", "verify", "settle"];
        let chained = SequentialAdapter::chain(
            ids.iter()
                .map(|i| TaskDeclaration::new(TaskId::new(*i).unwrap(), "echo", json!(null)))
                .collect(),
        );

        assert!(chained[0].dependencies.is_empty());
        assert_eq!(chained[1].dependencies, vec![TaskId::new("intake").unwrap()]);
        assert_eq!(chained[2].dependencies, vec![TaskId::new("verify").unwrap()]);
    }
}

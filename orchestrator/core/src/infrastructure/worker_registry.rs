// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Worker Registry - Role Dispatch
//
// Maps an `agent_role` string to the worker implementation that serves it.
// A role with no registered worker resolves to the fallback when one is set;
// otherwise the scheduler fails that task with `WorkerNotFound`.

use crate::domain::risk::RiskConfig;
use crate::domain::worker::AgentWorker;
use crate::infrastructure::workers::{EchoWorker, RiskScoringWorker, ECHO_ROLE, RISK_SCORING_ROLE};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn AgentWorker>>,
    fallback: Option<Arc<dyn AgentWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in workers (`echo`, `risk_scoring`).
    pub fn with_builtin(risk: &RiskConfig) -> Self {
        let mut registry = Self::new();
        registry.register(ECHO_ROLE, Arc::new(EchoWorker));
        registry.register(RISK_SCORING_ROLE, Arc::new(RiskScoringWorker::new(risk)));
        registry
    }

    /// Register (or replace) the worker for a role.
    pub fn register(&mut self, role: impl Into<String>, worker: Arc<dyn AgentWorker>) -> &mut Self {
        let role = role.into();
        info!(role = %role, worker = worker.name(), "Registering agent worker");
        if self.workers.insert(role.clone(), worker).is_some() {
            debug!(role = %role, "Replaced existing worker");
        }
        self
    }

    pub fn with_worker(mut self, role: impl Into<String>, worker: Arc<dyn AgentWorker>) -> Self {
        self.register(role, worker);
        self
    }

    /// Worker used for roles with no explicit registration.
    pub fn with_fallback(mut self, worker: Arc<dyn AgentWorker>) -> Self {
        self.fallback = Some(worker);
        self
    }

    pub fn resolve(&self, role: &str) -> Option<Arc<dyn AgentWorker>> {
        self.workers.get(role).or(self.fallback.as_ref()).cloned()
    }

    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("roles", &self.roles())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::SharedContextStore;
    use crate::domain::task::TaskId;
    use crate::domain::worker::WorkerRequest;

    #[test]
    fn test_builtin_roles() {
        let registry = WorkerRegistry::with_builtin(&RiskConfig::default());
        assert_eq!(registry.roles(), vec![ECHO_ROLE, RISK_SCORING_ROLE]);
        assert!(registry.resolve("risk_scoring").is_some());
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn test_fallback_serves_unknown_roles() {
        let registry = WorkerRegistry::new().with_fallback(Arc::new(EchoWorker));
        assert!(registry.has_fallback());
        assert!(registry.resolve("anything").is_some());
    }

    #[test]
    fn test_registered_role_wins_over_fallback() {
        let registry = WorkerRegistry::with_builtin(&RiskConfig::default())
            .with_fallback(Arc::new(EchoWorker));
        let worker = registry.resolve(RISK_SCORING_ROLE).unwrap();

        let request = WorkerRequest {
            task_id: TaskId::new("score").unwrap(),
            role: RISK_SCORING_ROLE.to_string(),
            payload: serde_json::json!({"documents": []}),
            context: SharedContextStore::new().view(),
        };
        let result = tokio_test::block_on(worker.invoke(request)).unwrap();
        assert_eq!(result["level"], "LOW");
        assert_eq!(worker.name(), "risk_scoring");
    }
}

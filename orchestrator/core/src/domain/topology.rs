// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Declarative shapes of the coordination topologies.
//!
//! These are plain data: the adapters in the application layer (and the mesh
//! coordinator in `taskweave-swarm`) turn them into task graphs or peer rounds.

use crate::domain::task::{DependencyPolicy, TaskDeclaration, TaskId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Tasks run as declared, batched by dependency layers
    #[default]
    Dag,
    Sequential,
    Hierarchical,
    Mesh,
    Loop,
}

impl std::fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Dag => "dag",
            Self::Sequential => "sequential",
            Self::Hierarchical => "hierarchical",
            Self::Mesh => "mesh",
            Self::Loop => "loop",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for TopologyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dag" | "parallel" => Ok(Self::Dag),
            "sequential" => Ok(Self::Sequential),
            "hierarchical" => Ok(Self::Hierarchical),
            "mesh" => Ok(Self::Mesh),
            "loop" => Ok(Self::Loop),
            other => Err(format!("unknown topology '{other}'")),
        }
    }
}

/// One agent invocation without dependency wiring; the topology supplies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: TaskId,
    pub agent_role: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl AgentSpec {
    pub fn new(id: TaskId, agent_role: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id,
            agent_role: agent_role.into(),
            payload,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declaration with the given dependencies and policy.
    pub fn to_declaration(&self, dependencies: Vec<TaskId>, policy: DependencyPolicy) -> TaskDeclaration {
        TaskDeclaration {
            id: self.id.clone(),
            dependencies,
            agent_role: self.agent_role.clone(),
            payload: self.payload.clone(),
            timeout: self.timeout,
            dependency_policy: policy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSpec {
    #[serde(flatten)]
    pub agent: AgentSpec,
    /// Specialists this manager delegates to
    #[serde(default)]
    pub specialists: Vec<AgentSpec>,
}

/// Supervisor → managers → specialists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchySpec {
    pub supervisor: AgentSpec,
    pub managers: Vec<ManagerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSpec {
    /// Input every peer runs against, overlaid with its own payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    pub peers: Vec<AgentSpec>,
    pub synthesizer: AgentSpec,
    /// Overrides the configured number of refinement rounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_rounds: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSpec {
    pub task: AgentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_threshold: Option<f64>,
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Specification Parser
//!
//! Parses the task specification format (JSON, or the same structure in YAML)
//! into domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external JSON/YAML → Domain objects
//!
//! # Format
//!
//! ```json
//! { "tasks": [ { "id": "A", "dependencies": [], "agent_role": "echo", "payload": {} } ] }
//! ```
//!
//! Optional fields: per-task `timeout` (`"30s"`) and `dependency_policy`
//! (`all` | `any_succeeded`); a top-level `topology` (`dag`, `sequential`,
//! `hierarchical`, `mesh`, `loop`) with the matching `hierarchy`, `mesh` or
//! `loop` section.
//!
//! Graph validation (unknown ids, cycles) stays with the graph builder.

use crate::domain::task::TaskDeclaration;
use crate::domain::topology::{HierarchySpec, LoopSpec, MeshSpec, TopologyKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default)]
    pub topology: TopologyKind,

    #[serde(default)]
    pub tasks: Vec<TaskDeclaration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshSpec>,

    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,
}

impl WorkflowSpec {
    /// Check that the section required by `topology` is present.
    pub fn check_topology(&self, topology: TopologyKind) -> Result<(), SpecParseError> {
        let present = match topology {
            TopologyKind::Dag | TopologyKind::Sequential => !self.tasks.is_empty(),
            TopologyKind::Hierarchical => self.hierarchy.is_some(),
            TopologyKind::Mesh => self.mesh.is_some(),
            TopologyKind::Loop => self.loop_spec.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(SpecParseError::MissingSection {
                topology,
                section: match topology {
                    TopologyKind::Dag | TopologyKind::Sequential => "tasks",
                    TopologyKind::Hierarchical => "hierarchy",
                    TopologyKind::Mesh => "mesh",
                    TopologyKind::Loop => "loop",
                },
            })
        }
    }
}

pub struct WorkflowSpecParser;

impl WorkflowSpecParser {
    /// Parse a file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<WorkflowSpec, SpecParseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SpecParseError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_yaml(&content),
            _ => Self::parse_json(&content),
        }
    }

    pub fn parse_json(json: &str) -> Result<WorkflowSpec, SpecParseError> {
        serde_json::from_str(json).map_err(|e| SpecParseError::Json(e.to_string()))
    }

    pub fn parse_yaml(yaml: &str) -> Result<WorkflowSpec, SpecParseError> {
        serde_yaml::from_str(yaml).map_err(|e| SpecParseError::Yaml(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpecParseError {
    #[error("IO error reading {path}: {error}")]
    Io { path: String, error: String },

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("Topology '{topology}' requires a '{section}' section")]
    MissingSection {
        topology: TopologyKind,
        section: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::DependencyPolicy;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_json_task_list() {
        let spec = WorkflowSpecParser::parse_json(
            r#"{
                "tasks": [
                    {"id": "A", "dependencies": [], "agent_role": "echo", "payload": {"q": 1}},
                    {"id": "B", "dependencies": ["A"], "agent_role": "echo", "payload": null,
                     "timeout": "2s", "dependency_policy": "any_succeeded"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(spec.topology, TopologyKind::Dag);
        assert_eq!(spec.tasks.len(), 2);
        assert_eq!(spec.tasks[1].timeout, Some(Duration::from_secs(2)));
        assert_eq!(spec.tasks[1].dependency_policy, DependencyPolicy::AnySucceeded);
        assert!(spec.check_topology(TopologyKind::Dag).is_ok());
    }

    #[test]
    fn test_parse_yaml_hierarchy() {
        let spec = WorkflowSpecParser::parse_yaml(
            r#"
topology: hierarchical
hierarchy:
  supervisor: { id: underwriter, agent_role: echo }
  managers:
    - id: financial
      agent_role: echo
      specialists:
        - { id: credit, agent_role: echo }
        - { id: income, agent_role: risk_scoring, timeout: 5s }
"#,
        )
        .unwrap();

        assert_eq!(spec.topology, TopologyKind::Hierarchical);
        let hierarchy = spec.hierarchy.as_ref().unwrap();
        assert_eq!(hierarchy.managers[0].agent.id.as_str(), "financial");
        assert_eq!(hierarchy.managers[0].specialists.len(), 2);
        assert_eq!(
            hierarchy.managers[0].specialists[1].timeout,
            Some(Duration::from_secs(5))
        );
        assert!(spec.check_topology(TopologyKind::Hierarchical).is_ok());
        assert!(spec.check_topology(TopologyKind::Mesh).is_err());
    }

    #[test]
    fn test_blank_task_id_rejected() {
        let err = WorkflowSpecParser::parse_json(
            r#"{"tasks":[{"id":"","agent_role":"echo"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecParseError::Json(_)));
    }

    #[test]
    fn test_parse_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "topology: loop\nloop:\n  task: {{ id: refine, agent_role: echo }}\n  max_iterations: 3"
        )
        .unwrap();

        let spec = WorkflowSpecParser::parse_file(file.path()).unwrap();
        assert_eq!(spec.loop_spec.unwrap().max_iterations, Some(3));
    }

    #[test]
    fn test_missing_file() {
        let err = WorkflowSpecParser::parse_file("/nonexistent/spec.json").unwrap_err();
        assert!(matches!(err, SpecParseError::Io { .. }));
    }
}

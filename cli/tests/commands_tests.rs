// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CLI command glue tests
//!
//! Runs task specification files through the same path `taskweave run` uses,
//! with the built-in workers and default configuration.

use std::io::Write;
use taskweave_cli::commands::{self, run::run_file};
use taskweave_core::domain::config::OrchestratorConfigManifest;
use taskweave_core::domain::task::{TaskId, TaskStatus};
use taskweave_core::domain::topology::TopologyKind;

fn spec_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn id(s: &str) -> TaskId {
    TaskId::new(s).unwrap()
}

const DIAMOND: &str = r#"{
    "tasks": [
        {"id": "A", "dependencies": [], "agent_role": "echo", "payload": {"claim": "C-1"}},
        {"id": "B", "dependencies": ["A"], "agent_role": "echo", "payload": null},
        {"id": "C", "dependencies": ["A"], "agent_role": "summarize", "payload": null},
        {"id": "D", "dependencies": ["B", "C"], "agent_role": "echo", "payload": null}
    ]
}"#;

#[tokio::test]
async fn test_run_dag_with_fallback_worker() {
    let file = spec_file(".json", DIAMOND);
    let result = run_file(file.path(), None, &OrchestratorConfigManifest::default(), false)
        .await
        .unwrap();

    assert!(result.partial_success);
    assert_eq!(result.tasks.len(), 4);
    // "summarize" has no worker of its own and went to the echo fallback
    assert_eq!(result.result(&id("C")).unwrap()["role"], "summarize");
}

#[tokio::test]
async fn test_topology_flag_overrides_file() {
    let file = spec_file(".json", DIAMOND);
    let (spec, topology) = commands::load_spec(file.path(), Some(TopologyKind::Sequential)).unwrap();
    assert_eq!(topology, TopologyKind::Sequential);

    let chained = commands::declarations(&spec, topology).unwrap().unwrap();
    assert_eq!(chained[3].dependencies, vec![id("C")]);
}

#[tokio::test]
async fn test_run_hierarchy_from_yaml() {
    let file = spec_file(
        ".yaml",
        r#"
topology: hierarchical
hierarchy:
  supervisor: { id: underwriter, agent_role: echo }
  managers:
    - id: financial
      agent_role: echo
      specialists:
        - { id: credit, agent_role: echo }
        - id: scoring
          agent_role: risk_scoring
          payload:
            documents:
              - kind: claim
                fields: { amount: "75000" }
"#,
    );
    let result = run_file(file.path(), None, &OrchestratorConfigManifest::default(), false)
        .await
        .unwrap();

    assert!(result.partial_success);
    assert_eq!(result.result(&id("scoring")).unwrap()["triggered"][0], "high_value_amount");
    assert_eq!(result.result(&id("financial")).unwrap()["upstream_results"], 2);
}

#[tokio::test]
async fn test_run_mesh_and_loop() {
    let mesh = spec_file(
        ".yaml",
        r#"
topology: mesh
mesh:
  peers:
    - { id: income, agent_role: echo }
    - { id: identity, agent_role: echo }
  synthesizer: { id: synthesis, agent_role: echo }
"#,
    );
    let result = run_file(mesh.path(), None, &OrchestratorConfigManifest::default(), false)
        .await
        .unwrap();
    assert_eq!(result.tasks.len(), 5);
    assert_eq!(result.status(&id("synthesis")), Some(TaskStatus::Succeeded));

    let looping = spec_file(
        ".yaml",
        "topology: loop\nloop:\n  task: { id: refine, agent_role: echo }\n  max_iterations: 2\n",
    );
    let result = run_file(looping.path(), None, &OrchestratorConfigManifest::default(), false)
        .await
        .unwrap();
    assert_eq!(result.status(&id("refine")), Some(TaskStatus::Succeeded));
}

#[tokio::test]
async fn test_missing_topology_section_rejected() {
    let file = spec_file(".json", DIAMOND);
    let err = commands::load_spec(file.path(), Some(TopologyKind::Mesh)).unwrap_err();
    assert!(err.to_string().contains("mesh"));
}

#[test]
fn test_risk_input_from_yaml() {
    let file = spec_file(
        ".yml",
        "documents:\n  - kind: claim\n    fields:\n      amount: \"90000\"\n",
    );
    let input = commands::risk::read_input(file.path()).unwrap();
    assert_eq!(input.documents[0].fields["amount"], "90000");
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the taskweave CLI

pub mod config;
pub mod plan;
pub mod risk;
pub mod run;
pub mod validate;

pub use self::config::ConfigCommand;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use taskweave_core::application::hierarchical::HierarchicalAdapter;
use taskweave_core::application::sequential::SequentialAdapter;
use taskweave_core::domain::result::WorkflowResult;
use taskweave_core::domain::task::{TaskDeclaration, TaskStatus};
use taskweave_core::domain::topology::TopologyKind;
use taskweave_core::infrastructure::spec_parser::{WorkflowSpec, WorkflowSpecParser};

/// Parse `file` and settle the topology: the `--topology` flag wins over the
/// file's own hint.
pub fn load_spec(file: &Path, topology: Option<TopologyKind>) -> Result<(WorkflowSpec, TopologyKind)> {
    let spec = WorkflowSpecParser::parse_file(file)
        .with_context(|| format!("Failed to parse task specification {}", file.display()))?;
    let topology = topology.unwrap_or(spec.topology);
    spec.check_topology(topology)?;
    Ok((spec, topology))
}

/// Task declarations for the graph-shaped topologies, wired the way the
/// matching adapter wires them. `None` for mesh and loop.
pub fn declarations(spec: &WorkflowSpec, topology: TopologyKind) -> Result<Option<Vec<TaskDeclaration>>> {
    let declarations = match topology {
        TopologyKind::Dag => spec.tasks.clone(),
        TopologyKind::Sequential => SequentialAdapter::chain(spec.tasks.clone()),
        TopologyKind::Hierarchical => {
            let hierarchy = spec
                .hierarchy
                .as_ref()
                .context("hierarchical topology requires a 'hierarchy' section")?;
            HierarchicalAdapter::declarations(hierarchy)
        }
        TopologyKind::Mesh | TopologyKind::Loop => return Ok(None),
    };
    Ok(Some(declarations))
}

pub fn print_result(result: &WorkflowResult) {
    println!("{}", "Tasks:".bold());
    for (id, report) in &result.tasks {
        let status = match report.status {
            TaskStatus::Succeeded => "succeeded".green(),
            TaskStatus::Failed => "failed".red(),
            TaskStatus::Blocked => "blocked".yellow(),
            other => format!("{other:?}").to_lowercase().dimmed(),
        };
        match &report.error {
            Some(error) => println!("  {:<24} {}  {}", id.as_str(), status, error.dimmed()),
            None => println!("  {:<24} {}", id.as_str(), status),
        }
    }
    println!();

    if result.partial_success {
        println!("{}", "✓ All tasks succeeded".green().bold());
    } else {
        println!(
            "{}",
            format!(
                "⚠ {} succeeded, {} failed, {} blocked",
                result.count(TaskStatus::Succeeded),
                result.count(TaskStatus::Failed),
                result.count(TaskStatus::Blocked)
            )
            .yellow()
            .bold()
        );
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `taskweave validate`

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use taskweave_core::domain::graph::WorkflowGraph;
use taskweave_core::domain::topology::TopologyKind;

pub fn execute(file: PathBuf, topology: Option<TopologyKind>) -> Result<()> {
    println!("{}", "📋 Validating task specification...".cyan());
    println!("   File: {}", file.display());
    println!();

    let (spec, topology) = super::load_spec(&file, topology)?;

    println!("{}", "✓ Specification is valid!".green().bold());
    println!();
    println!("  Topology: {}", topology);

    match super::declarations(&spec, topology)? {
        Some(declarations) => {
            let graph = WorkflowGraph::build(declarations).context("Invalid task graph")?;
            let roots = graph
                .tasks()
                .filter(|task| task.dependencies.is_empty())
                .count();
            println!("  Tasks:    {}", graph.len());
            println!("  Roots:    {}", roots);
        }
        None => {
            if let Some(mesh) = &spec.mesh {
                println!("  Peers:    {}", mesh.peers.len());
                println!("  Synthesizer: {}", mesh.synthesizer.id);
            }
            if let Some(looping) = &spec.loop_spec {
                println!("  Task:     {} ({})", looping.task.id, looping.task.agent_role);
            }
        }
    }

    Ok(())
}

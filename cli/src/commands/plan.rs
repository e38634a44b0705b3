// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `taskweave plan`: print the batches a fully successful run would execute.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use taskweave_core::application::scheduler::Scheduler;
use taskweave_core::domain::graph::WorkflowGraph;
use taskweave_core::domain::topology::TopologyKind;

pub fn execute(file: PathBuf, topology: Option<TopologyKind>) -> Result<()> {
    let (spec, topology) = super::load_spec(&file, topology)?;
    println!("{} ({})", "Execution plan".bold(), topology);
    println!();

    if let Some(declarations) = super::declarations(&spec, topology)? {
        let graph = WorkflowGraph::build(declarations).context("Invalid task graph")?;
        let plan = Scheduler::plan(&graph);
        for (index, batch) in plan.batches.iter().enumerate() {
            let ids: Vec<&str> = batch.iter().map(|id| id.as_str()).collect();
            println!("  {} {}", format!("batch {index}:").cyan(), ids.join(", "));
        }
        return Ok(());
    }

    if let Some(mesh) = &spec.mesh {
        let rounds = mesh.refinement_rounds.map(|r| r.to_string());
        let peers: Vec<&str> = mesh.peers.iter().map(|p| p.id.as_str()).collect();
        println!("  {} {}", "round 0:".cyan(), peers.join(", "));
        println!(
            "  {} {} (barrier-gated)",
            "refinement rounds:".cyan(),
            rounds.as_deref().unwrap_or("from config")
        );
        println!("  {} {}", "synthesizer:".cyan(), mesh.synthesizer.id);
    }

    if let Some(looping) = &spec.loop_spec {
        let max = looping.max_iterations.map(|m| m.to_string());
        println!("  {} {}", "task:".cyan(), looping.task.id);
        println!(
            "  {} {}",
            "max iterations:".cyan(),
            max.as_deref().unwrap_or("from config")
        );
    }

    Ok(())
}

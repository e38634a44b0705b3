// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `taskweave run`
//!
//! Executes a task specification in-process with the built-in workers
//! (`echo`, `risk_scoring`). Roles without a registered worker fall back to
//! the echo worker so any specification can be dry-run end to end.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use taskweave_core::application::loop_refinement::LoopAdapter;
use taskweave_core::application::scheduler::{Scheduler, SchedulerOptions};
use taskweave_core::domain::config::OrchestratorConfigManifest;
use taskweave_core::domain::convergence::HeuristicQuality;
use taskweave_core::domain::result::WorkflowResult;
use taskweave_core::domain::topology::TopologyKind;
use taskweave_core::infrastructure::event_bus::EventBus;
use taskweave_core::infrastructure::worker_registry::WorkerRegistry;
use taskweave_core::infrastructure::workers::EchoWorker;
use taskweave_swarm::MeshCoordinator;
use tracing::info;

pub async fn execute(
    file: PathBuf,
    topology: Option<TopologyKind>,
    print_events: bool,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let result = run_file(&file, topology, &config, print_events).await?;

    println!();
    super::print_result(&result);
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize workflow result")?
    );
    Ok(())
}

/// Execute `file` and return the per-task result.
pub async fn run_file(
    file: &std::path::Path,
    topology: Option<TopologyKind>,
    config: &OrchestratorConfigManifest,
    print_events: bool,
) -> Result<WorkflowResult> {
    let (spec, topology) = super::load_spec(file, topology)?;

    let registry = WorkerRegistry::with_builtin(&config.spec.risk).with_fallback(Arc::new(EchoWorker));
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let scheduler = Scheduler::new(
        Arc::new(registry),
        SchedulerOptions::from(&config.spec.scheduler),
    )
    .with_event_bus(bus);

    println!("{}", format!("🚀 Running {topology} workflow...").cyan());
    println!("   File: {}", file.display());

    let result = match topology {
        TopologyKind::Mesh => {
            let mesh = spec
                .mesh
                .as_ref()
                .context("mesh topology requires a 'mesh' section")?;
            MeshCoordinator::new(scheduler, config.spec.mesh.clone())
                .run(mesh)
                .await
                .context("Invalid mesh participants")?
                .result
        }
        TopologyKind::Loop => {
            let looping = spec
                .loop_spec
                .as_ref()
                .context("loop topology requires a 'loop' section")?;
            let outcome = LoopAdapter::new(
                scheduler,
                config.spec.loop_config.clone(),
                Arc::new(HeuristicQuality),
            )
            .run(looping)
            .await;

            println!(
                "   Stopped after {} iteration(s): {}",
                outcome.iterations.len(),
                outcome.stop_reason
            );
            for state in &outcome.history {
                println!(
                    "     #{} quality {:.3} (+{:.3})",
                    state.iteration, state.quality_score, state.improvement_delta
                );
            }
            outcome.result
        }
        graph_shaped => {
            // declarations() only returns None for mesh and loop
            let declarations = super::declarations(&spec, graph_shaped)?
                .context("topology has no task graph")?;
            let outcome = scheduler
                .run(declarations)
                .await
                .context("Invalid task graph")?;
            info!(batches = outcome.batches.len(), "Graph executed");
            outcome.result
        }
    };

    if print_events {
        for event in events.drain() {
            eprintln!("{}", serde_json::to_string(&event)?);
        }
    }

    Ok(result)
}

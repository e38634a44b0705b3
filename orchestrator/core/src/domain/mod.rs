// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: tasks, the task graph, execution plans, the shared context
//! store, convergence tracking and risk scoring. Nothing here spawns tasks or
//! touches I/O beyond configuration loading.

pub mod config;
pub mod context;
pub mod convergence;
pub mod events;
pub mod graph;
pub mod plan;
pub mod result;
pub mod risk;
pub mod task;
pub mod topology;
pub mod worker;

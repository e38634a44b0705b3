// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # taskweave-core
//!
//! Multi-agent task orchestration: build a dependency graph of tasks, schedule
//! it in parallel batches over a bounded worker pool, and coordinate it through
//! one of several topologies.
//!
//! # Architecture
//!
//! - **Domain:** [`domain::task`], [`domain::graph`], [`domain::plan`],
//!   [`domain::context`], [`domain::convergence`], [`domain::risk`]
//! - **Application:** [`application::scheduler`] and the sequential,
//!   hierarchical and loop adapters (the mesh adapter lives in
//!   `taskweave-swarm`)
//! - **Infrastructure:** event bus, worker registry, built-in workers and the
//!   specification parser

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;

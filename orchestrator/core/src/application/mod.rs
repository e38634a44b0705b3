// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: the scheduler and the topology adapters built on it.

pub mod hierarchical;
pub mod loop_refinement;
pub mod scheduler;
pub mod sequential;

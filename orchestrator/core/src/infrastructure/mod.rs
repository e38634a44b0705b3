// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod spec_parser;
pub mod worker_registry;
pub mod workers;

pub use event_bus::EventBus;
pub use worker_registry::WorkerRegistry;

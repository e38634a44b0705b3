// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `taskweave-swarm`: Mesh Coordination Crate
//!
//! Runs a fixed set of peer agents in barrier-gated rounds on top of the
//! `taskweave-core` scheduler primitives.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `MeshRound` naming, `MeshOutcome`, `MeshError` |
//! | [`application`] | Application | `MeshCoordinator` |
//!
//! ## Rounds
//!
//! ```text
//! round 0      peer-a   peer-b   peer-c      (independent)
//!              ───────── barrier ─────────
//! round 1      peer-a'  peer-b'  peer-c'     (sees every round-0 result)
//!              ───────── barrier ─────────   (one per extra round)
//!                      synthesizer
//! ```
//!
//! Every peer writes its round result to the shared context store under a
//! category unique to the run and round. A peer only reads a round's category
//! after the barrier closing that round has released, so it never observes a
//! partially committed round.

pub mod application;
pub mod domain;

pub use application::MeshCoordinator;
pub use domain::*;

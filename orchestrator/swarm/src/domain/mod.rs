// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mesh Domain Layer
//!
//! Pure types for mesh runs. No I/O.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`mesh`] | `MeshRound`, `MeshOutcome`, `MeshError` |

pub mod mesh;

pub use mesh::*;

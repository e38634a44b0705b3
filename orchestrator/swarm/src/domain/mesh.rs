// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mesh Rounds
//!
//! Naming rules shared by the coordinator and by anything that reads a mesh
//! run back out of the shared context store:
//!
//! - round results live in category `<prefix>:<run_id>:round-<n>`, keyed by
//!   peer id
//! - the per-round task id reported in the result is `<peer>/round-<n>`
//!
//! Every peer works against the same input: the mesh's shared `input`,
//! overlaid with the peer's own payload.

use serde::{Deserialize, Serialize};
use taskweave_core::domain::context::SharedContextStore;
use taskweave_core::domain::result::{RunId, WorkflowResult};
use taskweave_core::domain::task::{InvalidTaskId, TaskId};

/// One round of one mesh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRound<'a> {
    pub prefix: &'a str,
    pub run_id: RunId,
    /// 0 is the independent round
    pub round: u32,
}

impl<'a> MeshRound<'a> {
    pub fn new(prefix: &'a str, run_id: RunId, round: u32) -> Self {
        Self {
            prefix,
            run_id,
            round,
        }
    }

    /// Shared-context category holding this round's peer results.
    pub fn category(&self) -> String {
        format!("{}:{}:round-{}", self.prefix, self.run_id, self.round)
    }

    /// `<peer>/round-<n>`
    pub fn label(&self, peer: &TaskId) -> String {
        format!("{}/round-{}", peer, self.round)
    }

    /// Reported task id of `peer` in this round.
    pub fn task_id(&self, peer: &TaskId) -> Result<TaskId, InvalidTaskId> {
        TaskId::new(self.label(peer))
    }

    pub fn previous(&self) -> Option<MeshRound<'a>> {
        self.round.checked_sub(1).map(|round| Self {
            round,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshOutcome {
    pub run_id: RunId,
    /// Refinement rounds after the independent round
    pub refinement_rounds: u32,
    pub result: WorkflowResult,
    /// Store holding the per-round categories of this run
    #[serde(skip)]
    pub context: SharedContextStore,
}

/// Input a peer runs against.
///
/// Object payloads are merged key by key, the peer's own keys winning. A null
/// peer payload takes the shared input as is; any other peer payload is kept
/// whole.
pub fn peer_input(shared: Option<&serde_json::Value>, own: &serde_json::Value) -> serde_json::Value {
    match (shared, own) {
        (None, _) => own.clone(),
        (Some(shared), serde_json::Value::Null) => shared.clone(),
        (Some(serde_json::Value::Object(shared)), serde_json::Value::Object(own)) => {
            let mut merged = shared.clone();
            merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
            serde_json::Value::Object(merged)
        }
        (Some(_), _) => own.clone(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Mesh requires at least one peer")]
    NoPeers,

    #[error("Duplicate mesh participant id: {0}")]
    DuplicateParticipant(TaskId),

    #[error(transparent)]
    InvalidTaskId(#[from] InvalidTaskId),
}

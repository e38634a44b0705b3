// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted agent workers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskweave_core::application::scheduler::{Scheduler, SchedulerOptions};
use taskweave_core::domain::task::{TaskDeclaration, TaskId};
use taskweave_core::domain::worker::{AgentWorker, WorkerError, WorkerRequest};
use taskweave_core::infrastructure::worker_registry::WorkerRegistry;

/// Worker with per-task latency and failures. Records start/end order and the
/// peak number of concurrent invocations.
#[derive(Default)]
pub struct ScriptedWorker {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    running: AtomicUsize,
    peak: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    pub fn fail(mut self, task: &str) -> Self {
        self.failures.insert(task.to_string());
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Position of an event such as `"start:D"` in the log.
    pub fn position(&self, event: &str) -> usize {
        self.log()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not logged"))
    }
}

#[async_trait]
impl AgentWorker for ScriptedWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerError> {
        let id = request.task_id.as_str().to_string();
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log.lock().push(format!("start:{id}"));

        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().push(format!("end:{id}"));

        if self.failures.contains(&id) {
            return Err(WorkerError::Failed(format!("{id} failed")));
        }
        Ok(json!({ "task": id, "payload": request.payload }))
    }
}

pub fn id(s: &str) -> TaskId {
    TaskId::new(s).unwrap()
}

pub fn task(s: &str, deps: &[&str]) -> TaskDeclaration {
    TaskDeclaration::new(id(s), "scripted", json!({ "name": s }))
        .with_dependencies(deps.iter().map(|d| id(d)))
}

pub fn diamond() -> Vec<TaskDeclaration> {
    vec![
        task("A", &[]),
        task("B", &["A"]),
        task("C", &["A"]),
        task("D", &["B", "C"]),
    ]
}

pub fn scheduler_with(worker: Arc<ScriptedWorker>, options: SchedulerOptions) -> Scheduler {
    let registry = WorkerRegistry::new().with_worker("scripted", worker);
    Scheduler::new(Arc::new(registry), options)
}

pub fn scheduler(worker: Arc<ScriptedWorker>) -> Scheduler {
    scheduler_with(worker, SchedulerOptions::default())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Context Store
//!
//! Category-partitioned key/value store used for cross-worker data exchange.
//! This is the only state mutated by more than one concurrent worker, so it is
//! built around two rules:
//!
//! 1. **Single writer per category.** Each category owns its own
//!    `RwLock<Partition>`; a write holds the partition's write lock for the whole
//!    commit. Readers either block until the commit completes or see the fully
//!    committed previous version. There is no window in which a reader observes
//!    half of a batch.
//! 2. **Append/overwrite only.** Nothing is deleted during a run. Every write
//!    (including overwrites) is appended to an audit history with a producer id,
//!    a timestamp and a store-wide monotonically increasing version.
//!
//! Workers never see the store itself. They receive a [`ContextView`], which
//! only exposes reads.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One committed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub category: String,
    pub key: String,
    pub value: serde_json::Value,
    pub producer_id: String,
    pub timestamp: DateTime<Utc>,
    /// Store-wide write sequence number
    pub version: u64,
}

/// Read filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFilter {
    pub category: Option<String>,
    pub key: Option<String>,
    pub producer: Option<String>,
}

impl ContextFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    fn matches(&self, entry: &ContextEntry) -> bool {
        self.category.as_deref().map_or(true, |c| c == entry.category)
            && self.key.as_deref().map_or(true, |k| k == entry.key)
            && self.producer.as_deref().map_or(true, |p| p == entry.producer_id)
    }
}

/// Aggregate view of the store, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    /// Current (latest-version) entries across all categories
    pub total_entries: usize,
    /// Every write ever committed, overwrites included
    pub total_writes: usize,
    pub categories: Vec<String>,
    pub producers: Vec<String>,
    pub entries_per_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Two writers were inside the same category at once. This means the
    /// partition lock is broken and is treated as a defect, not a runtime
    /// condition.
    #[error("Concurrent write detected on category '{category}'")]
    SharedWriteConflict { category: String },

    #[error("Key '{key}' already exists in category '{category}'")]
    KeyExists { category: String, key: String },
}

#[derive(Debug, Default)]
struct Partition {
    entries: BTreeMap<String, ContextEntry>,
    writer_active: AtomicBool,
}

#[derive(Debug, Default)]
struct StoreInner {
    partitions: RwLock<HashMap<String, Arc<RwLock<Partition>>>>,
    history: Mutex<Vec<ContextEntry>>,
    version: AtomicU64,
}

/// Thread-safe handle to the store. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct SharedContextStore {
    inner: Arc<StoreInner>,
}

impl SharedContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only handle for workers.
    pub fn view(&self) -> ContextView {
        ContextView {
            store: self.clone(),
        }
    }

    /// Write (or overwrite) one key.
    pub fn put(
        &self,
        category: &str,
        key: &str,
        value: serde_json::Value,
        producer_id: &str,
    ) -> Result<ContextEntry, ContextError> {
        let mut committed =
            self.commit(category, vec![(key.to_string(), value)], producer_id, false)?;
        // commit returns exactly one entry per input pair
        Ok(committed.remove(0))
    }

    /// Write one key, failing if it is already present.
    pub fn put_new(
        &self,
        category: &str,
        key: &str,
        value: serde_json::Value,
        producer_id: &str,
    ) -> Result<ContextEntry, ContextError> {
        let mut committed =
            self.commit(category, vec![(key.to_string(), value)], producer_id, true)?;
        Ok(committed.remove(0))
    }

    /// Commit several keys to one category as a single unit. Readers of the
    /// category see either none or all of them.
    pub fn put_batch(
        &self,
        category: &str,
        values: Vec<(String, serde_json::Value)>,
        producer_id: &str,
    ) -> Result<Vec<ContextEntry>, ContextError> {
        self.commit(category, values, producer_id, false)
    }

    fn commit(
        &self,
        category: &str,
        values: Vec<(String, serde_json::Value)>,
        producer_id: &str,
        reject_existing: bool,
    ) -> Result<Vec<ContextEntry>, ContextError> {
        let partition = self.partition_or_create(category);
        let mut partition = partition.write();

        if partition.writer_active.swap(true, Ordering::AcqRel) {
            tracing::error!(category, "Second writer entered a locked category");
            return Err(ContextError::SharedWriteConflict {
                category: category.to_string(),
            });
        }

        if reject_existing {
            if let Some((key, _)) = values.iter().find(|(k, _)| partition.entries.contains_key(k)) {
                partition.writer_active.store(false, Ordering::Release);
                return Err(ContextError::KeyExists {
                    category: category.to_string(),
                    key: key.clone(),
                });
            }
        }

        let timestamp = Utc::now();
        let mut committed = Vec::with_capacity(values.len());
        {
            let mut history = self.inner.history.lock();
            for (key, value) in values {
                let entry = ContextEntry {
                    category: category.to_string(),
                    key: key.clone(),
                    value,
                    producer_id: producer_id.to_string(),
                    timestamp,
                    version: self.inner.version.fetch_add(1, Ordering::SeqCst) + 1,
                };
                history.push(entry.clone());
                partition.entries.insert(key, entry.clone());
                committed.push(entry);
            }
        }

        partition.writer_active.store(false, Ordering::Release);
        tracing::debug!(category, producer = producer_id, writes = committed.len(), "Context committed");
        Ok(committed)
    }

    fn partition(&self, category: &str) -> Option<Arc<RwLock<Partition>>> {
        self.inner.partitions.read().get(category).cloned()
    }

    fn partition_or_create(&self, category: &str) -> Arc<RwLock<Partition>> {
        if let Some(partition) = self.partition(category) {
            return partition;
        }
        self.inner
            .partitions
            .write()
            .entry(category.to_string())
            .or_default()
            .clone()
    }

    /// Latest version of one key.
    pub fn get(&self, category: &str, key: &str) -> Option<ContextEntry> {
        let partition = self.partition(category)?;
        let guard = partition.read();
        guard.entries.get(key).cloned()
    }

    /// Consistent snapshot of a category, ordered by key.
    pub fn category(&self, category: &str) -> Vec<ContextEntry> {
        self.partition(category)
            .map(|partition| partition.read().entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest entries matching the filter, ordered by category then key.
    pub fn query(&self, filter: &ContextFilter) -> Vec<ContextEntry> {
        let mut names: Vec<String> = match &filter.category {
            Some(category) => vec![category.clone()],
            None => self.inner.partitions.read().keys().cloned().collect(),
        };
        names.sort();

        names
            .iter()
            .flat_map(|name| self.category(name))
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Full audit log in commit order, overwritten versions included.
    pub fn history(&self) -> Vec<ContextEntry> {
        self.inner.history.lock().clone()
    }

    pub fn summary(&self) -> ContextSummary {
        let partitions: Vec<(String, Arc<RwLock<Partition>>)> = self
            .inner
            .partitions
            .read()
            .iter()
            .map(|(name, partition)| (name.clone(), partition.clone()))
            .collect();

        let mut entries_per_category = BTreeMap::new();
        let mut producers = BTreeSet::new();
        let mut total_entries = 0;
        for (name, partition) in partitions {
            let guard = partition.read();
            total_entries += guard.entries.len();
            producers.extend(guard.entries.values().map(|e| e.producer_id.clone()));
            entries_per_category.insert(name, guard.entries.len());
        }

        ContextSummary {
            total_entries,
            total_writes: self.inner.history.lock().len(),
            categories: entries_per_category.keys().cloned().collect(),
            producers: producers.into_iter().collect(),
            entries_per_category,
        }
    }
}

/// Read-only view of a [`SharedContextStore`], handed to Agent Workers.
#[derive(Debug, Clone, Default)]
pub struct ContextView {
    store: SharedContextStore,
}

impl ContextView {
    pub fn get(&self, category: &str, key: &str) -> Option<ContextEntry> {
        self.store.get(category, key)
    }

    pub fn category(&self, category: &str) -> Vec<ContextEntry> {
        self.store.category(category)
    }

    pub fn query(&self, filter: &ContextFilter) -> Vec<ContextEntry> {
        self.store.query(filter)
    }

    pub fn summary(&self) -> ContextSummary {
        self.store.summary()
    }
}

//! In-memory storage tier.
//!
//! # Responsibility
//! - Back either tier with a process-local map (tests, ephemeral hosts).
//! - Simulate backend failures: disabled storage and byte quotas.
//! - Count acknowledged writes so callers can observe coalescing.
//!
//! # Invariants
//! - A rejected write leaves the previous value intact.
//! - Single-threaded use only (`RefCell`/`Cell` interior mutability).

use crate::repo::tier::{BulkTier, KvTier, TierError, TierResult};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Map-backed tier usable as either `BulkTier` or `KvTier`.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: RefCell<BTreeMap<String, String>>,
    write_count: Cell<usize>,
    reads_disabled: Cell<bool>,
    writes_disabled: Cell<bool>,
    quota_bytes: Cell<Option<usize>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tier that rejects writes once stored bytes would exceed
    /// `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        let tier = Self::default();
        tier.quota_bytes.set(Some(quota_bytes));
        tier
    }

    /// Makes every read fail (storage disabled).
    pub fn set_reads_disabled(&self, disabled: bool) {
        self.reads_disabled.set(disabled);
    }

    /// Makes every write and remove fail (storage disabled).
    pub fn set_writes_disabled(&self, disabled: bool) {
        self.writes_disabled.set(disabled);
    }

    /// Number of writes accepted since creation.
    pub fn write_count(&self) -> usize {
        self.write_count.get()
    }

    /// Returns the raw stored value, bypassing failure simulation.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    /// Stores a raw value, bypassing failure simulation and write counting.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.borrow_mut().insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    fn read_entry(&self, key: &str) -> TierResult<Option<String>> {
        if self.reads_disabled.get() {
            return Err(TierError::Unavailable("reads disabled".to_string()));
        }
        Ok(self.raw(key))
    }

    fn write_entry(&self, key: &str, value: &str) -> TierResult<()> {
        if self.writes_disabled.get() {
            return Err(TierError::Unavailable("writes disabled".to_string()));
        }
        let mut entries = self.entries.borrow_mut();
        if let Some(quota) = self.quota_bytes.get() {
            let others: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(TierError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        self.write_count.set(self.write_count.get() + 1);
        Ok(())
    }

    fn remove_entry(&self, key: &str) -> TierResult<()> {
        if self.writes_disabled.get() {
            return Err(TierError::Unavailable("writes disabled".to_string()));
        }
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

impl BulkTier for MemoryTier {
    fn read(&self, key: &str) -> TierResult<Option<String>> {
        self.read_entry(key)
    }

    fn write(&self, key: &str, value: &str) -> TierResult<()> {
        self.write_entry(key, value)
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        self.remove_entry(key)
    }
}

impl KvTier for MemoryTier {
    fn get(&self, key: &str) -> TierResult<Option<String>> {
        self.read_entry(key)
    }

    fn set(&self, key: &str, value: &str) -> TierResult<()> {
        self.write_entry(key, value)
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        self.remove_entry(key)
    }
}

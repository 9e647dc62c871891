//! Fail-soft store over the bulk and small-value tiers.
//!
//! # Responsibility
//! - Own the storage key layout shared by registry, migration and
//!   document services.
//! - Convert tier failures into "absent" reads and dropped writes.
//!
//! # Invariants
//! - No method returns an error or panics on storage failure.
//! - Corrupt JSON reads as absent.
//! - A failed write never clobbers the previously stored value.

use crate::repo::tier::{BulkTier, KvTier};
use log::warn;
use serde_json::Value;

/// Small-value key holding the JSON array of `ProjectMeta`.
pub const PROJECTS_INDEX_KEY: &str = "projects-index";
/// Small-value key holding the active project id as plain text.
pub const CURRENT_PROJECT_KEY: &str = "current-project";
/// Small-value key of the legacy single-document layout.
pub const LEGACY_STATE_KEY: &str = "app-state";
/// Key prefix of per-project documents (bulk tier, or small-value tier for
/// the oldest storage generation).
pub const PROJECT_STATE_PREFIX: &str = "project-state-";

/// Returns the storage key of one project's document.
pub fn project_state_key(project_id: &str) -> String {
    format!("{PROJECT_STATE_PREFIX}{project_id}")
}

/// Result of a small-value read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvRead {
    Absent,
    Value(String),
    /// The tier reported an error; the stored value is unknown.
    Failed,
}

/// Storage facade combining both tiers with fail-soft semantics.
pub struct Store<'t> {
    bulk: Box<dyn BulkTier + 't>,
    kv: Box<dyn KvTier + 't>,
}

impl<'t> Store<'t> {
    pub fn new(bulk: impl BulkTier + 't, kv: impl KvTier + 't) -> Self {
        Self {
            bulk: Box::new(bulk),
            kv: Box::new(kv),
        }
    }

    /// Reads a JSON document from the bulk tier.
    ///
    /// Returns `None` when the key is absent, the tier fails or the stored
    /// text is not valid JSON.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.bulk.read(key) {
            Ok(Some(text)) => parse_json("bulk", key, &text),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    "event=store_read module=store status=error tier=bulk key={} error={}",
                    key, err
                );
                None
            }
        }
    }

    /// Writes a JSON document to the bulk tier, replacing any prior value.
    ///
    /// Returns `true` when the write was acknowledged.
    pub fn set(&self, key: &str, value: &Value) -> bool {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    "event=store_write module=store status=error tier=bulk key={} error_code=serialize_failed error={}",
                    key, err
                );
                return false;
            }
        };
        match self.bulk.write(key, &text) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=store_write module=store status=error tier=bulk key={} bytes={} error={}",
                    key,
                    text.len(),
                    err
                );
                false
            }
        }
    }

    /// Removes a document from the bulk tier. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> bool {
        match self.bulk.remove(key) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=store_delete module=store status=error tier=bulk key={} error={}",
                    key, err
                );
                false
            }
        }
    }

    /// Reads a raw string from the small-value tier, keeping a failed read
    /// distinguishable from an absent key.
    pub fn kv_read(&self, key: &str) -> KvRead {
        match self.kv.get(key) {
            Ok(Some(value)) => KvRead::Value(value),
            Ok(None) => KvRead::Absent,
            Err(err) => {
                warn!(
                    "event=store_read module=store status=error tier=kv key={} error={}",
                    key, err
                );
                KvRead::Failed
            }
        }
    }

    /// Reads a raw string from the small-value tier.
    pub fn kv_get(&self, key: &str) -> Option<String> {
        match self.kv_read(key) {
            KvRead::Value(value) => Some(value),
            KvRead::Absent | KvRead::Failed => None,
        }
    }

    /// Reads and parses a JSON value from the small-value tier.
    pub fn kv_get_json(&self, key: &str) -> Option<Value> {
        let text = self.kv_get(key)?;
        parse_json("kv", key, &text)
    }

    /// Writes a raw string to the small-value tier.
    pub fn kv_set(&self, key: &str, value: &str) -> bool {
        match self.kv.set(key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=store_write module=store status=error tier=kv key={} error={}",
                    key, err
                );
                false
            }
        }
    }

    /// Serializes and writes a JSON value to the small-value tier.
    pub fn kv_set_json(&self, key: &str, value: &Value) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.kv_set(key, &text),
            Err(err) => {
                warn!(
                    "event=store_write module=store status=error tier=kv key={} error_code=serialize_failed error={}",
                    key, err
                );
                false
            }
        }
    }

    /// Removes a value from the small-value tier.
    pub fn kv_delete(&self, key: &str) -> bool {
        match self.kv.remove(key) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=store_delete module=store status=error tier=kv key={} error={}",
                    key, err
                );
                false
            }
        }
    }
}

fn parse_json(tier: &str, key: &str, text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "event=store_read module=store status=error tier={} key={} error_code=corrupt_json error={}",
                tier, key, err
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{project_state_key, KvRead, Store};
    use crate::repo::memory_tier::MemoryTier;
    use serde_json::json;

    #[test]
    fn project_state_key_uses_prefix() {
        assert_eq!(project_state_key("abc"), "project-state-abc");
    }

    #[test]
    fn corrupt_json_reads_as_absent() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        bulk.insert_raw("doc", "{broken");
        kv.insert_raw("index", "[oops");
        let store = Store::new(&bulk, &kv);

        assert!(store.get("doc").is_none());
        assert!(store.kv_get_json("index").is_none());
        assert_eq!(store.kv_get("index").as_deref(), Some("[oops"));
    }

    #[test]
    fn failed_write_is_swallowed_and_keeps_previous_value() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        let store = Store::new(&bulk, &kv);

        assert!(store.set("doc", &json!({"v": 1})));
        bulk.set_writes_disabled(true);
        assert!(!store.set("doc", &json!({"v": 2})));
        assert!(!store.delete("doc"));
        bulk.set_writes_disabled(false);

        assert_eq!(store.get("doc"), Some(json!({"v": 1})));
    }

    #[test]
    fn failed_reads_return_absent() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        bulk.insert_raw("doc", "{}");
        kv.insert_raw("key", "value");
        bulk.set_reads_disabled(true);
        kv.set_reads_disabled(true);
        let store = Store::new(&bulk, &kv);

        assert!(store.get("doc").is_none());
        assert!(store.kv_get("key").is_none());
        assert_eq!(store.kv_read("key"), KvRead::Failed);
        assert_eq!(store.kv_read("missing"), KvRead::Failed);

        kv.set_reads_disabled(false);
        assert_eq!(store.kv_read("key"), KvRead::Value("value".to_string()));
        assert_eq!(store.kv_read("missing"), KvRead::Absent);
    }

    #[test]
    fn delete_of_absent_key_is_acknowledged() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        let store = Store::new(&bulk, &kv);

        assert!(store.delete("missing"));
        assert!(store.kv_delete("missing"));
    }
}

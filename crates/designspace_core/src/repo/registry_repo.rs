//! Project registry persistence over the small-value tier.
//!
//! # Responsibility
//! - Read and write the full `projects-index` value.
//! - Read and write the `current-project` pointer.
//!
//! # Invariants
//! - The index is always written whole; the tier offers no partial update.
//! - Unparseable index entries are skipped, never surfaced.
//! - A failed read is never reported as an absent index.

use crate::model::project::{ProjectId, ProjectMeta};
use crate::repo::store::{KvRead, Store, CURRENT_PROJECT_KEY, PROJECTS_INDEX_KEY};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

/// Persisted registry index as seen by a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRead {
    /// No index has ever been written.
    Absent,
    Loaded(Vec<ProjectMeta>),
    /// The index exists (or may exist) but cannot be used; it must not be
    /// overwritten from scratch.
    Unreadable,
}

/// Registry accessor borrowing the workspace store.
pub struct ProjectRegistry<'a> {
    store: &'a Store<'a>,
}

impl<'a> ProjectRegistry<'a> {
    pub fn new(store: &'a Store<'a>) -> Self {
        Self { store }
    }

    /// Reads the persisted index, telling an absent index apart from one
    /// that exists but cannot be used.
    ///
    /// Invalid entries and duplicate ids inside an array are dropped. A
    /// failed read, a non-array value, or a non-empty array without a single
    /// valid entry is `Unreadable`.
    pub fn read_index(&self) -> IndexRead {
        let text = match self.store.kv_read(PROJECTS_INDEX_KEY) {
            KvRead::Absent => return IndexRead::Absent,
            KvRead::Failed => return IndexRead::Unreadable,
            KvRead::Value(text) => text,
        };
        let items = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("event=registry_load module=registry status=error error_code=index_not_array");
                return IndexRead::Unreadable;
            }
            Err(err) => {
                warn!(
                    "event=registry_load module=registry status=error error_code=corrupt_json error={}",
                    err
                );
                return IndexRead::Unreadable;
            }
        };

        let mut projects: Vec<ProjectMeta> = Vec::with_capacity(items.len());
        for item in &items {
            match ProjectMeta::deserialize(item) {
                Ok(meta) if projects.iter().any(|known| known.id == meta.id) => {
                    debug!(
                        "event=registry_load module=registry status=skip reason=duplicate_id project_id={}",
                        meta.id
                    );
                }
                Ok(meta) => projects.push(meta),
                Err(err) => debug!(
                    "event=registry_load module=registry status=skip reason=invalid_entry error={}",
                    err
                ),
            }
        }
        if projects.is_empty() && !items.is_empty() {
            warn!("event=registry_load module=registry status=error error_code=no_valid_entries");
            return IndexRead::Unreadable;
        }
        IndexRead::Loaded(projects)
    }

    /// Loads the persisted index, or `None` when it is absent or unreadable.
    pub fn load(&self) -> Option<Vec<ProjectMeta>> {
        match self.read_index() {
            IndexRead::Loaded(projects) => Some(projects),
            IndexRead::Absent | IndexRead::Unreadable => None,
        }
    }

    /// Replaces the persisted index. Returns the store acknowledgement.
    pub fn save(&self, projects: &[ProjectMeta]) -> bool {
        match serde_json::to_value(projects) {
            Ok(value) => self.store.kv_set_json(PROJECTS_INDEX_KEY, &value),
            Err(err) => {
                warn!(
                    "event=registry_save module=registry status=error error_code=serialize_failed error={}",
                    err
                );
                false
            }
        }
    }

    /// Reads the active project pointer.
    pub fn current_project_id(&self) -> Option<ProjectId> {
        self.store
            .kv_get(CURRENT_PROJECT_KEY)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Writes the active project pointer.
    pub fn set_current_project_id(&self, project_id: &str) -> bool {
        self.store.kv_set(CURRENT_PROJECT_KEY, project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexRead, ProjectRegistry};
    use crate::model::project::ProjectMeta;
    use crate::repo::memory_tier::MemoryTier;
    use crate::repo::store::{Store, PROJECTS_INDEX_KEY};

    #[test]
    fn save_then_load_preserves_order() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        let store = Store::new(&bulk, &kv);
        let registry = ProjectRegistry::new(&store);

        let first = ProjectMeta::new("First", "");
        let second = ProjectMeta::new("Second", "dunes");
        assert!(registry.save(&[first.clone(), second.clone()]));

        assert_eq!(registry.load().unwrap(), vec![first, second]);
    }

    #[test]
    fn invalid_and_duplicate_entries_are_skipped() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        kv.insert_raw(
            PROJECTS_INDEX_KEY,
            r#"[
                {"id":"a","name":"A","theme":"","createdAt":1,"updatedAt":1},
                {"id":"b"},
                {"id":"a","name":"A2","theme":"","createdAt":2,"updatedAt":2}
            ]"#,
        );
        let store = Store::new(&bulk, &kv);
        let registry = ProjectRegistry::new(&store);

        let projects = registry.load().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "A");
    }

    #[test]
    fn non_array_or_corrupt_index_is_unreadable() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        let store = Store::new(&bulk, &kv);
        let registry = ProjectRegistry::new(&store);

        assert_eq!(registry.read_index(), IndexRead::Absent);
        kv.insert_raw(PROJECTS_INDEX_KEY, r#"{"id":"a"}"#);
        assert_eq!(registry.read_index(), IndexRead::Unreadable);
        assert!(registry.load().is_none());
        kv.insert_raw(PROJECTS_INDEX_KEY, r#"[{"id":"a","name":"A""#);
        assert_eq!(registry.read_index(), IndexRead::Unreadable);
        kv.insert_raw(PROJECTS_INDEX_KEY, r#"[{"id":"b"}]"#);
        assert_eq!(registry.read_index(), IndexRead::Unreadable);
        kv.insert_raw(PROJECTS_INDEX_KEY, "[]");
        assert_eq!(registry.read_index(), IndexRead::Loaded(Vec::new()));
    }

    #[test]
    fn failed_read_is_unreadable_not_absent() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        kv.set_reads_disabled(true);
        let store = Store::new(&bulk, &kv);

        assert_eq!(ProjectRegistry::new(&store).read_index(), IndexRead::Unreadable);
    }

    #[test]
    fn blank_pointer_reads_as_absent() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        let store = Store::new(&bulk, &kv);
        let registry = ProjectRegistry::new(&store);

        assert!(registry.set_current_project_id("  "));
        assert!(registry.current_project_id().is_none());
        assert!(registry.set_current_project_id("abc"));
        assert_eq!(registry.current_project_id().as_deref(), Some("abc"));
    }
}

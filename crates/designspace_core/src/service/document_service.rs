//! Per-project document container with coalesced saves.
//!
//! # Responsibility
//! - Load project documents with storage-generation fallback and defaults
//!   merge.
//! - Coalesce saves into one pending slot per project, flushed on `flush`.
//!
//! # Invariants
//! - A pending slot holds only the most recent payload (last write wins).
//! - `load` observes pending payloads before persisted ones.
//! - Each `flush` issues at most one write per project.

use crate::model::document::{merge_defaults, ProjectStateDocument};
use crate::model::project::ProjectId;
use crate::repo::store::{project_state_key, Store};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone)]
struct PendingSave {
    document: ProjectStateDocument,
    /// When the slot was first filled; kept across overwrites.
    enqueued_at: Instant,
}

/// Coalescing document container.
#[derive(Debug, Default)]
pub struct DocumentContainer {
    pending: BTreeMap<ProjectId, PendingSave>,
}

impl DocumentContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one project document.
    ///
    /// Lookup order: pending slot, bulk tier, small-value tier (copied into
    /// the bulk tier when found), defaults. The result is always complete.
    pub fn load(&self, store: &Store<'_>, project_id: &str) -> ProjectStateDocument {
        if let Some(pending) = self.pending.get(project_id) {
            return pending.document.clone();
        }

        let key = project_state_key(project_id);
        if let Some(value) = store.get(&key) {
            return merge_defaults(&value);
        }

        if let Some(value) = store.kv_get_json(&key) {
            let document = merge_defaults(&value);
            if write_document(store, project_id, &document) {
                store.kv_delete(&key);
                info!(
                    "event=document_load module=container status=ok source=kv_migrated project_id={}",
                    project_id
                );
            }
            return document;
        }

        debug!(
            "event=document_load module=container status=ok source=defaults project_id={}",
            project_id
        );
        ProjectStateDocument::default()
    }

    /// Enqueues a save, replacing any pending payload for the same project.
    pub fn save(&mut self, project_id: &str, document: ProjectStateDocument) {
        match self.pending.get_mut(project_id) {
            Some(slot) => slot.document = document,
            None => {
                self.pending.insert(
                    project_id.to_string(),
                    PendingSave {
                        document,
                        enqueued_at: Instant::now(),
                    },
                );
            }
        }
    }

    /// Writes every pending slot once and empties the mailbox.
    ///
    /// Returns ids whose write was acknowledged. Failed writes are dropped;
    /// the previously persisted value stays intact.
    pub fn flush(&mut self, store: &Store<'_>) -> Vec<ProjectId> {
        let pending = std::mem::take(&mut self.pending);
        let mut saved = Vec::with_capacity(pending.len());
        for (project_id, slot) in pending {
            if write_document(store, &project_id, &slot.document) {
                saved.push(project_id);
            } else {
                warn!(
                    "event=document_flush module=container status=error project_id={} pending_ms={}",
                    project_id,
                    slot.enqueued_at.elapsed().as_millis()
                );
            }
        }
        saved
    }

    /// Persists a document immediately, superseding any pending payload.
    pub fn write_now(
        &mut self,
        store: &Store<'_>,
        project_id: &str,
        document: &ProjectStateDocument,
    ) -> bool {
        self.pending.remove(project_id);
        write_document(store, project_id, document)
    }

    /// Drops the pending payload and every persisted copy of a project.
    pub fn remove(&mut self, store: &Store<'_>, project_id: &str) {
        self.pending.remove(project_id);
        let key = project_state_key(project_id);
        store.delete(&key);
        store.kv_delete(&key);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_pending(&self, project_id: &str) -> bool {
        self.pending.contains_key(project_id)
    }

    /// Time the oldest pending save was enqueued.
    pub fn pending_since(&self) -> Option<Instant> {
        self.pending.values().map(|slot| slot.enqueued_at).min()
    }
}

fn write_document(store: &Store<'_>, project_id: &str, document: &ProjectStateDocument) -> bool {
    match document.to_value() {
        Ok(value) => store.set(&project_state_key(project_id), &value),
        Err(err) => {
            warn!(
                "event=document_write module=container status=error project_id={} error_code=serialize_failed error={}",
                project_id, err
            );
            false
        }
    }
}

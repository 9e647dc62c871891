//! Startup storage migration.
//!
//! # Responsibility
//! - Convert the legacy single-document layout (`app-state`) into a
//!   registry with one `"default"` project.
//! - Sweep older-generation project documents out of the small-value tier.
//! - Repair a missing or dangling current-project pointer.
//!
//! # Invariants
//! - Migration runs only when the index is absent or empty, so repeated
//!   runs are no-ops. An index that exists but cannot be read is never
//!   overwritten.
//! - Parse failures never abort startup; they degrade to a fresh default
//!   project.
//! - After `run_startup_migration` the registry holds at least one project
//!   (unless the small-value tier rejects writes).

use crate::model::document::{merge_defaults, ProjectStateDocument};
use crate::model::project::{ProjectMeta, DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME};
use crate::repo::registry_repo::{IndexRead, ProjectRegistry};
use crate::repo::store::{project_state_key, Store, LEGACY_STATE_KEY};
use log::{info, warn};

/// What the registry migration step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Registry already populated; nothing changed.
    AlreadyMigrated,
    /// Legacy `app-state` was converted into the default project.
    LegacyImported,
    /// Legacy `app-state` existed but could not be parsed.
    LegacyUnreadable,
    /// Legacy document parsed but the bulk write failed; `app-state` is kept
    /// and retried on the next startup.
    LegacyRetained,
    /// No legacy data; a fresh default project was registered.
    FreshDefault,
    /// The index exists but could not be read or parsed; nothing was written.
    RegistryUnreadable,
}

impl MigrationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyMigrated => "already_migrated",
            Self::LegacyImported => "legacy_imported",
            Self::LegacyUnreadable => "legacy_unreadable",
            Self::LegacyRetained => "legacy_retained",
            Self::FreshDefault => "fresh_default",
            Self::RegistryUnreadable => "registry_unreadable",
        }
    }
}

/// Summary of one startup migration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,
    /// Project documents moved from the small-value to the bulk tier.
    pub swept_documents: usize,
    /// Whether the current-project pointer had to be rewritten.
    pub pointer_repaired: bool,
}

/// Runs registry migration, the small-value sweep and pointer repair.
pub fn run_startup_migration(store: &Store<'_>) -> MigrationReport {
    let outcome = migrate_registry(store);
    let swept_documents = sweep_small_value_documents(store);
    let pointer_repaired = repair_current_pointer(store);

    info!(
        "event=migration module=migration status=ok outcome={} swept_documents={} pointer_repaired={}",
        outcome.as_str(),
        swept_documents,
        pointer_repaired
    );

    MigrationReport {
        outcome,
        swept_documents,
        pointer_repaired,
    }
}

/// Converts the legacy layout into a registry when none exists yet.
///
/// Only an absent (or empty) index is initialized. An index that exists but
/// cannot be read is left untouched.
pub fn migrate_registry(store: &Store<'_>) -> MigrationOutcome {
    let registry = ProjectRegistry::new(store);
    match registry.read_index() {
        IndexRead::Loaded(projects) if !projects.is_empty() => {
            return retry_retained_legacy(store, &projects);
        }
        IndexRead::Unreadable => {
            warn!("event=migration module=migration status=skip reason=registry_unreadable");
            return MigrationOutcome::RegistryUnreadable;
        }
        IndexRead::Absent | IndexRead::Loaded(_) => {}
    }

    let (meta, outcome) = match store.kv_get(LEGACY_STATE_KEY) {
        None => (
            ProjectMeta::with_id(DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME, ""),
            MigrationOutcome::FreshDefault,
        ),
        Some(text) => match parse_legacy(&text) {
            Some(legacy) => {
                let theme = legacy.research_theme.clone();
                let meta = ProjectMeta::with_id(DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME, theme);
                (meta, import_legacy(store, &legacy))
            }
            None => {
                warn!("event=migration module=migration status=skip reason=legacy_unparseable");
                (
                    ProjectMeta::with_id(DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME, ""),
                    MigrationOutcome::LegacyUnreadable,
                )
            }
        },
    };

    registry.save(&[meta]);
    registry.set_current_project_id(DEFAULT_PROJECT_ID);
    outcome
}

/// Imports a legacy document kept by an earlier failed bulk write, as long
/// as the default project is registered and still has no bulk document.
fn retry_retained_legacy(store: &Store<'_>, projects: &[ProjectMeta]) -> MigrationOutcome {
    let default_registered = projects.iter().any(|meta| meta.id == DEFAULT_PROJECT_ID);
    if !default_registered || store.get(&project_state_key(DEFAULT_PROJECT_ID)).is_some() {
        return MigrationOutcome::AlreadyMigrated;
    }
    match store.kv_get(LEGACY_STATE_KEY).as_deref().and_then(parse_legacy) {
        Some(legacy) => import_legacy(store, &legacy),
        None => MigrationOutcome::AlreadyMigrated,
    }
}

fn parse_legacy(text: &str) -> Option<ProjectStateDocument> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(serde_json::Value::is_object)
        .map(|legacy| merge_defaults(&legacy))
}

/// Writes the legacy document as the default project's bulk document and
/// drops `app-state` once the write is acknowledged.
fn import_legacy(store: &Store<'_>, document: &ProjectStateDocument) -> MigrationOutcome {
    let written = document
        .to_value()
        .map(|value| store.set(&project_state_key(DEFAULT_PROJECT_ID), &value))
        .unwrap_or(false);
    if written {
        store.kv_delete(LEGACY_STATE_KEY);
        MigrationOutcome::LegacyImported
    } else {
        warn!("event=migration module=migration status=error error_code=legacy_write_failed");
        MigrationOutcome::LegacyRetained
    }
}

/// Moves registered projects' documents from the small-value tier to the
/// bulk tier.
///
/// A bulk copy, when present, wins; the small-value copy is removed only
/// once a bulk copy exists. Returns the number of documents moved.
pub fn sweep_small_value_documents(store: &Store<'_>) -> usize {
    let Some(projects) = ProjectRegistry::new(store).load() else {
        return 0;
    };

    let mut moved = 0;
    for meta in &projects {
        let key = project_state_key(&meta.id);
        let Some(text) = store.kv_get(&key) else {
            continue;
        };

        let in_bulk = store.get(&key).is_some();
        if !in_bulk {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                warn!(
                    "event=migration_sweep module=migration status=skip reason=unparseable project_id={}",
                    meta.id
                );
                continue;
            };
            let Ok(merged) = merge_defaults(&value).to_value() else {
                continue;
            };
            if !store.set(&key, &merged) {
                continue;
            }
            moved += 1;
        }
        store.kv_delete(&key);
    }
    moved
}

/// Points `current-project` at a registered project.
///
/// Returns `true` when the pointer was missing or dangling and was
/// rewritten to the first registered project.
pub fn repair_current_pointer(store: &Store<'_>) -> bool {
    let registry = ProjectRegistry::new(store);
    let Some(projects) = registry.load().filter(|projects| !projects.is_empty()) else {
        return false;
    };

    let current = registry.current_project_id();
    if current
        .as_deref()
        .is_some_and(|id| projects.iter().any(|meta| meta.id == id))
    {
        return false;
    }

    registry.set_current_project_id(&projects[0].id)
}

#[cfg(test)]
mod tests {
    use super::{migrate_registry, repair_current_pointer, MigrationOutcome};
    use crate::model::project::ProjectMeta;
    use crate::repo::memory_tier::MemoryTier;
    use crate::repo::registry_repo::ProjectRegistry;
    use crate::repo::store::{Store, CURRENT_PROJECT_KEY, LEGACY_STATE_KEY, PROJECTS_INDEX_KEY};

    #[test]
    fn unparseable_legacy_degrades_to_fresh_default() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        kv.insert_raw(LEGACY_STATE_KEY, "{not json");
        let store = Store::new(&bulk, &kv);

        assert_eq!(migrate_registry(&store), MigrationOutcome::LegacyUnreadable);
        let projects = ProjectRegistry::new(&store).load().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "default");
        assert_eq!(projects[0].theme, "");
        assert!(bulk.keys().is_empty());
    }

    #[test]
    fn empty_index_array_is_initialized() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        kv.insert_raw(PROJECTS_INDEX_KEY, "[]");
        let store = Store::new(&bulk, &kv);

        assert_eq!(migrate_registry(&store), MigrationOutcome::FreshDefault);
        assert_eq!(ProjectRegistry::new(&store).load().unwrap().len(), 1);
    }

    #[test]
    fn unreadable_index_is_left_untouched() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        kv.insert_raw(PROJECTS_INDEX_KEY, "[{\"id\":\"a\"");
        let store = Store::new(&bulk, &kv);

        assert_eq!(migrate_registry(&store), MigrationOutcome::RegistryUnreadable);
        assert_eq!(kv.raw(PROJECTS_INDEX_KEY).as_deref(), Some("[{\"id\":\"a\""));
        assert!(!kv.contains_key(CURRENT_PROJECT_KEY));
    }

    #[test]
    fn dangling_pointer_is_repaired_to_first_project() {
        let bulk = MemoryTier::new();
        let kv = MemoryTier::new();
        let store = Store::new(&bulk, &kv);
        let first = ProjectMeta::new("First", "");
        ProjectRegistry::new(&store).save(&[first.clone(), ProjectMeta::new("Second", "")]);
        kv.insert_raw(CURRENT_PROJECT_KEY, "gone");

        assert!(repair_current_pointer(&store));
        assert_eq!(kv.raw(CURRENT_PROJECT_KEY), Some(first.id));
        assert!(!repair_current_pointer(&store));
    }
}

use designspace_core::db::open_db;
use designspace_core::repo::store::{
    project_state_key, CURRENT_PROJECT_KEY, LEGACY_STATE_KEY, PROJECTS_INDEX_KEY,
};
use designspace_core::{
    merge_defaults, run_startup_migration, MemoryTier, MigrationOutcome, ProjectMeta,
    ProjectRegistry, ProjectStateDocument, SqliteBulkTier, SqliteKvTier, Store, Workspace,
};
use serde_json::Value;

#[test]
fn legacy_app_state_becomes_default_project() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    kv.insert_raw(LEGACY_STATE_KEY, r#"{"researchTheme":"Tokyo infill housing"}"#);
    let store = Store::new(&bulk, &kv);

    let report = run_startup_migration(&store);
    assert_eq!(report.outcome, MigrationOutcome::LegacyImported);

    let projects = ProjectRegistry::new(&store).load().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, "default");
    assert_eq!(projects[0].name, "Default");
    assert_eq!(projects[0].theme, "Tokyo infill housing");
    assert!(!kv.contains_key(LEGACY_STATE_KEY));
    assert_eq!(kv.raw(CURRENT_PROJECT_KEY).as_deref(), Some("default"));

    let stored: Value =
        serde_json::from_str(&bulk.raw(&project_state_key("default")).unwrap()).unwrap();
    let document = merge_defaults(&stored);
    assert_eq!(document.research_theme, "Tokyo infill housing");
    assert!(document.evaluation_results.is_empty());
}

#[test]
fn migration_is_idempotent() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    kv.insert_raw(LEGACY_STATE_KEY, r#"{"researchTheme":"canal houses","sceneConstraint":"fog"}"#);
    let store = Store::new(&bulk, &kv);

    run_startup_migration(&store);
    let index_after_first = kv.raw(PROJECTS_INDEX_KEY);
    let document_after_first = bulk.raw(&project_state_key("default"));

    let second = run_startup_migration(&store);
    assert_eq!(second.outcome, MigrationOutcome::AlreadyMigrated);
    assert_eq!(kv.raw(PROJECTS_INDEX_KEY), index_after_first);
    assert_eq!(bulk.raw(&project_state_key("default")), document_after_first);
    assert_eq!(kv.raw(CURRENT_PROJECT_KEY).as_deref(), Some("default"));
}

#[test]
fn empty_storage_starts_with_fresh_default_project() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    let workspace = Workspace::open(Store::new(&bulk, &kv));

    assert_eq!(
        workspace.migration_report().outcome,
        MigrationOutcome::FreshDefault
    );
    assert_eq!(workspace.projects().len(), 1);
    assert_eq!(workspace.current_project_id(), "default");
    assert_eq!(workspace.current_document(), &ProjectStateDocument::default());
}

#[test]
fn non_object_legacy_payload_is_ignored() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    kv.insert_raw(LEGACY_STATE_KEY, "[1,2,3]");
    let workspace = Workspace::open(Store::new(&bulk, &kv));

    assert_eq!(
        workspace.migration_report().outcome,
        MigrationOutcome::LegacyUnreadable
    );
    assert_eq!(workspace.current_document(), &ProjectStateDocument::default());
}

#[test]
fn small_value_documents_are_swept_into_bulk_tier() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    let meta = ProjectMeta::with_id("old", "Old project", "terraces");
    kv.insert_raw(
        PROJECTS_INDEX_KEY,
        serde_json::to_string(&vec![meta]).unwrap(),
    );
    kv.insert_raw(CURRENT_PROJECT_KEY, "old");
    kv.insert_raw(project_state_key("old"), r#"{"researchTheme":"terraces"}"#);

    let workspace = Workspace::open(Store::new(&bulk, &kv));

    assert_eq!(workspace.migration_report().swept_documents, 1);
    assert!(!kv.contains_key(&project_state_key("old")));
    assert!(bulk.contains_key(&project_state_key("old")));
    assert_eq!(workspace.current_document().research_theme, "terraces");
}

#[test]
fn sweep_keeps_existing_bulk_copy() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    let meta = ProjectMeta::with_id("p", "P", "");
    kv.insert_raw(
        PROJECTS_INDEX_KEY,
        serde_json::to_string(&vec![meta]).unwrap(),
    );
    kv.insert_raw(project_state_key("p"), r#"{"researchTheme":"stale"}"#);
    bulk.insert_raw(project_state_key("p"), r#"{"researchTheme":"fresh"}"#);

    let workspace = Workspace::open(Store::new(&bulk, &kv));

    assert_eq!(workspace.migration_report().swept_documents, 0);
    assert!(!kv.contains_key(&project_state_key("p")));
    assert_eq!(workspace.current_document().research_theme, "fresh");
}

#[test]
fn disabled_storage_still_opens_a_usable_workspace() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    bulk.set_reads_disabled(true);
    bulk.set_writes_disabled(true);
    kv.set_reads_disabled(true);
    kv.set_writes_disabled(true);

    let mut workspace = Workspace::open(Store::new(&bulk, &kv));
    assert_eq!(workspace.projects().len(), 1);

    workspace.update_document(|document| document.scene_constraint = "steep slope".to_string());
    assert_eq!(workspace.tick(), 0);
    assert_eq!(workspace.current_document().scene_constraint, "steep slope");
}

fn two_project_index(kv: &MemoryTier) -> String {
    let index = serde_json::to_string(&vec![
        ProjectMeta::with_id("a", "Alpha", "orchard"),
        ProjectMeta::with_id("b", "Beta", "quarry"),
    ])
    .unwrap();
    kv.insert_raw(PROJECTS_INDEX_KEY, index.clone());
    kv.insert_raw(CURRENT_PROJECT_KEY, "b");
    index
}

#[test]
fn failed_index_read_never_replaces_existing_projects() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    let index = two_project_index(&kv);
    kv.set_reads_disabled(true);

    let mut workspace = Workspace::open(Store::new(&bulk, &kv));
    assert_eq!(
        workspace.migration_report().outcome,
        MigrationOutcome::RegistryUnreadable
    );
    assert_eq!(kv.raw(PROJECTS_INDEX_KEY), Some(index.clone()));
    assert_eq!(kv.raw(CURRENT_PROJECT_KEY).as_deref(), Some("b"));

    // Mutations stay in memory while the index cannot be read.
    workspace.create_project("Scratch", "").unwrap();
    workspace.update_document(|document| document.scene_constraint = "offline".to_string());
    workspace.tick();
    assert_eq!(kv.raw(PROJECTS_INDEX_KEY), Some(index));
    assert_eq!(kv.raw(CURRENT_PROJECT_KEY).as_deref(), Some("b"));

    kv.set_reads_disabled(false);
    let reopened = Workspace::open(Store::new(&bulk, &kv));
    assert_eq!(
        reopened.migration_report().outcome,
        MigrationOutcome::AlreadyMigrated
    );
    let ids: Vec<&str> = reopened.projects().iter().map(|meta| meta.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(reopened.current_project_id(), "b");
}

#[test]
fn truncated_index_is_left_in_place() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    let truncated = r#"[{"id":"a","name":"Alpha","theme":"","createdAt":1,"updatedAt":1},{"id":"b""#;
    kv.insert_raw(PROJECTS_INDEX_KEY, truncated);
    kv.insert_raw(CURRENT_PROJECT_KEY, "b");

    let mut workspace = Workspace::open(Store::new(&bulk, &kv));
    assert_eq!(
        workspace.migration_report().outcome,
        MigrationOutcome::RegistryUnreadable
    );
    assert_eq!(workspace.projects().len(), 1);

    workspace.rename_project("default", "Renamed").unwrap();
    assert_eq!(kv.raw(PROJECTS_INDEX_KEY).as_deref(), Some(truncated));
    assert_eq!(kv.raw(CURRENT_PROJECT_KEY).as_deref(), Some("b"));
}

#[test]
fn failed_legacy_write_keeps_app_state_and_retries() {
    let bulk = MemoryTier::new();
    let kv = MemoryTier::new();
    kv.insert_raw(LEGACY_STATE_KEY, r#"{"researchTheme":"hill town"}"#);
    bulk.set_writes_disabled(true);
    let store = Store::new(&bulk, &kv);

    let first = run_startup_migration(&store);
    assert_eq!(first.outcome, MigrationOutcome::LegacyRetained);
    assert!(kv.contains_key(LEGACY_STATE_KEY));
    assert!(!bulk.contains_key(&project_state_key("default")));
    let projects = ProjectRegistry::new(&store).load().unwrap();
    assert_eq!(projects[0].theme, "hill town");

    bulk.set_writes_disabled(false);
    let second = run_startup_migration(&store);
    assert_eq!(second.outcome, MigrationOutcome::LegacyImported);
    assert!(!kv.contains_key(LEGACY_STATE_KEY));
    let stored: Value =
        serde_json::from_str(&bulk.raw(&project_state_key("default")).unwrap()).unwrap();
    assert_eq!(merge_defaults(&stored).research_theme, "hill town");

    assert_eq!(
        run_startup_migration(&store).outcome,
        MigrationOutcome::AlreadyMigrated
    );
}

#[test]
fn sqlite_backed_workspace_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("designspace.sqlite3");

    let created_id = {
        let conn = open_db(&path).unwrap();
        let bulk = SqliteBulkTier::try_new(&conn).unwrap();
        let kv = SqliteKvTier::try_new(&conn).unwrap();
        let mut workspace = Workspace::open(Store::new(bulk, kv));
        let meta = workspace.create_project("Harbor", "working waterfront").unwrap();
        workspace.update_document(|document| document.scene_constraint = "tidal".to_string());
        assert_eq!(workspace.tick(), 1);
        meta.id
    };

    let conn = open_db(&path).unwrap();
    let bulk = SqliteBulkTier::try_new(&conn).unwrap();
    let kv = SqliteKvTier::try_new(&conn).unwrap();
    let workspace = Workspace::open(Store::new(bulk, kv));

    assert_eq!(
        workspace.migration_report().outcome,
        MigrationOutcome::AlreadyMigrated
    );
    assert_eq!(workspace.projects().len(), 2);
    assert_eq!(workspace.current_project_id(), created_id);
    assert_eq!(workspace.current_document().research_theme, "working waterfront");
    assert_eq!(workspace.current_document().scene_constraint, "tidal");
}

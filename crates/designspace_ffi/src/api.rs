//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose project-level use-cases (list/switch/create/rename/duplicate/
//!   delete/export/import) and document load/save to Dart via FRB.
//! - Open the configured workspace database per call and flush before
//!   returning, so every acknowledged call is durable.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures are reported as envelopes with `ok=false` and a message.
//!
//! # See also
//! - designspace_core::service::workspace_service

use designspace_core::db::open_db;
use designspace_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, merge_defaults,
    ping as ping_inner, ProjectMeta, SqliteBulkTier, SqliteKvTier, Store, Workspace,
};
use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;

const WORKSPACE_DB_FILE_NAME: &str = "designspace.sqlite3";
const WORKSPACE_DB_PATH_ENV: &str = "DESIGNSPACE_DB_PATH";
static WORKSPACE_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Sets the workspace database path for this process.
///
/// # FFI contract
/// - Must be called before the first project call to take effect.
/// - Repeating the same path is accepted; a different path is rejected.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_workspace_db(path: String) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return "workspace db path cannot be empty".to_string();
    }
    let requested = PathBuf::from(trimmed);
    let active = WORKSPACE_DB_PATH.get_or_init(|| requested.clone());
    if *active == requested {
        String::new()
    } else {
        format!(
            "workspace db already configured at `{}`",
            active.display()
        )
    }
}

/// Project metadata row for list rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectListItem {
    pub project_id: String,
    pub name: String,
    pub theme: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

/// Registry snapshot returned by `projects_list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectListResponse {
    pub ok: bool,
    /// Projects in registry order.
    pub items: Vec<ProjectListItem>,
    pub current_project_id: String,
    pub message: String,
}

/// Generic action response envelope for project commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Affected (or newly created) project ID.
    pub project_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ProjectActionResponse {
    fn success(message: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            ok: true,
            project_id: Some(project_id.into()),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            project_id: None,
            message: message.into(),
        }
    }
}

/// JSON payload response for export and document load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectJsonResponse {
    pub ok: bool,
    pub project_id: Option<String>,
    /// JSON text; empty on failure.
    pub json: String,
    pub message: String,
}

impl ProjectJsonResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            project_id: None,
            json: String::new(),
            message: message.into(),
        }
    }
}

/// Lists registered projects and the current project id.
#[flutter_rust_bridge::frb(sync)]
pub fn projects_list() -> ProjectListResponse {
    match with_workspace(|workspace| {
        (
            workspace
                .projects()
                .iter()
                .map(to_list_item)
                .collect::<Vec<_>>(),
            workspace.current_project_id().to_string(),
        )
    }) {
        Ok((items, current_project_id)) => ProjectListResponse {
            ok: true,
            message: format!("Found {} project(s).", items.len()),
            items,
            current_project_id,
        },
        Err(err) => ProjectListResponse {
            ok: false,
            items: Vec::new(),
            current_project_id: String::new(),
            message: format!("projects_list failed: {err}"),
        },
    }
}

/// Makes `project_id` the current project.
#[flutter_rust_bridge::frb(sync)]
pub fn project_switch(project_id: String) -> ProjectActionResponse {
    let project_id = project_id.trim().to_string();
    match with_workspace(|workspace| workspace.switch_project(&project_id)) {
        Ok(Ok(())) => ProjectActionResponse::success("Project switched.", project_id),
        Ok(Err(err)) => ProjectActionResponse::failure(format!("project_switch failed: {err}")),
        Err(err) => ProjectActionResponse::failure(format!("project_switch failed: {err}")),
    }
}

/// Creates a project with a default document and makes it current.
#[flutter_rust_bridge::frb(sync)]
pub fn project_create(name: String, theme: String) -> ProjectActionResponse {
    match with_workspace(|workspace| workspace.create_project(&name, &theme)) {
        Ok(Ok(meta)) => ProjectActionResponse::success("Project created.", meta.id),
        Ok(Err(err)) => ProjectActionResponse::failure(format!("project_create failed: {err}")),
        Err(err) => ProjectActionResponse::failure(format!("project_create failed: {err}")),
    }
}

/// Renames a registered project.
#[flutter_rust_bridge::frb(sync)]
pub fn project_rename(project_id: String, name: String) -> ProjectActionResponse {
    let project_id = project_id.trim().to_string();
    match with_workspace(|workspace| workspace.rename_project(&project_id, &name)) {
        Ok(Ok(())) => ProjectActionResponse::success("Project renamed.", project_id),
        Ok(Err(err)) => ProjectActionResponse::failure(format!("project_rename failed: {err}")),
        Err(err) => ProjectActionResponse::failure(format!("project_rename failed: {err}")),
    }
}

/// Copies a project under a new id; the current project is unchanged.
#[flutter_rust_bridge::frb(sync)]
pub fn project_duplicate(project_id: String) -> ProjectActionResponse {
    let project_id = project_id.trim().to_string();
    match with_workspace(|workspace| workspace.duplicate_project(&project_id)) {
        Ok(Ok(meta)) => ProjectActionResponse::success("Project duplicated.", meta.id),
        Ok(Err(err)) => {
            ProjectActionResponse::failure(format!("project_duplicate failed: {err}"))
        }
        Err(err) => ProjectActionResponse::failure(format!("project_duplicate failed: {err}")),
    }
}

/// Deletes a project. The last remaining project is never deleted.
#[flutter_rust_bridge::frb(sync)]
pub fn project_delete(project_id: String) -> ProjectActionResponse {
    let project_id = project_id.trim().to_string();
    match with_workspace(|workspace| workspace.delete_project(&project_id)) {
        Ok(true) => ProjectActionResponse::success("Project deleted.", project_id),
        Ok(false) => ProjectActionResponse::failure(
            "project_delete refused: unknown project or last remaining project",
        ),
        Err(err) => ProjectActionResponse::failure(format!("project_delete failed: {err}")),
    }
}

/// Exports a project as `{ "meta": ..., "state": ... }` JSON text.
#[flutter_rust_bridge::frb(sync)]
pub fn project_export(project_id: String) -> ProjectJsonResponse {
    let project_id = project_id.trim().to_string();
    match with_workspace(|workspace| workspace.export_project(&project_id)) {
        Ok(Ok(json)) => ProjectJsonResponse {
            ok: true,
            project_id: Some(project_id),
            json,
            message: "Project exported.".to_string(),
        },
        Ok(Err(err)) => ProjectJsonResponse::failure(format!("project_export failed: {err}")),
        Err(err) => ProjectJsonResponse::failure(format!("project_export failed: {err}")),
    }
}

/// Imports exported text (or a bare document) as a new current project.
#[flutter_rust_bridge::frb(sync)]
pub fn project_import(text: String) -> ProjectActionResponse {
    match with_workspace(|workspace| workspace.import_project(&text)) {
        Ok(Ok(meta)) => ProjectActionResponse::success("Project imported.", meta.id),
        Ok(Err(err)) => ProjectActionResponse::failure(format!("project_import failed: {err}")),
        Err(err) => ProjectActionResponse::failure(format!("project_import failed: {err}")),
    }
}

/// Loads the current project's document as JSON text.
#[flutter_rust_bridge::frb(sync)]
pub fn project_state_load() -> ProjectJsonResponse {
    let loaded = with_workspace(|workspace| {
        serde_json::to_string(workspace.current_document())
            .map(|json| (workspace.current_project_id().to_string(), json))
    });
    match loaded {
        Ok(Ok((project_id, json))) => ProjectJsonResponse {
            ok: true,
            project_id: Some(project_id),
            json,
            message: "Project state loaded.".to_string(),
        },
        Ok(Err(err)) => ProjectJsonResponse::failure(format!("project_state_load failed: {err}")),
        Err(err) => ProjectJsonResponse::failure(format!("project_state_load failed: {err}")),
    }
}

/// Replaces the current project's document and persists it.
///
/// Input is merged against defaults, so partial documents are accepted.
#[flutter_rust_bridge::frb(sync)]
pub fn project_state_save(state_json: String) -> ProjectActionResponse {
    let value: serde_json::Value = match serde_json::from_str(&state_json) {
        Ok(value) => value,
        Err(err) => {
            return ProjectActionResponse::failure(format!("project_state_save failed: {err}"))
        }
    };
    if !value.is_object() {
        return ProjectActionResponse::failure(
            "project_state_save failed: state must be a JSON object",
        );
    }
    let document = merge_defaults(&value);
    match with_workspace(move |workspace| {
        workspace.update_document(|current| *current = document);
        workspace.current_project_id().to_string()
    }) {
        Ok(project_id) => ProjectActionResponse::success("Project state saved.", project_id),
        Err(err) => ProjectActionResponse::failure(format!("project_state_save failed: {err}")),
    }
}

fn resolve_workspace_db_path() -> PathBuf {
    WORKSPACE_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(WORKSPACE_DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(WORKSPACE_DB_FILE_NAME)
        })
        .clone()
}

/// Opens the workspace, runs `f`, then flushes pending saves.
fn with_workspace<R>(f: impl FnOnce(&mut Workspace<'_>) -> R) -> Result<R, String> {
    let db_path = resolve_workspace_db_path();
    let conn = open_db(&db_path).map_err(|err| {
        warn!(
            "event=ffi_db_open module=ffi status=error path={} error={}",
            db_path.display(),
            err
        );
        format!("workspace DB open failed: {err}")
    })?;
    let bulk =
        SqliteBulkTier::try_new(&conn).map_err(|err| format!("bulk tier init failed: {err}"))?;
    let kv = SqliteKvTier::try_new(&conn).map_err(|err| format!("kv tier init failed: {err}"))?;
    let mut workspace = Workspace::open(Store::new(bulk, kv));
    let result = f(&mut workspace);
    workspace.tick();
    Ok(result)
}

fn to_list_item(meta: &ProjectMeta) -> ProjectListItem {
    ProjectListItem {
        project_id: meta.id.clone(),
        name: meta.name.clone(),
        theme: meta.theme.clone(),
        created_at: meta.created_at,
        updated_at: meta.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        configure_workspace_db, core_version, init_logging, ping, project_create,
        project_delete, project_duplicate, project_export, project_import, project_rename,
        project_state_load, project_state_save, project_switch, projects_list,
        resolve_workspace_db_path,
    };
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;

    static DB_LOCK: Mutex<()> = Mutex::new(());
    static TEST_DB_DIR: OnceLock<TempDir> = OnceLock::new();

    // Must run before anything resolves the process-wide path.
    fn use_test_db() {
        let dir = TEST_DB_DIR.get_or_init(|| tempfile::tempdir().unwrap());
        let path = dir.path().join("designspace-test.sqlite3");
        let error = configure_workspace_db(path.to_string_lossy().into_owned());
        assert!(error.is_empty(), "{error}");
    }

    // Registry writes are read-modify-write; serialize tests sharing the file.
    fn lock_db() -> MutexGuard<'static, ()> {
        use_test_db();
        DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn configure_workspace_db_rejects_blank_and_conflicting_paths() {
        assert!(!configure_workspace_db("  ".to_string()).is_empty());

        use_test_db();
        let active = resolve_workspace_db_path();
        assert!(active.starts_with(TEST_DB_DIR.get().unwrap().path()));
        let same = configure_workspace_db(active.to_string_lossy().into_owned());
        assert!(same.is_empty(), "{same}");
        let other = configure_workspace_db(format!("{}-other", active.display()));
        assert!(other.contains("already configured"));
    }

    #[test]
    fn create_switch_and_delete_round_trip() {
        let _guard = lock_db();
        let name = unique_token("ffi-create");
        let created = project_create(name.clone(), "quarry park".to_string());
        assert!(created.ok, "{}", created.message);
        let created_id = created.project_id.expect("create should return project_id");

        let listed = projects_list();
        assert!(listed.ok, "{}", listed.message);
        assert_eq!(listed.current_project_id, created_id);
        let item = listed
            .items
            .iter()
            .find(|item| item.project_id == created_id)
            .expect("created project should be listed");
        assert_eq!(item.name, name);
        assert_eq!(item.theme, "quarry park");

        let other = listed
            .items
            .iter()
            .find(|item| item.project_id != created_id)
            .map(|item| item.project_id.clone())
            .expect("workspace always keeps another project");
        assert!(project_switch(other.clone()).ok);
        assert_eq!(projects_list().current_project_id, other);

        assert!(project_delete(created_id.clone()).ok);
        assert!(projects_list()
            .items
            .iter()
            .all(|item| item.project_id != created_id));
    }

    #[test]
    fn state_save_then_load_returns_saved_document() {
        let _guard = lock_db();
        let created = project_create(unique_token("ffi-state"), String::new());
        assert!(created.ok, "{}", created.message);

        let saved = project_state_save(r#"{"sceneConstraint":"north light"}"#.to_string());
        assert!(saved.ok, "{}", saved.message);
        assert_eq!(saved.project_id, created.project_id);

        let loaded = project_state_load();
        assert!(loaded.ok, "{}", loaded.message);
        let value: serde_json::Value = serde_json::from_str(&loaded.json).unwrap();
        assert_eq!(value["sceneConstraint"], "north light");
        assert!(value["evaluationResults"].as_array().unwrap().is_empty());

        assert!(!project_state_save("[1, 2]".to_string()).ok);
        assert!(!project_state_save("{broken".to_string()).ok);
    }

    #[test]
    fn export_import_and_duplicate_create_new_projects() {
        let _guard = lock_db();
        let name = unique_token("ffi-export");
        let created = project_create(name.clone(), "lantern".to_string());
        let created_id = created.project_id.expect("create should return project_id");

        let exported = project_export(created_id.clone());
        assert!(exported.ok, "{}", exported.message);
        assert!(exported.json.contains("\"meta\""));

        let imported = project_import(exported.json);
        assert!(imported.ok, "{}", imported.message);
        assert_ne!(imported.project_id.as_deref(), Some(created_id.as_str()));

        let duplicated = project_duplicate(created_id.clone());
        assert!(duplicated.ok, "{}", duplicated.message);
        assert!(project_rename(created_id.clone(), format!("{name} renamed")).ok);

        assert!(!project_import("not json".to_string()).ok);
        assert!(!project_export("missing-project".to_string()).ok);
        assert!(!project_switch("missing-project".to_string()).ok);
        assert!(!project_delete("missing-project".to_string()).ok);
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }
}

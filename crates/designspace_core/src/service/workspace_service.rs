//! Application state facade over registry, store and document container.
//!
//! # Responsibility
//! - Own the in-memory mirror of the registry and the active document.
//! - Provide project switch/create/duplicate/delete/rename/import/export.
//! - Drive coalesced saves through `tick` and bump `updatedAt` on success.
//!
//! # Invariants
//! - The registry always holds at least one project; deleting the last one
//!   is refused.
//! - The outgoing project's in-memory document is queued for persistence
//!   before any switch replaces it.
//! - In-memory state is replaced only after the target document is loaded.
//! - Storage failures never surface as errors; only caller mistakes do.
//! - An index that exists but cannot be read is never overwritten.

use crate::model::document::ProjectStateDocument;
use crate::model::export::{parse_import, ExportBundle};
use crate::model::project::{ProjectId, ProjectMeta, DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME};
use crate::repo::registry_repo::{IndexRead, ProjectRegistry};
use crate::repo::store::Store;
use crate::service::document_service::DocumentContainer;
use crate::service::migration_service::{run_startup_migration, MigrationReport};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Name given to imports that carry no metadata name.
pub const IMPORTED_PROJECT_NAME: &str = "Imported";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
static COPY_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<base>.*?) \(copy(?: (?P<n>\d+))?\)$").expect("valid copy suffix regex")
});

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Caller-facing errors of workspace operations.
#[derive(Debug)]
pub enum WorkspaceError {
    /// No registered project has this id.
    ProjectNotFound(ProjectId),
    /// Project name is blank after normalization.
    InvalidName,
    /// Import text is not a JSON object.
    InvalidImport(String),
    /// Export serialization failed.
    Serialize(String),
}

impl Display for WorkspaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::InvalidName => write!(f, "project name must not be blank"),
            Self::InvalidImport(reason) => write!(f, "invalid import payload: {reason}"),
            Self::Serialize(reason) => write!(f, "project export failed: {reason}"),
        }
    }
}

impl Error for WorkspaceError {}

/// Single owned application state container.
pub struct Workspace<'t> {
    store: Store<'t>,
    container: DocumentContainer,
    projects: Vec<ProjectMeta>,
    current_id: ProjectId,
    document: ProjectStateDocument,
    /// In-memory document differs from the last acknowledged write.
    dirty: bool,
    /// Whether the persisted index may be replaced by the in-memory mirror.
    /// False while an existing index could not be read.
    registry_writable: bool,
    migration: MigrationReport,
}

impl<'t> Workspace<'t> {
    /// Runs startup migration and loads the current project.
    pub fn open(store: Store<'t>) -> Self {
        let migration = run_startup_migration(&store);
        let (projects, current_id, registry_writable) = {
            let registry = ProjectRegistry::new(&store);
            let (mut projects, registry_writable) = match registry.read_index() {
                IndexRead::Loaded(projects) => (projects, true),
                IndexRead::Absent => (Vec::new(), true),
                IndexRead::Unreadable => (Vec::new(), false),
            };
            if projects.is_empty() {
                projects.push(ProjectMeta::with_id(
                    DEFAULT_PROJECT_ID,
                    DEFAULT_PROJECT_NAME,
                    "",
                ));
            }
            let current_id = registry
                .current_project_id()
                .filter(|id| projects.iter().any(|meta| &meta.id == id))
                .unwrap_or_else(|| projects[0].id.clone());
            (projects, current_id, registry_writable)
        };

        let container = DocumentContainer::new();
        let document = container.load(&store, &current_id);
        info!(
            "event=workspace_open module=workspace status=ok projects={} current_project_id={} registry_writable={}",
            projects.len(),
            current_id,
            registry_writable
        );

        Self {
            store,
            container,
            projects,
            current_id,
            document,
            dirty: false,
            registry_writable,
            migration,
        }
    }

    pub fn current_project_id(&self) -> &str {
        &self.current_id
    }

    pub fn current_project(&self) -> Option<&ProjectMeta> {
        self.project(&self.current_id)
    }

    pub fn current_document(&self) -> &ProjectStateDocument {
        &self.document
    }

    /// Registered projects in registry order.
    pub fn projects(&self) -> &[ProjectMeta] {
        &self.projects
    }

    pub fn project(&self, project_id: &str) -> Option<&ProjectMeta> {
        self.projects.iter().find(|meta| meta.id == project_id)
    }

    /// Report of the migration pass run by `open`.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    /// Mutates the active document and enqueues a coalesced save.
    pub fn update_document<R>(&mut self, mutate: impl FnOnce(&mut ProjectStateDocument) -> R) -> R {
        let result = mutate(&mut self.document);
        self.document.normalize();
        self.dirty = true;
        self.container
            .save(&self.current_id, self.document.clone());
        result
    }

    /// Flushes pending saves. Call once per idle/animation tick.
    ///
    /// Returns the number of project documents persisted.
    pub fn tick(&mut self) -> usize {
        let saved = self.container.flush(&self.store);
        if saved.is_empty() {
            return 0;
        }
        if saved.contains(&self.current_id) {
            self.dirty = false;
        }
        self.mutate_registry(|index| {
            for meta in index.iter_mut().filter(|meta| saved.contains(&meta.id)) {
                meta.touch();
            }
        });
        debug!(
            "event=workspace_tick module=workspace status=ok saved={}",
            saved.len()
        );
        saved.len()
    }

    pub fn has_pending_saves(&self) -> bool {
        self.container.has_pending()
    }

    /// Age of the oldest unflushed save, for a "saving..." indicator.
    pub fn pending_save_age(&self) -> Option<Duration> {
        self.container
            .pending_since()
            .map(|enqueued_at| enqueued_at.elapsed())
    }

    /// Makes `project_id` the active project.
    ///
    /// # Errors
    /// - `ProjectNotFound` when the id is not registered.
    pub fn switch_project(&mut self, project_id: &str) -> WorkspaceResult<()> {
        if project_id == self.current_id {
            return Ok(());
        }
        if self.project(project_id).is_none() {
            return Err(WorkspaceError::ProjectNotFound(project_id.to_string()));
        }

        self.enqueue_current();
        let document = self.container.load(&self.store, project_id);
        self.activate(project_id.to_string(), document);
        info!(
            "event=project_switch module=workspace status=ok project_id={}",
            project_id
        );
        Ok(())
    }

    /// Creates a project with a default document and makes it current.
    ///
    /// # Errors
    /// - `InvalidName` when `name` is blank.
    pub fn create_project(&mut self, name: &str, theme: &str) -> WorkspaceResult<ProjectMeta> {
        let name = normalize_project_name(name).ok_or(WorkspaceError::InvalidName)?;
        let theme = theme.trim();

        self.enqueue_current();
        let meta = ProjectMeta::new(name, theme);
        let document = ProjectStateDocument::with_theme(theme);
        let registered = meta.clone();
        self.mutate_registry(move |index| index.push(registered));
        self.container.write_now(&self.store, &meta.id, &document);
        self.activate(meta.id.clone(), document);

        info!(
            "event=project_create module=workspace status=ok project_id={}",
            meta.id
        );
        Ok(meta)
    }

    /// Deletes a project and its document.
    ///
    /// Returns `false` (and changes nothing) when the id is unknown or it is
    /// the last remaining project. Deleting the active project activates the
    /// first remaining one.
    pub fn delete_project(&mut self, project_id: &str) -> bool {
        let removed = self.mutate_registry(|index| {
            if index.len() <= 1 {
                return false;
            }
            let before = index.len();
            index.retain(|meta| meta.id != project_id);
            index.len() != before
        });
        if !removed {
            debug!(
                "event=project_delete module=workspace status=skip project_id={}",
                project_id
            );
            return false;
        }

        self.container.remove(&self.store, project_id);
        if project_id == self.current_id {
            let next_id = self.projects[0].id.clone();
            let document = self.container.load(&self.store, &next_id);
            self.activate(next_id, document);
        }

        info!(
            "event=project_delete module=workspace status=ok project_id={}",
            project_id
        );
        true
    }

    /// Copies a project under a new id without switching to it.
    ///
    /// # Errors
    /// - `ProjectNotFound` when the source is not registered.
    pub fn duplicate_project(&mut self, project_id: &str) -> WorkspaceResult<ProjectMeta> {
        let source = self
            .project(project_id)
            .cloned()
            .ok_or_else(|| WorkspaceError::ProjectNotFound(project_id.to_string()))?;
        if project_id == self.current_id {
            self.enqueue_current();
        }

        let name = duplicate_name(
            &source.name,
            self.projects.iter().map(|meta| meta.name.as_str()),
        );
        let meta = ProjectMeta::new(name, source.theme.clone());
        let registered = meta.clone();
        self.mutate_registry(move |index| index.push(registered));

        let document = self.container.load(&self.store, project_id);
        self.container.write_now(&self.store, &meta.id, &document);

        info!(
            "event=project_duplicate module=workspace status=ok source_id={} project_id={}",
            project_id, meta.id
        );
        Ok(meta)
    }

    /// Renames a project and bumps its `updatedAt`.
    ///
    /// # Errors
    /// - `InvalidName` when `name` is blank.
    /// - `ProjectNotFound` when the id is not registered.
    pub fn rename_project(&mut self, project_id: &str, name: &str) -> WorkspaceResult<()> {
        let name = normalize_project_name(name).ok_or(WorkspaceError::InvalidName)?;
        if self.project(project_id).is_none() {
            return Err(WorkspaceError::ProjectNotFound(project_id.to_string()));
        }

        let renamed = self.mutate_registry(|index| {
            let Some(meta) = index.iter_mut().find(|meta| meta.id == project_id) else {
                return false;
            };
            meta.name = name;
            meta.touch();
            true
        });
        if !renamed {
            return Err(WorkspaceError::ProjectNotFound(project_id.to_string()));
        }
        Ok(())
    }

    /// Serializes a project as `{ "meta": ..., "state": ... }` JSON text.
    ///
    /// # Errors
    /// - `ProjectNotFound` when the id is not registered.
    /// - `Serialize` when JSON rendering fails.
    pub fn export_project(&mut self, project_id: &str) -> WorkspaceResult<String> {
        let meta = self
            .project(project_id)
            .cloned()
            .ok_or_else(|| WorkspaceError::ProjectNotFound(project_id.to_string()))?;
        if project_id == self.current_id {
            self.enqueue_current();
        }

        let state = self.container.load(&self.store, project_id);
        ExportBundle {
            meta: &meta,
            state: &state,
        }
        .to_json()
        .map_err(|err| WorkspaceError::Serialize(err.to_string()))
    }

    /// Imports exported text (or a bare document) as a new current project.
    ///
    /// # Errors
    /// - `InvalidImport` when the text is not a JSON object.
    pub fn import_project(&mut self, text: &str) -> WorkspaceResult<ProjectMeta> {
        let payload = parse_import(text).map_err(WorkspaceError::InvalidImport)?;

        self.enqueue_current();
        let name = payload
            .name
            .as_deref()
            .and_then(normalize_project_name)
            .unwrap_or_else(|| IMPORTED_PROJECT_NAME.to_string());
        let theme = payload
            .theme
            .unwrap_or_else(|| payload.state.research_theme.trim().to_string());
        let meta = ProjectMeta::new(name, theme);
        let registered = meta.clone();
        self.mutate_registry(move |index| index.push(registered));
        self.container
            .write_now(&self.store, &meta.id, &payload.state);
        self.activate(meta.id.clone(), payload.state);

        info!(
            "event=project_import module=workspace status=ok project_id={}",
            meta.id
        );
        Ok(meta)
    }

    fn enqueue_current(&mut self) {
        if self.dirty {
            self.container
                .save(&self.current_id, self.document.clone());
        }
    }

    fn activate(&mut self, project_id: ProjectId, document: ProjectStateDocument) {
        if self.registry_writable {
            ProjectRegistry::new(&self.store).set_current_project_id(&project_id);
        }
        self.current_id = project_id;
        self.document = document;
        self.dirty = false;
    }

    /// Read-modify-write of the full registry index.
    ///
    /// Falls back to the in-memory mirror when the persisted index is
    /// unreadable. The mirror is written back only once the index has been
    /// read successfully, so an index that exists but could not be read is
    /// never replaced by a partial one.
    fn mutate_registry<R>(&mut self, mutate: impl FnOnce(&mut Vec<ProjectMeta>) -> R) -> R {
        let registry = ProjectRegistry::new(&self.store);
        let persisted = match registry.read_index() {
            IndexRead::Loaded(projects) => {
                self.registry_writable = true;
                Some(projects).filter(|projects| !projects.is_empty())
            }
            IndexRead::Absent => {
                self.registry_writable = true;
                None
            }
            IndexRead::Unreadable => None,
        };
        let mut index = persisted.unwrap_or_else(|| self.projects.clone());
        let result = mutate(&mut index);
        if self.registry_writable {
            registry.save(&index);
        } else {
            warn!(
                "event=registry_save module=workspace status=skip reason=registry_unreadable projects={}",
                index.len()
            );
        }
        self.projects = index;
        result
    }
}

/// Trims and collapses whitespace; returns `None` for blank names.
pub fn normalize_project_name(name: &str) -> Option<String> {
    let normalized = WHITESPACE_RE.replace_all(name.trim(), " ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.into_owned())
    }
}

/// Derives a unique copy name: `Name (copy)`, then `Name (copy 2)`, ...
pub fn duplicate_name<'a>(source: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let existing: Vec<&str> = existing.into_iter().collect();
    let base = COPY_SUFFIX_RE
        .captures(source)
        .and_then(|caps| caps.name("base").map(|base| base.as_str().to_string()))
        .unwrap_or_else(|| source.to_string());

    let first = format!("{base} (copy)");
    if !existing.contains(&first.as_str()) {
        return first;
    }
    (2..)
        .map(|n| format!("{base} (copy {n})"))
        .find(|candidate| !existing.contains(&candidate.as_str()))
        .unwrap_or(first)
}

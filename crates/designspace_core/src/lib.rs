//! Core project store for the design-space explorer.
//! This crate is the single source of truth for persistence invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::document::{
    merge_defaults, Atmosphere, Concept, ConceptDirection, DetailStage, DomainScore,
    EvaluationResult, GeneratedImage, GenerationJob, ProjectStateDocument, RefinedConcept,
    ResearchCondition, ResearchDomain, SpectrumAxis, SpectrumDescriptor,
};
pub use model::export::{parse_import, ExportBundle, ImportPayload};
pub use model::project::{ProjectId, ProjectMeta, DEFAULT_PROJECT_ID, DEFAULT_PROJECT_NAME};
pub use repo::memory_tier::MemoryTier;
pub use repo::registry_repo::ProjectRegistry;
pub use repo::sqlite_tier::{SqliteBulkTier, SqliteKvTier};
pub use repo::store::Store;
pub use repo::tier::{BulkTier, KvTier, TierError, TierResult};
pub use service::document_service::DocumentContainer;
pub use service::migration_service::{run_startup_migration, MigrationOutcome, MigrationReport};
pub use service::workspace_service::{Workspace, WorkspaceError, WorkspaceResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store and registry access into project-level operations.
//! - Keep FFI/CLI layers decoupled from storage details.

pub mod document_service;
pub mod migration_service;
pub mod workspace_service;

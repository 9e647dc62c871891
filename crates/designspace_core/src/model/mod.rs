//! Domain model for design-space projects.
//!
//! # Responsibility
//! - Define registry metadata and per-project document structures.
//! - Keep schema evolution (defaults merge) a pure, storage-free concern.
//!
//! # Invariants
//! - Every project is identified by a stable opaque `ProjectId`.
//! - Any JSON value can be merged into a complete `ProjectStateDocument`.

pub mod document;
pub mod export;
pub mod project;

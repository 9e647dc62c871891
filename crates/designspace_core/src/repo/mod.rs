//! Persistence layer: storage tiers, fail-soft store and registry access.
//!
//! # Responsibility
//! - Define narrow storage contracts independent of any backend.
//! - Provide SQLite and in-memory tier implementations.
//! - Isolate key layout and JSON (de)serialization from services.
//!
//! # Invariants
//! - Storage failures are logged and absorbed in `store`; nothing above
//!   this layer sees a tier error.

pub mod memory_tier;
pub mod registry_repo;
pub mod sqlite_tier;
pub mod store;
pub mod tier;

//! Project registry metadata model.
//!
//! # Responsibility
//! - Define the metadata record kept in the project registry index.
//! - Provide id allocation and timestamp helpers shared by services.
//!
//! # Invariants
//! - `id` is opaque and never reused for another project.
//! - `updated_at` is never earlier than `created_at`.
//!
//! # See also
//! - crate::repo::registry_repo

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Opaque, globally unique project identifier.
///
/// Kept as a `String` because migrated projects carry the literal id
/// `"default"`, which is not a UUID.
pub type ProjectId = String;

/// Identifier assigned to the project created by legacy migration.
pub const DEFAULT_PROJECT_ID: &str = "default";

/// Display name assigned to the project created by legacy migration.
pub const DEFAULT_PROJECT_NAME: &str = "Default";

/// Registry entry describing one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    pub id: ProjectId,
    pub name: String,
    /// Research theme shown in project pickers.
    #[serde(default)]
    pub theme: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Bumped on every persisted save and rename.
    pub updated_at: i64,
}

impl ProjectMeta {
    /// Creates metadata with a freshly allocated id.
    pub fn new(name: impl Into<String>, theme: impl Into<String>) -> Self {
        Self::with_id(new_project_id(), name, theme)
    }

    /// Creates metadata with a caller-provided id.
    ///
    /// Used by migration where the id is fixed (`"default"`).
    pub fn with_id(
        id: impl Into<ProjectId>,
        name: impl Into<String>,
        theme: impl Into<String>,
    ) -> Self {
        let now = now_epoch_ms();
        Self {
            id: id.into(),
            name: name.into(),
            theme: theme.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks this project as modified now.
    pub fn touch(&mut self) {
        self.updated_at = now_epoch_ms().max(self.created_at);
    }
}

/// Allocates a fresh unique project id.
pub fn new_project_id() -> ProjectId {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Falls back to `0` if the clock is before the epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{new_project_id, ProjectMeta};

    #[test]
    fn new_meta_has_matching_timestamps_and_unique_ids() {
        let first = ProjectMeta::new("One", "");
        let second = ProjectMeta::new("Two", "");
        assert_eq!(first.created_at, first.updated_at);
        assert_ne!(first.id, second.id);
        assert_ne!(new_project_id(), new_project_id());
    }

    #[test]
    fn meta_serializes_camel_case() {
        let meta = ProjectMeta::with_id("default", "Default", "harbor");
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["id"], "default");
    }
}

//! Export/import wire format for single projects.
//!
//! # Responsibility
//! - Serialize a project as `{ "meta": ..., "state": ... }` text.
//! - Parse either that shape or a bare state document.
//!
//! # Invariants
//! - Parsed state is always defaults-merged.
//! - Parsing never trusts the imported id; callers allocate a new one.

use crate::model::document::{merge_defaults, ProjectStateDocument};
use crate::model::project::ProjectMeta;
use serde::Serialize;
use serde_json::Value;

/// Serialized project bundle written by export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle<'a> {
    pub meta: &'a ProjectMeta,
    pub state: &'a ProjectStateDocument,
}

impl ExportBundle<'_> {
    /// Renders the bundle as pretty-printed JSON text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Import payload after shape detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPayload {
    /// Name found in imported metadata, if any.
    pub name: Option<String>,
    /// Theme found in imported metadata, if any.
    pub theme: Option<String>,
    pub state: ProjectStateDocument,
}

/// Parses import text in either the bundle shape or the bare document shape.
///
/// # Errors
/// - Returns the JSON parse error message when `text` is not JSON.
/// - Returns an error when the top-level value is not an object.
pub fn parse_import(text: &str) -> Result<ImportPayload, String> {
    let value: Value = serde_json::from_str(text).map_err(|err| err.to_string())?;
    let Some(object) = value.as_object() else {
        return Err("import payload must be a JSON object".to_string());
    };

    if let Some(state) = object.get("state").filter(|state| state.is_object()) {
        let meta = object.get("meta").and_then(Value::as_object);
        let text_field = |key: &str| {
            meta.and_then(|meta| meta.get(key))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        return Ok(ImportPayload {
            name: text_field("name"),
            theme: text_field("theme"),
            state: merge_defaults(state),
        });
    }

    Ok(ImportPayload {
        name: None,
        theme: None,
        state: merge_defaults(&value),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_import, ExportBundle};
    use crate::model::document::ProjectStateDocument;
    use crate::model::project::ProjectMeta;

    #[test]
    fn bundle_shape_round_trips() {
        let meta = ProjectMeta::new("Pavilion", "seaside");
        let state = ProjectStateDocument::with_theme("seaside");
        let text = ExportBundle {
            meta: &meta,
            state: &state,
        }
        .to_json()
        .unwrap();

        let payload = parse_import(&text).unwrap();
        assert_eq!(payload.name.as_deref(), Some("Pavilion"));
        assert_eq!(payload.theme.as_deref(), Some("seaside"));
        assert_eq!(payload.state, state);
    }

    #[test]
    fn bare_document_is_accepted() {
        let payload = parse_import(r#"{"researchTheme":"canal houses"}"#).unwrap();
        assert!(payload.name.is_none());
        assert_eq!(payload.state.research_theme, "canal houses");
    }

    #[test]
    fn blank_meta_fields_are_treated_as_missing() {
        let payload = parse_import(r#"{"meta":{"name":"  "},"state":{}}"#).unwrap();
        assert!(payload.name.is_none());
        assert!(payload.theme.is_none());
    }

    #[test]
    fn non_object_and_invalid_json_are_rejected() {
        assert!(parse_import("[1,2,3]").is_err());
        assert!(parse_import("{not json").is_err());
    }
}

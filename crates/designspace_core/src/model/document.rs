//! Per-project state document model and schema evolution.
//!
//! # Responsibility
//! - Define the full persisted snapshot for one project.
//! - Merge partial or legacy JSON against defaults (`merge_defaults`).
//!
//! # Invariants
//! - Every field has a default, so any JSON value merges into a complete
//!   document.
//! - `research_conditions` holds at most one entry per `ResearchDomain`, in
//!   taxonomy order, with `weight` in `[0, 1]`. Defaults carry the full
//!   taxonomy.
//! - `detail_images` holds one (possibly empty) list per `DetailStage`.
//!
//! # See also
//! - crate::service::document_service

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const DEFAULT_CONDITION_WEIGHT: f64 = 0.5;
const SPECTRUM_POSITION_MAX: f64 = 100.0;

/// Fixed research taxonomy. A document holds at most one condition per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchDomain {
    Site,
    Climate,
    Culture,
    Program,
    Materials,
    Structure,
    Regulation,
}

impl ResearchDomain {
    /// All domains in taxonomy order.
    pub const ALL: [ResearchDomain; 7] = [
        ResearchDomain::Site,
        ResearchDomain::Climate,
        ResearchDomain::Culture,
        ResearchDomain::Program,
        ResearchDomain::Materials,
        ResearchDomain::Structure,
        ResearchDomain::Regulation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Climate => "climate",
            Self::Culture => "culture",
            Self::Program => "program",
            Self::Materials => "materials",
            Self::Structure => "structure",
            Self::Regulation => "regulation",
        }
    }
}

/// Named output categories of the generate/filter workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetailStage {
    Massing,
    Facade,
    Interior,
    Detail,
}

impl DetailStage {
    pub const ALL: [DetailStage; 4] = [
        DetailStage::Massing,
        DetailStage::Facade,
        DetailStage::Interior,
        DetailStage::Detail,
    ];
}

/// Research input for one taxonomy domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchCondition {
    pub domain: ResearchDomain,
    #[serde(default, deserialize_with = "lenient")]
    pub notes: String,
    /// Relative importance in `[0, 1]`.
    #[serde(
        default = "default_condition_weight",
        deserialize_with = "lenient_weight"
    )]
    pub weight: f64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Vec<String>,
}

impl ResearchCondition {
    /// Creates an empty condition for `domain`.
    pub fn empty(domain: ResearchDomain) -> Self {
        Self {
            domain,
            notes: String::new(),
            weight: DEFAULT_CONDITION_WEIGHT,
            tags: Vec::new(),
        }
    }
}

/// One side of a contrasting concept pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConceptDirection {
    #[serde(deserialize_with = "lenient")]
    pub label: String,
    #[serde(deserialize_with = "lenient")]
    pub description: String,
}

/// One axis of a multi-axis concept descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpectrumAxis {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub left_label: String,
    #[serde(deserialize_with = "lenient")]
    pub right_label: String,
    /// Percentage toward `right_label`, in `[0, 100]`.
    #[serde(deserialize_with = "lenient")]
    pub position: f64,
}

/// Structured multi-axis descriptor attached to a concept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpectrumDescriptor {
    #[serde(deserialize_with = "lenient_list")]
    pub axes: Vec<SpectrumAxis>,
}

/// Proposed pair of contrasting design directions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Concept {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub direction_a: ConceptDirection,
    #[serde(deserialize_with = "lenient")]
    pub direction_b: ConceptDirection,
    #[serde(deserialize_with = "lenient")]
    pub spectrum: Option<SpectrumDescriptor>,
}

/// The single concept carried forward into generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefinedConcept {
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub description: String,
    #[serde(deserialize_with = "lenient")]
    pub spectrum: Option<SpectrumDescriptor>,
}

/// Image returned by the generation service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratedImage {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub prompt: String,
    #[serde(deserialize_with = "lenient")]
    pub mime_type: String,
    /// Base64 payload as returned inline by the service.
    #[serde(deserialize_with = "lenient")]
    pub data: String,
    /// Unix epoch milliseconds.
    #[serde(deserialize_with = "lenient_epoch_ms")]
    pub created_at: i64,
    #[serde(deserialize_with = "lenient")]
    pub job_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub selected: bool,
}

/// Batch of generated images sharing one set of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationJob {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient")]
    pub prompt: String,
    #[serde(deserialize_with = "lenient_epoch_ms")]
    pub created_at: i64,
    #[serde(deserialize_with = "lenient")]
    pub aspect_ratio: String,
    /// Free-form generation options forwarded to the service.
    pub options: Value,
    #[serde(deserialize_with = "lenient_list")]
    pub image_ids: Vec<String>,
}

impl Default for GenerationJob {
    fn default() -> Self {
        Self {
            id: String::new(),
            prompt: String::new(),
            created_at: 0,
            aspect_ratio: String::new(),
            options: Value::Object(Map::new()),
            image_ids: Vec::new(),
        }
    }
}

/// Score and comment for one research domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainScore {
    pub domain: ResearchDomain,
    #[serde(default, deserialize_with = "lenient")]
    pub score: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub comment: String,
}

/// One evaluation pass over a generated image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationResult {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(deserialize_with = "lenient_epoch_ms")]
    pub created_at: i64,
    #[serde(deserialize_with = "lenient")]
    pub image_id: Option<String>,
    /// Scores for unknown or malformed domains are skipped.
    #[serde(deserialize_with = "lenient_list")]
    pub domain_scores: Vec<DomainScore>,
    #[serde(deserialize_with = "lenient")]
    pub overall_score: f64,
    #[serde(deserialize_with = "lenient")]
    pub summary: String,
}

/// Atmosphere preferences for image generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Atmosphere {
    #[serde(deserialize_with = "lenient_list")]
    pub selected_presets: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub custom_text: String,
}

/// Full persisted snapshot for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStateDocument {
    pub research_conditions: Vec<ResearchCondition>,
    pub research_theme: String,
    pub concepts: Vec<Concept>,
    pub refined_concept: Option<RefinedConcept>,
    pub scene_constraint: String,
    pub generated_images: Vec<GeneratedImage>,
    pub jobs: Vec<GenerationJob>,
    pub detail_images: BTreeMap<DetailStage, Vec<GeneratedImage>>,
    pub evaluation_results: Vec<EvaluationResult>,
    pub atmosphere: Atmosphere,
}

impl Default for ProjectStateDocument {
    fn default() -> Self {
        Self {
            research_conditions: ResearchDomain::ALL
                .iter()
                .map(|domain| ResearchCondition::empty(*domain))
                .collect(),
            research_theme: String::new(),
            concepts: Vec::new(),
            refined_concept: None,
            scene_constraint: String::new(),
            generated_images: Vec::new(),
            jobs: Vec::new(),
            detail_images: DetailStage::ALL
                .iter()
                .map(|stage| (*stage, Vec::new()))
                .collect(),
            evaluation_results: Vec::new(),
            atmosphere: Atmosphere::default(),
        }
    }
}

impl ProjectStateDocument {
    /// Creates a default document with the research theme pre-filled.
    pub fn with_theme(theme: impl Into<String>) -> Self {
        Self {
            research_theme: theme.into(),
            ..Self::default()
        }
    }

    /// Returns the condition for `domain`.
    pub fn condition(&self, domain: ResearchDomain) -> Option<&ResearchCondition> {
        self.research_conditions
            .iter()
            .find(|condition| condition.domain == domain)
    }

    /// Returns the mutable condition for `domain`.
    pub fn condition_mut(&mut self, domain: ResearchDomain) -> Option<&mut ResearchCondition> {
        self.research_conditions
            .iter_mut()
            .find(|condition| condition.domain == domain)
    }

    /// Serializes this document into a JSON value.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Restores structural invariants after deserialization or mutation.
    pub fn normalize(&mut self) {
        let mut by_domain: BTreeMap<ResearchDomain, ResearchCondition> = BTreeMap::new();
        for condition in self.research_conditions.drain(..) {
            by_domain.entry(condition.domain).or_insert(condition);
        }
        self.research_conditions = by_domain
            .into_values()
            .map(|mut condition| {
                condition.weight = clamp_unit(condition.weight);
                condition.tags = normalize_tags(&condition.tags);
                condition
            })
            .collect();

        for stage in DetailStage::ALL {
            self.detail_images.entry(stage).or_default();
        }

        for concept in &mut self.concepts {
            if let Some(spectrum) = concept.spectrum.as_mut() {
                clamp_spectrum(spectrum);
            }
        }
        if let Some(spectrum) = self
            .refined_concept
            .as_mut()
            .and_then(|refined| refined.spectrum.as_mut())
        {
            clamp_spectrum(spectrum);
        }
    }
}

/// Merges a partial, legacy or malformed JSON value against defaults.
///
/// Fields are overlaid one at a time. A field with an incompatible type keeps
/// its default; list fields keep every element that parses. Unknown fields
/// are dropped. Non-object input yields pure defaults.
pub fn merge_defaults(partial: &Value) -> ProjectStateDocument {
    let mut document = ProjectStateDocument::default();
    let Some(source) = partial.as_object() else {
        return document;
    };

    overlay_list(source, "researchConditions", &mut document.research_conditions);
    overlay_field(source, "researchTheme", &mut document.research_theme);
    overlay_list(source, "concepts", &mut document.concepts);
    overlay_field(source, "refinedConcept", &mut document.refined_concept);
    overlay_field(source, "sceneConstraint", &mut document.scene_constraint);
    overlay_list(source, "generatedImages", &mut document.generated_images);
    overlay_list(source, "jobs", &mut document.jobs);
    overlay_detail_images(source, &mut document.detail_images);
    overlay_list(source, "evaluationResults", &mut document.evaluation_results);
    overlay_field(source, "atmosphere", &mut document.atmosphere);

    document.normalize();
    document
}

/// Normalizes tags: trimmed, lowercase, deduplicated, first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

fn overlay_field<T: DeserializeOwned>(source: &Map<String, Value>, key: &str, slot: &mut T) {
    let Some(value) = source.get(key) else {
        return;
    };
    match T::deserialize(value) {
        Ok(parsed) => *slot = parsed,
        Err(err) => debug!(
            "event=document_merge module=model status=skip field={} error={}",
            key, err
        ),
    }
}

fn overlay_list<T: DeserializeOwned>(source: &Map<String, Value>, key: &str, slot: &mut Vec<T>) {
    let Some(value) = source.get(key) else {
        return;
    };
    let Some(items) = value.as_array() else {
        debug!(
            "event=document_merge module=model status=skip field={} reason=not_array",
            key
        );
        return;
    };
    *slot = parse_elements(key, items);
}

fn overlay_detail_images(
    source: &Map<String, Value>,
    slot: &mut BTreeMap<DetailStage, Vec<GeneratedImage>>,
) {
    let Some(stages) = source.get("detailImages").and_then(Value::as_object) else {
        return;
    };
    for (stage_key, images) in stages {
        let Ok(stage) = DetailStage::deserialize(Value::String(stage_key.clone())) else {
            debug!(
                "event=document_merge module=model status=skip field=detailImages stage={}",
                stage_key
            );
            continue;
        };
        if let Some(items) = images.as_array() {
            slot.insert(stage, parse_elements("detailImages", items));
        }
    }
}

fn parse_elements<T: DeserializeOwned>(key: &str, items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(
                    "event=document_merge module=model status=skip field={} element=invalid error={}",
                    key, err
                );
                None
            }
        })
        .collect()
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_CONDITION_WEIGHT;
    }
    value.clamp(0.0, 1.0)
}

fn clamp_spectrum(spectrum: &mut SpectrumDescriptor) {
    for axis in &mut spectrum.axes {
        axis.position = if axis.position.is_nan() {
            SPECTRUM_POSITION_MAX / 2.0
        } else {
            axis.position.clamp(0.0, SPECTRUM_POSITION_MAX)
        };
    }
}

fn default_condition_weight() -> f64 {
    DEFAULT_CONDITION_WEIGHT
}

// Nested-field deserializers: a malformed or `null` field falls back to its
// default instead of rejecting the enclosing record.

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_weight<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(DEFAULT_CONDITION_WEIGHT))
}

/// Accepts integral and fractional epoch milliseconds; anything else is `0`.
fn lenient_epoch_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|millis| millis.is_finite())
                .map(|millis| millis.trunc() as i64)
        })
        .unwrap_or(0))
}

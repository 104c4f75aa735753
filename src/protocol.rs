//! External Interface (spec §6): the typed operation envelope the stdio
//! transport decodes into and `engine::dispatch` consumes.
//!
//! Grounded on the teacher's own envelope-plus-payload request shape;
//! generalized here to one adjacently-tagged enum per spec's operation
//! table so the binary has zero framing-format knowledge of its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::changelog::EntryKind;
use crate::error::{Error, Result};
use crate::relationships::RelationshipType;
use crate::snapshot::ActiveTask;
use crate::store::ComponentType;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", content = "params", rename_all = "snake_case")]
pub enum Operation {
    IndexGet,
    IndexSearch(IndexSearchParams),

    EntityList,
    EntityGetSoul(EntityIdParams),
    EntityGetFull(EntityIdParams),
    EntityCreate(EntityCreateParams),
    EntityUpdateSoul(EntityUpdateSoulParams),
    EntityLogEvolution(EntityLogEvolutionParams),

    ComponentList(ComponentListParams),
    ComponentCreate(ComponentCreateParams),
    ComponentLoad(ScopeKeyParams),
    ComponentUnload(ScopeKeyParams),
    SummaryGet(ScopeKeyParams),
    SummaryUpdate(SummaryUpdateParams),
    SummaryVerify(ScopeKeyParams),

    ChangelogRecord(ChangelogRecordParams),
    ChangelogQuery(ChangelogQueryParams),
    ValidateWrite(ValidateWriteParams),

    ScratchWrite(ScratchWriteParams),
    ScratchRead(ScratchReadParams),
    ScratchPromote(ScratchPromoteParams),

    SnapshotSave(SnapshotSaveParams),
    SnapshotRead,

    RelationshipGet(EntityIdParams),
    RelationshipUpdateProfile(RelationshipUpdateProfileParams),
    RelationshipLogInteraction(RelationshipLogInteractionParams),
    RelationshipUpdateTrust(RelationshipUpdateTrustParams),

    RawSearch(RawSearchParams),
    SearchReindex,
    SearchStatus,

    DecayPreview(DecayPreviewParams),
    DecayPin(DecayPinParams),

    SystemList,
    SystemExecute(SystemExecuteParams),
    SystemStatus(SystemStatusParams),
    SystemConfigure(SystemConfigureParams),

    ConfigGet(ConfigGetParams),
    ConfigUpdate(ConfigUpdateParams),
    ConfigReference(ConfigReferenceParams),

    OnboardingStatus,
    OnboardingInit(OnboardingInitParams),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexSearchParams {
    pub query: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityIdParams {
    pub entity_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityCreateParams {
    pub entity_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub soul_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityUpdateSoulParams {
    pub entity_id: String,
    pub content: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityLogEvolutionParams {
    pub entity_id: String,
    pub change_summary: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentListParams {
    #[serde(default, rename = "type")]
    pub ty: Option<ComponentType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentCreateParams {
    #[serde(rename = "type")]
    pub ty: ComponentType,
    pub key: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeKeyParams {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryUpdateParams {
    pub key: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangelogRecordParams {
    pub scope: String,
    #[serde(default, rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub alternatives: Option<Vec<crate::changelog::Alternative>>,
    pub summary: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub validate: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangelogQueryParams {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<EntryKind>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateWriteParams {
    pub scope: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: crate::validator::WriteKind,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScratchWriteParams {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScratchReadParams {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub include_yesterday: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub include_promoted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScratchPromoteParams {
    pub scratch_id: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotSaveParams {
    pub current_focus: String,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub active_tasks: Option<Vec<ActiveTask>>,
    #[serde(default)]
    pub blockers: Option<Vec<String>>,
    #[serde(default)]
    pub recent_decisions: Option<Vec<String>>,
    #[serde(default)]
    pub context_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipUpdateProfileParams {
    pub entity_id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<RelationshipType>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub expertise: Option<Vec<String>>,
    #[serde(default)]
    pub language_pref: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipLogInteractionParams {
    pub entity_id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipUpdateTrustParams {
    pub entity_id: String,
    pub delta: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchParams {
    pub query: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecayPreviewParams {
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecayPinParams {
    pub entry_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemExecuteParams {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStatusParams {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfigureParams {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigGetParams {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigUpdateParams {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigReferenceParams {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnboardingInitParams {
    #[serde(default)]
    pub skip_agents: Option<Vec<String>>,
}

/// Round-trips a wire JSON value through `toml::Value` for config writes,
/// the document format every config/state file on disk actually uses.
pub fn json_to_toml(value: Value) -> Result<toml::Value> {
    serde_json::from_value(value).map_err(|e| {
        Error::InvalidArgument(format!("value is not representable in the config document: {e}"))
    })
}

/// Wire reply shape (spec §6): "a human-readable text payload and an
/// `is_error` flag." The transport collaborator owns framing; this is the
/// payload it wraps.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub is_error: bool,
    pub text: String,
}

impl Envelope {
    pub fn ok(result: Value) -> Self {
        Self { is_error: false, text: render_text(&result) }
    }

    pub fn err(error: &Error) -> Self {
        Self { is_error: true, text: error.to_string() }
    }
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_envelope() {
        let raw = r#"{"op":"entity_get_soul","params":{"entity_id":"claude"}}"#;
        let op: Operation = serde_json::from_str(raw).unwrap();
        assert!(matches!(op, Operation::EntityGetSoul(p) if p.entity_id == "claude"));
    }

    #[test]
    fn decodes_unit_variant_without_params() {
        let raw = r#"{"op":"system_list"}"#;
        let op: Operation = serde_json::from_str(raw).unwrap();
        assert!(matches!(op, Operation::SystemList));
    }

    #[test]
    fn json_to_toml_preserves_scalars() {
        let value = json_to_toml(serde_json::json!(45)).unwrap();
        assert_eq!(value, toml::Value::Integer(45));
    }
}

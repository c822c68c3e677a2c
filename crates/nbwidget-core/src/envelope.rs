//! Model envelopes: the validated description of one widget model.
//!
//! A state provider answers with a loosely-typed [`ModelState`]; every field
//! is optional so malformed input reaches validation instead of failing
//! deserialization. [`ModelEnvelope::from_state`] turns it into a checked
//! envelope or an [`InvalidSpecError`].

use crate::error::InvalidSpecError;
use semver::VersionReq;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Prefix marking a string state value as a reference to another model.
pub const MODEL_REFERENCE_PREFIX: &str = "IPY_MODEL_";

/// State keys that carry the model's module/view identity.
pub const IDENTITY_KEYS: [&str; 6] = [
    "_model_module",
    "_model_module_version",
    "_model_name",
    "_view_module",
    "_view_module_version",
    "_view_name",
];

/// Unique identifier of a widget model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse an `IPY_MODEL_<id>` reference.
    pub fn from_reference(value: &str) -> Option<Self> {
        value
            .strip_prefix(MODEL_REFERENCE_PREFIX)
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }

    /// Format this id as an `IPY_MODEL_<id>` reference.
    pub fn to_reference(&self) -> String {
        format!("{MODEL_REFERENCE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ModelId> for ModelId {
    fn from(id: &ModelId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for ModelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ModelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Raw answer of a state provider for one model id.
///
/// Serialized camelCase; the snake_case keys of notebook widget-state
/// entries are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    #[serde(default, alias = "model_module")]
    pub model_module: Option<String>,
    #[serde(default, alias = "model_name")]
    pub model_name: Option<String>,
    #[serde(default, alias = "model_module_version")]
    pub model_module_version: Option<String>,
    #[serde(default)]
    pub state: Option<Value>,
}

/// A module name with the version requirement it was requested at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    name: String,
    version: String,
    requirement: VersionReq,
}

impl ModuleSpec {
    /// Build a spec, parsing `version` as a semver requirement (`^2.1.0`,
    /// `~0.19`, `2.x`, `*`, ...).
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, InvalidSpecError> {
        Self::parse(name.into(), version.into(), "modelModuleVersion")
    }

    fn parse(name: String, version: String, field: &'static str) -> Result<Self, InvalidSpecError> {
        let requirement =
            VersionReq::parse(version.trim()).map_err(|e| InvalidSpecError::InvalidVersion {
                field,
                version: version.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name,
            version,
            requirement,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version requirement as written in the state.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub const fn requirement(&self) -> &VersionReq {
        &self.requirement
    }
}

impl fmt::Display for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// The view a model asks to be rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSpec {
    pub module: ModuleSpec,
    pub name: String,
}

/// Validated module/view identity plus the initial state payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEnvelope {
    model_module: ModuleSpec,
    model_name: String,
    view: Option<ViewSpec>,
    state: Map<String, Value>,
}

impl ModelEnvelope {
    /// Validate a provider answer.
    ///
    /// The view is optional here: models such as layouts or scene graph
    /// nodes exist only to be referenced. Rendering requires one, see
    /// [`ModelEnvelope::require_view`].
    pub fn from_state(raw: ModelState) -> Result<Self, InvalidSpecError> {
        let module_name = non_empty(raw.model_module, "modelModule")?;
        let module_version = non_empty(raw.model_module_version, "modelModuleVersion")?;
        let model_name = non_empty(raw.model_name, "modelName")?;

        let state = match raw.state {
            None | Some(Value::Null) => return Err(InvalidSpecError::MissingField("state")),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(InvalidSpecError::StateNotObject),
        };

        let model_module = ModuleSpec::parse(module_name, module_version, "modelModuleVersion")?;
        let view = Self::view_from_state(&state, &model_module)?;

        Ok(Self {
            model_module,
            model_name,
            view,
            state,
        })
    }

    fn view_from_state(
        state: &Map<String, Value>,
        model_module: &ModuleSpec,
    ) -> Result<Option<ViewSpec>, InvalidSpecError> {
        let Some(name) = optional_string(state, "_view_name")? else {
            return Ok(None);
        };
        let module_name = optional_string(state, "_view_module")?;
        let module_version = optional_string(state, "_view_module_version")?;

        let module = match (module_name, module_version) {
            (None, None) => model_module.clone(),
            (name_override, version_override) => ModuleSpec::parse(
                name_override.unwrap_or_else(|| model_module.name.clone()),
                version_override.unwrap_or_else(|| model_module.version.clone()),
                "_view_module_version",
            )?,
        };
        Ok(Some(ViewSpec { module, name }))
    }

    pub const fn model_module(&self) -> &ModuleSpec {
        &self.model_module
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub const fn view(&self) -> Option<&ViewSpec> {
        self.view.as_ref()
    }

    /// The view, or [`InvalidSpecError::MissingField`] for `_view_name`.
    pub fn require_view(&self) -> Result<&ViewSpec, InvalidSpecError> {
        self.view
            .as_ref()
            .ok_or(InvalidSpecError::MissingField("_view_name"))
    }

    /// The state payload as returned by the provider.
    pub const fn state(&self) -> &Map<String, Value> {
        &self.state
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, InvalidSpecError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(InvalidSpecError::MissingField(field)),
    }
}

/// A state key that must be a string when present. Null and `""` count as absent.
fn optional_string(
    state: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, InvalidSpecError> {
    match state.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(InvalidSpecError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

/// Collect every `IPY_MODEL_` reference in a state value, depth first, without duplicates.
pub fn collect_references(value: &Value) -> Vec<ModelId> {
    fn walk(value: &Value, out: &mut Vec<ModelId>) {
        match value {
            Value::String(s) => {
                if let Some(id) = ModelId::from_reference(s) {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

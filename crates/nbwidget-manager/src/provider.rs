//! State providers: where model envelopes come from.
//!
//! The embedding environment supplies a [`StateProvider`]. For static
//! documents, [`NotebookStateProvider`] reads the widget state a notebook
//! stores in its metadata.

use futures_util::future::{self, FutureExt, LocalBoxFuture};
use nbwidget_core::{ModelId, ModelState, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// MIME type under which notebooks store widget state.
pub const WIDGET_STATE_MIMETYPE: &str = "application/vnd.jupyter.widget-state+json";

/// Source of truth for model envelopes.
///
/// Must fail with [`ProviderError::UnknownModel`] for ids it does not know.
pub trait StateProvider {
    fn get_model_state<'a>(
        &'a self,
        model_id: &'a ModelId,
    ) -> LocalBoxFuture<'a, Result<ModelState, ProviderError>>;
}

/// One model as stored in notebook widget state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_module_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl From<NotebookEntry> for ModelState {
    fn from(entry: NotebookEntry) -> Self {
        Self {
            model_module: entry.model_module,
            model_name: entry.model_name,
            model_module_version: entry.model_module_version,
            state: entry.state,
        }
    }
}

/// Errors reading notebook widget state.
#[derive(Debug, Error)]
pub enum NotebookStateError {
    #[error("widget state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read widget state from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("widget state must be a JSON object")]
    NotAnObject,

    #[error("unsupported widget state version {0} (expected 2)")]
    UnsupportedVersion(u64),

    #[error("entry `{id}` is malformed: {reason}")]
    MalformedEntry { id: String, reason: String },
}

/// Provider backed by notebook widget state.
///
/// Accepts either the full `application/vnd.jupyter.widget-state+json`
/// document (`{"version_major": 2, "state": {...}}`) or a bare map of
/// model id to entry.
#[derive(Debug, Clone, Default)]
pub struct NotebookStateProvider {
    entries: BTreeMap<ModelId, NotebookEntry>,
}

impl NotebookStateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, NotebookStateError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NotebookStateError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| NotebookStateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn from_value(value: Value) -> Result<Self, NotebookStateError> {
        let Value::Object(mut root) = value else {
            return Err(NotebookStateError::NotAnObject);
        };

        let entries = if let Some(version) = root.get("version_major") {
            let version = version.as_u64().unwrap_or(0);
            if version != 2 {
                return Err(NotebookStateError::UnsupportedVersion(version));
            }
            match root.remove("state") {
                Some(Value::Object(entries)) => entries,
                _ => return Err(NotebookStateError::NotAnObject),
            }
        } else {
            root
        };

        let mut provider = Self::new();
        for (id, entry) in entries {
            provider.insert(id.clone(), Self::parse_entry(&id, entry)?);
        }
        Ok(provider)
    }

    fn parse_entry(id: &str, entry: Value) -> Result<NotebookEntry, NotebookStateError> {
        if !entry.is_object() {
            return Err(NotebookStateError::MalformedEntry {
                id: id.to_string(),
                reason: "entry must be an object".to_string(),
            });
        }
        serde_json::from_value(entry).map_err(|e| NotebookStateError::MalformedEntry {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn insert(&mut self, id: impl Into<ModelId>, entry: NotebookEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &ModelId) -> Option<&NotebookEntry> {
        self.entries.get(id)
    }

    /// Model ids in sorted order.
    pub fn model_ids(&self) -> Vec<ModelId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to the notebook document format.
    pub fn to_document(&self) -> Value {
        let state: Map<String, Value> = self
            .entries
            .iter()
            .map(|(id, entry)| {
                (
                    id.to_string(),
                    serde_json::to_value(entry).unwrap_or(Value::Null),
                )
            })
            .collect();
        serde_json::json!({
            "version_major": 2,
            "version_minor": 0,
            "state": state,
        })
    }

    fn lookup(&self, model_id: &ModelId) -> Result<ModelState, ProviderError> {
        self.entries
            .get(model_id)
            .cloned()
            .map(ModelState::from)
            .ok_or_else(|| ProviderError::UnknownModel(model_id.clone()))
    }
}

impl StateProvider for NotebookStateProvider {
    fn get_model_state<'a>(
        &'a self,
        model_id: &'a ModelId,
    ) -> LocalBoxFuture<'a, Result<ModelState, ProviderError>> {
        future::ready(self.lookup(model_id)).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_bare_map_format() {
        let provider = NotebookStateProvider::from_value(json!({
            "abc": {
                "model_module": "jupyter-leaflet",
                "model_name": "LeafletMapModel",
                "model_module_version": "^0.19",
                "state": { "_view_name": "LeafletMapView" }
            }
        }))
        .unwrap();

        let state = provider
            .get_model_state(&ModelId::new("abc"))
            .await
            .unwrap();
        assert_eq!(state.model_module.as_deref(), Some("jupyter-leaflet"));
        assert_eq!(state.model_name.as_deref(), Some("LeafletMapModel"));
        assert_eq!(state.model_module_version.as_deref(), Some("^0.19"));
    }

    #[tokio::test]
    async fn test_unknown_model_fails() {
        let provider = NotebookStateProvider::new();
        let err = provider
            .get_model_state(&ModelId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::UnknownModel(ModelId::new("missing")));
    }

    #[tokio::test]
    async fn test_entry_without_fields_is_served_as_is() {
        let provider = NotebookStateProvider::from_value(json!({ "123": { "state": {} } })).unwrap();
        let state = provider
            .get_model_state(&ModelId::new("123"))
            .await
            .unwrap();
        assert_eq!(state.model_module, None);
        assert_eq!(state.state, Some(json!({})));
    }

    #[test]
    fn test_document_format() {
        let provider = NotebookStateProvider::from_json_str(
            r#"{
                "version_major": 2,
                "version_minor": 0,
                "state": {
                    "m1": { "model_module": "a", "model_name": "B", "model_module_version": "1.0.0", "state": {} }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(provider.model_ids(), vec![ModelId::new("m1")]);
    }

    #[test]
    fn test_document_roundtrip() {
        let mut provider = NotebookStateProvider::new();
        provider.insert(
            "m1",
            NotebookEntry {
                model_module: Some("a".to_string()),
                state: Some(json!({ "x": 1 })),
                ..NotebookEntry::default()
            },
        );
        let again = NotebookStateProvider::from_value(provider.to_document()).unwrap();
        assert_eq!(again.get(&ModelId::new("m1")), provider.get(&ModelId::new("m1")));
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let err = NotebookStateProvider::from_value(json!({ "version_major": 1, "state": {} }))
            .unwrap_err();
        assert!(matches!(err, NotebookStateError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_rejects_non_object_entries() {
        assert!(matches!(
            NotebookStateProvider::from_value(json!({ "x": 3 })),
            Err(NotebookStateError::MalformedEntry { .. })
        ));
        assert!(matches!(
            NotebookStateProvider::from_value(json!([])),
            Err(NotebookStateError::NotAnObject)
        ));
        assert!(matches!(
            NotebookStateProvider::from_json_str("{"),
            Err(NotebookStateError::Json(_))
        ));
    }

    #[test]
    fn test_mimetype_constant() {
        assert_eq!(
            WIDGET_STATE_MIMETYPE,
            "application/vnd.jupyter.widget-state+json"
        );
    }
}

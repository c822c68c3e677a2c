//! Widget-state fixtures.
//!
//! Notebook widget state captured from a three.js scene and a leaflet map,
//! embedded at compile time.

use nbwidget_core::{ModelId, ModelState};
use nbwidget_manager::{NotebookEntry, NotebookStateError, NotebookStateProvider};
use serde_json::json;
use thiserror::Error;

/// Widget state of a pythreejs renderer viewing a scene with a mesh and a light.
pub const THREEJS_STATE: &str = include_str!("../fixtures/jupyter_threejs_state.json");

/// Widget state of an ipyleaflet map with a tile layer and a marker.
pub const LEAFLET_STATE: &str = include_str!("../fixtures/leaflet_state.json");

/// The renderer model (`RendererView`) in [`THREEJS_STATE`].
pub const THREEJS_RENDERER_ID: &str = "pythree_example_model_007";

/// The scene model (`SceneView`) in [`THREEJS_STATE`].
pub const THREEJS_SCENE_ID: &str = "pythree_example_model_005";

/// The map model (`LeafletMapView`) in [`LEAFLET_STATE`].
pub const LEAFLET_MAP_ID: &str = "34baf5762f2344e19200892a8efafc27";

/// An entry with an empty state and nothing else, added by [`Fixture::all`].
pub const EMPTY_MODEL_ID: &str = "123";

/// Fixture loading errors.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture `{name}` is not valid widget state: {source}")]
    Parse {
        name: &'static str,
        #[source]
        source: NotebookStateError,
    },

    #[error("no fixture named `{0}` (expected threejs, leaflet or all)")]
    Unknown(String),
}

/// Named widget-state fixtures.
pub struct Fixture;

impl Fixture {
    fn parse(name: &'static str, json: &str) -> Result<NotebookStateProvider, FixtureError> {
        NotebookStateProvider::from_json_str(json).map_err(|source| FixtureError::Parse { name, source })
    }

    pub fn threejs() -> Result<NotebookStateProvider, FixtureError> {
        Self::parse("threejs", THREEJS_STATE)
    }

    pub fn leaflet() -> Result<NotebookStateProvider, FixtureError> {
        Self::parse("leaflet", LEAFLET_STATE)
    }

    /// Both fixtures plus the empty entry [`EMPTY_MODEL_ID`].
    pub fn all() -> Result<NotebookStateProvider, FixtureError> {
        let mut provider = Self::threejs()?;
        let leaflet = Self::leaflet()?;
        for id in leaflet.model_ids() {
            if let Some(entry) = leaflet.get(&id) {
                provider.insert(id, entry.clone());
            }
        }
        provider.insert(EMPTY_MODEL_ID, empty_entry());
        Ok(provider)
    }

    pub fn by_name(name: &str) -> Result<NotebookStateProvider, FixtureError> {
        match name {
            "threejs" => Self::threejs(),
            "leaflet" => Self::leaflet(),
            "all" => Self::all(),
            other => Err(FixtureError::Unknown(other.to_string())),
        }
    }
}

/// `{ "state": {} }`: no module, no version, no view.
pub fn empty_entry() -> NotebookEntry {
    NotebookEntry {
        state: Some(json!({})),
        ..NotebookEntry::default()
    }
}

/// A fully specified envelope, for tests that build their own state.
pub fn model_state(
    module: &str,
    version: &str,
    model_name: &str,
    state: serde_json::Value,
) -> ModelState {
    ModelState {
        model_module: Some(module.to_string()),
        model_name: Some(model_name.to_string()),
        model_module_version: Some(version.to_string()),
        state: Some(state),
    }
}

/// `IPY_MODEL_<id>`.
pub fn reference(id: &str) -> String {
    ModelId::new(id).to_reference()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threejs_fixture() {
        let provider = Fixture::threejs().unwrap();
        assert_eq!(provider.len(), 6);
        let renderer = provider.get(&ModelId::new(THREEJS_RENDERER_ID)).unwrap();
        assert_eq!(renderer.model_name.as_deref(), Some("RendererModel"));
        assert_eq!(renderer.model_module_version.as_deref(), Some("2.x"));
    }

    #[test]
    fn test_leaflet_fixture() {
        let provider = Fixture::leaflet().unwrap();
        assert_eq!(provider.len(), 4);
        assert!(provider.get(&ModelId::new(LEAFLET_MAP_ID)).is_some());
    }

    #[test]
    fn test_all_merges() {
        let provider = Fixture::all().unwrap();
        assert_eq!(provider.len(), 11);
        assert_eq!(
            provider.get(&ModelId::new(EMPTY_MODEL_ID)),
            Some(&empty_entry())
        );
    }

    #[test]
    fn test_by_name() {
        assert!(Fixture::by_name("leaflet").is_ok());
        assert!(matches!(
            Fixture::by_name("bokeh"),
            Err(FixtureError::Unknown(name)) if name == "bokeh"
        ));
    }

    #[test]
    fn test_reference() {
        assert_eq!(reference("abc"), "IPY_MODEL_abc");
    }
}

//! Rendering the reference widgets through a real manager.

use nbwidget_core::{ModelId, RenderError, RenderPhase};
use nbwidget_manager::{ManagerConfig, WidgetManager};
use nbwidget_test::{
    model_state, reference, FakeState, Fixture, MountHarness, LEAFLET_MAP_ID,
    THREEJS_RENDERER_ID, THREEJS_SCENE_ID,
};
use nbwidget_widgets::builtin_registry;
use serde_json::json;

fn manager(state: &FakeState) -> WidgetManager {
    WidgetManager::with_registry(state.clone(), ManagerConfig::default(), builtin_registry())
}

#[tokio::test]
async fn test_renderer_view() {
    let state = FakeState::new(Fixture::threejs().unwrap());
    let manager = manager(&state);
    let harness = MountHarness::new();

    let view = manager
        .render(THREEJS_RENDERER_ID, harness.container())
        .await
        .unwrap();

    harness
        .assert_exists(".jupyter-threejs canvas")
        .assert_count("canvas", 1);
    let canvas = harness.query("canvas").unwrap();
    assert_eq!(canvas.attribute("width").as_deref(), Some("400"));
    assert_eq!(canvas.attribute("height").as_deref(), Some("300"));
    assert_eq!(
        canvas.attribute("data-scene").as_deref(),
        Some(THREEJS_SCENE_ID)
    );
    assert_eq!(canvas.attribute("data-objects").as_deref(), Some("2"));
    assert_eq!(
        view.element().attribute("style").as_deref(),
        Some("width: 400px; height: 300px")
    );

    // renderer, scene, camera and layout; the scene's children are not needed
    assert_eq!(state.lookup_count(), 4);
    assert_eq!(manager.module_load_count(), 2);
}

#[tokio::test]
async fn test_scene_view_resolves_children() {
    let state = FakeState::new(Fixture::threejs().unwrap());
    let manager = manager(&state);
    let harness = MountHarness::new();

    manager
        .render(THREEJS_SCENE_ID, harness.container())
        .await
        .unwrap();

    let canvas = harness.query(".jupyter-threejs > canvas").unwrap();
    assert_eq!(canvas.attribute("data-objects").as_deref(), Some("2"));
    assert_eq!(canvas.attribute("data-background").as_deref(), Some("#ffffff"));
    assert!(manager.has_model(&ModelId::new("pythree_example_model_003")));
}

#[tokio::test]
async fn test_renderer_resize_follows_state() {
    let state = FakeState::new(Fixture::threejs().unwrap());
    let manager = manager(&state);
    let harness = MountHarness::new();

    let view = manager
        .render(THREEJS_RENDERER_ID, harness.container())
        .await
        .unwrap();
    view.model()
        .unwrap()
        .set_state(json!({ "_width": 800 }))
        .unwrap();

    let canvas = harness.query("canvas").unwrap();
    assert_eq!(canvas.attribute("width").as_deref(), Some("800"));
    assert_eq!(canvas.dispatch_event("pointerdown"), 1);
    assert!(canvas.has_class("jupyter-threejs-dragging"));
}

#[tokio::test]
async fn test_renderer_without_camera() {
    let state = FakeState::default();
    state.insert(
        "renderer",
        model_state(
            "jupyter-threejs",
            "2.x",
            "RendererModel",
            json!({ "_view_name": "RendererView", "scene": reference("scene") }),
        ),
    );
    state.insert(
        "scene",
        model_state("jupyter-threejs", "2.x", "SceneModel", json!({ "children": [] })),
    );
    let manager = manager(&state);
    let harness = MountHarness::with_placeholder();
    let before = harness.snapshot();

    let err = manager
        .render("renderer", harness.container())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), RenderPhase::ConstructView);
    assert!(err.to_string().contains("camera"));
    harness.assert_unchanged(&before);
}

#[tokio::test]
async fn test_leaflet_map() {
    let state = FakeState::new(Fixture::leaflet().unwrap());
    let manager = manager(&state);
    let harness = MountHarness::new();

    manager
        .render(LEAFLET_MAP_ID, harness.container())
        .await
        .unwrap();

    harness
        .assert_exists("div.leaflet-widgets")
        .assert_exists("div.leaflet-widgets > div.leaflet-container[data-zoom='9']")
        .assert_count(".leaflet-layer", 2)
        .assert_count(".leaflet-marker", 1);
    let map = harness.query(".leaflet-container").unwrap();
    assert_eq!(
        map.attribute("data-center").as_deref(),
        Some("52.204793,0.121558")
    );
    assert_eq!(map.attribute("style").as_deref(), Some("height: 400px"));
}

const TILE_LAYER_ID: &str = "6fa0c5a2d4cb4f0ab2d6a7d1c1b0e9f3";
const MARKER_ID: &str = "9d3e2c7b1a0f4e6d8c5b4a3f2e1d0c9b";

#[tokio::test]
async fn test_leaflet_layers_follow_state() {
    let state = FakeState::new(Fixture::leaflet().unwrap());
    let manager = manager(&state);
    let harness = MountHarness::new();

    let view = manager
        .render(LEAFLET_MAP_ID, harness.container())
        .await
        .unwrap();
    let map = view.model().unwrap();

    map.set_state(json!({ "layers": [reference(MARKER_ID)] }))
        .unwrap();
    harness
        .assert_count(".leaflet-layer", 1)
        .assert_count(".leaflet-marker", 1);

    map.set_state(json!({ "layers": [reference(MARKER_ID), reference(TILE_LAYER_ID)] }))
        .unwrap();
    let layers = harness.query_all(".leaflet-layer");
    let ids: Vec<_> = layers
        .iter()
        .map(|layer| layer.attribute("data-model-id").unwrap_or_default())
        .collect();
    assert_eq!(ids, vec![MARKER_ID, TILE_LAYER_ID]);

    // A layer the manager never built is left out.
    map.set_state(json!({ "layers": [reference("not-built")] }))
        .unwrap();
    harness
        .assert_count(".leaflet-layer", 0)
        .assert_count(".leaflet-container", 1);
}

#[tokio::test]
async fn test_leaflet_map_with_legacy_base_layout() {
    let state = FakeState::default();
    state.insert(
        "layout",
        model_state(
            "@jupyter-widgets/base",
            "1.2.0",
            "LayoutModel",
            json!({ "_view_name": "LayoutView", "height": "250px" }),
        ),
    );
    state.insert(
        "map",
        model_state(
            "jupyter-leaflet",
            "^0.19",
            "LeafletMapModel",
            json!({ "_view_name": "LeafletMapView", "layout": reference("layout") }),
        ),
    );
    let manager = manager(&state);
    let harness = MountHarness::new();

    manager.render("map", harness.container()).await.unwrap();
    let map = harness.query(".leaflet-container").unwrap();
    assert_eq!(map.attribute("style").as_deref(), Some("height: 250px"));
}

#[tokio::test]
async fn test_leaflet_rejects_bad_center() {
    let state = FakeState::default();
    state.insert(
        "map",
        model_state(
            "jupyter-leaflet",
            "^0.19",
            "LeafletMapModel",
            json!({ "_view_name": "LeafletMapView", "center": [200, 0] }),
        ),
    );
    let manager = manager(&state);
    let harness = MountHarness::new();

    let err = manager.render("map", harness.container()).await.unwrap_err();
    assert!(matches!(
        err,
        RenderError::InvalidSpec {
            phase: RenderPhase::ConstructModel,
            ..
        }
    ));
    harness.assert_not_exists("div");
}

#[tokio::test]
async fn test_standalone_marker() {
    let state = FakeState::new(Fixture::leaflet().unwrap());
    let manager = manager(&state);
    let harness = MountHarness::new();

    manager
        .render("9d3e2c7b1a0f4e6d8c5b4a3f2e1d0c9b", harness.container())
        .await
        .unwrap();
    harness.assert_exists(".leaflet-widgets > .leaflet-layer.leaflet-marker");
}

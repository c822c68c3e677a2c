//! End-to-end rendering of notebook widget state through the public API.

#![cfg(not(target_arch = "wasm32"))]

use futures_util::future::join;
use nbwidget::{
    check_notebook, create_widget_manager, create_widget_manager_with_config, describe,
    manager_from_notebook_json, ManagerConfig, ModelId, ModelState, RenderError, RenderPhase,
    WidgetManager,
};
use nbwidget_test::{
    FakeState, Fixture, GatedState, MountHarness, EMPTY_MODEL_ID, LEAFLET_MAP_ID, LEAFLET_STATE,
    THREEJS_RENDERER_ID, THREEJS_SCENE_ID,
};
use serde_json::json;

fn manager(state: &FakeState) -> WidgetManager {
    create_widget_manager(state.clone())
}

fn notebook_state() -> FakeState {
    FakeState::new(Fixture::all().unwrap())
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_threejs_scene_renders_canvas() {
    let manager = manager(&notebook_state());
    let harness = MountHarness::new();

    manager
        .render(THREEJS_SCENE_ID, harness.container())
        .await
        .unwrap();

    harness
        .assert_exists("canvas")
        .assert_count(".jupyter-widgets", 1);
    assert_eq!(harness.container().child_count(), 1);
}

#[tokio::test]
async fn test_leaflet_map_renders_container_div() {
    let manager = manager(&notebook_state());
    let harness = MountHarness::new();

    manager
        .render(LEAFLET_MAP_ID, harness.container())
        .await
        .unwrap();

    harness
        .assert_exists("div.leaflet-widgets")
        .assert_count("div.leaflet-container", 1)
        .assert_not_exists("canvas");
    assert_eq!(harness.container().child_count(), 1);
}

#[tokio::test]
async fn test_empty_state_rejects_with_invalid_spec() {
    let manager = manager(&notebook_state());
    let harness = MountHarness::with_placeholder();
    let before = harness.snapshot();

    let err = manager
        .render(EMPTY_MODEL_ID, harness.container())
        .await
        .unwrap_err();

    assert!(err.is_invalid_spec());
    assert_eq!(err.model_id().as_str(), EMPTY_MODEL_ID);
    assert_eq!(err.phase(), RenderPhase::Validate);
    harness.assert_unchanged(&before);
    assert!(!manager.has_model(&ModelId::new(EMPTY_MODEL_ID)));
}

// =============================================================================
// Rendering properties
// =============================================================================

#[tokio::test]
async fn test_distinct_ids_into_distinct_containers() {
    let manager = manager(&notebook_state().yielding(2));
    let scene = MountHarness::new();
    let map = MountHarness::new();

    let (a, b) = join(
        manager.render(THREEJS_SCENE_ID, scene.container()),
        manager.render(LEAFLET_MAP_ID, map.container()),
    )
    .await;
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.container().as_ref(), Some(scene.container()));
    assert_eq!(b.container().as_ref(), Some(map.container()));
    scene
        .assert_exists("canvas")
        .assert_not_exists(".leaflet-container");
    map.assert_exists(".leaflet-container").assert_not_exists("canvas");
}

#[tokio::test]
async fn test_same_model_twice_shares_instance() {
    let state = notebook_state().yielding(1);
    let manager = manager(&state);
    let first = MountHarness::new();
    let second = MountHarness::new();

    let (a, b) = join(
        manager.render(THREEJS_RENDERER_ID, first.container()),
        manager.render(THREEJS_RENDERER_ID, second.container()),
    )
    .await;
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(std::rc::Rc::ptr_eq(&a.model().unwrap(), &b.model().unwrap()));
    first.assert_count("canvas", 1);
    second.assert_count("canvas", 1);
    assert_eq!(manager.views_of(&ModelId::new(THREEJS_RENDERER_ID)).len(), 2);

    a.model()
        .unwrap()
        .set_state(json!({ "_width": 640 }))
        .unwrap();
    for harness in [&first, &second] {
        let canvas = harness.query("canvas").unwrap();
        assert_eq!(canvas.attribute("width").as_deref(), Some("640"));
    }
}

#[tokio::test]
async fn test_container_removed_while_lookup_pending() {
    let (state, gate) = GatedState::new(notebook_state());
    let manager = create_widget_manager(state.clone());
    let harness = MountHarness::with_placeholder();
    let before = harness.snapshot();

    let unmount = async {
        tokio::task::yield_now().await;
        harness.detach();
        gate.open();
    };
    let (result, ()) = join(manager.render(LEAFLET_MAP_ID, harness.container()), unmount).await;

    assert!(matches!(result, Err(RenderError::ContainerDetached { .. })));
    harness.assert_unchanged(&before);
    assert_eq!(harness.listener_count(), 0);
    assert_eq!(manager.view_count(), 0);
    // The model itself was built and stays available for the next render.
    assert!(manager.has_model(&ModelId::new(LEAFLET_MAP_ID)));

    harness.reattach();
    manager
        .render(LEAFLET_MAP_ID, harness.container())
        .await
        .unwrap();
    harness.assert_exists(".leaflet-container");
}

#[tokio::test]
async fn test_detached_container_accepted_when_configured() {
    let manager = create_widget_manager_with_config(
        notebook_state(),
        ManagerConfig::default().with_connected_container(false),
    );
    let harness = MountHarness::new();
    harness.detach();

    manager
        .render(THREEJS_SCENE_ID, harness.container())
        .await
        .unwrap();
    harness.assert_exists("canvas");
}

#[tokio::test]
async fn test_provider_failure_names_model_and_phase() {
    let state = notebook_state();
    state.fail(LEAFLET_MAP_ID, "connection reset");
    let manager = manager(&state);
    let harness = MountHarness::new();

    let err = manager
        .render(LEAFLET_MAP_ID, harness.container())
        .await
        .unwrap_err();
    assert_eq!(err.phase(), RenderPhase::Lookup);
    assert_eq!(err.model_id().as_str(), LEAFLET_MAP_ID);
    assert!(err.to_string().contains("connection reset"));
    harness.assert_not_exists("div");
}

#[tokio::test]
async fn test_unknown_module_is_module_resolution() {
    let state = FakeState::default();
    state.insert(
        "slider",
        ModelState {
            model_module: Some("@jupyter-widgets/controls".to_string()),
            model_name: Some("IntSliderModel".to_string()),
            model_module_version: Some("2.0.0".to_string()),
            state: Some(json!({ "_view_name": "IntSliderView" })),
        },
    );
    let manager = manager(&state);
    let harness = MountHarness::new();

    let err = manager.render("slider", harness.container()).await.unwrap_err();
    assert!(matches!(err, RenderError::ModuleResolution { .. }));
    assert_eq!(harness.container().child_count(), 0);
}

#[tokio::test]
async fn test_dispose_unmounts_every_view() {
    let manager = manager(&notebook_state());
    let scene = MountHarness::new();
    let map = MountHarness::new();
    manager
        .render(THREEJS_SCENE_ID, scene.container())
        .await
        .unwrap();
    manager
        .render(LEAFLET_MAP_ID, map.container())
        .await
        .unwrap();

    manager.dispose();

    assert_eq!(scene.container().child_count(), 0);
    assert_eq!(map.container().child_count(), 0);
    assert_eq!(scene.listener_count(), 0);
    let err = manager
        .render(THREEJS_SCENE_ID, scene.container())
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::ManagerDisposed { .. }));
}

// =============================================================================
// Helpers
// =============================================================================

#[tokio::test]
async fn test_check_notebook_reports_broken_models() {
    let provider = Fixture::all().unwrap();
    let ids = provider.model_ids();
    let manager = create_widget_manager(provider);

    let failures = check_notebook(&manager, &ids).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].model_id().as_str(), EMPTY_MODEL_ID);
    assert_eq!(manager.model_ids().len(), ids.len() - 1);
}

#[tokio::test]
async fn test_manager_from_notebook_json() {
    let manager = manager_from_notebook_json(LEAFLET_STATE).unwrap();
    let harness = MountHarness::new();
    manager
        .render(LEAFLET_MAP_ID, harness.container())
        .await
        .unwrap();
    assert!(manager_from_notebook_json("{ not json").is_err());
}

#[test]
fn test_describe_envelope() {
    let described = describe(&ModelState {
        model_module: Some("jupyter-leaflet".to_string()),
        model_name: Some("LeafletMapModel".to_string()),
        model_module_version: Some("^0.19".to_string()),
        state: Some(json!({ "_view_name": "LeafletMapView" })),
    });
    assert_eq!(described["view"], "LeafletMapView");
    assert_eq!(described["version"], "^0.19");
    assert_eq!(describe(&ModelState::default())["view"], json!(null));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn envelope() -> impl Strategy<Value = ModelState> {
        (
            proptest::option::of(prop_oneof![
                Just("jupyter-threejs".to_string()),
                Just("jupyter-leaflet".to_string()),
            ]),
            proptest::option::of("[A-Za-z]{1,12}Model"),
            proptest::option::of(prop_oneof![Just("2.x".to_string()), Just("^0.19".to_string())]),
            proptest::option::of(Just(json!({}))),
        )
            .prop_map(|(model_module, model_name, model_module_version, state)| ModelState {
                model_module,
                model_name,
                model_module_version,
                state,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn incomplete_envelopes_leave_container_untouched(state in envelope()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let provider = FakeState::default();
                provider.insert("candidate", state);
                let manager = create_widget_manager(provider);
                let harness = MountHarness::with_placeholder();
                let before = harness.snapshot();

                // No envelope above names a view, so none can render.
                let err = manager.render("candidate", harness.container()).await.unwrap_err();
                prop_assert!(err.phase() != RenderPhase::Mount);
                harness.assert_unchanged(&before);
                prop_assert_eq!(manager.view_count(), 0);
                Ok(())
            })?;
        }
    }
}

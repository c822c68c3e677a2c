//! `jupyter-leaflet`: interactive map widgets.
//!
//! A map renders as `div.leaflet-widgets > div.leaflet-container`, with one
//! `div.leaflet-layer` per layer the map references. No tiles are fetched.

use crate::base::apply_layout;
use crate::construction_failed;
use futures_util::future::{FutureExt, LocalBoxFuture};
use nbwidget_core::{
    collect_references, Element, InvalidSpecError, ModelInstance, Version,
    ViewConstructionError, WidgetView,
};
use nbwidget_manager::{ModelLookup, ViewContext, WidgetModule};
use serde_json::Value;

pub const MODULE_NAME: &str = "jupyter-leaflet";

/// Class on the scoped element of every leaflet view.
pub const ROOT_CLASS: &str = "leaflet-widgets";

/// Class of the element holding the map panes.
pub const CONTAINER_CLASS: &str = "leaflet-container";

pub const LAYER_CLASS: &str = "leaflet-layer";

/// `[lat, lng]`, validated.
fn lat_lng(value: &Value) -> Option<(f64, f64)> {
    let [lat, lng] = value.as_array()?.as_slice() else {
        return None;
    };
    let (lat, lng) = (lat.as_f64()?, lng.as_f64()?);
    ((-90.0..=90.0).contains(&lat) && lng.is_finite()).then_some((lat, lng))
}

fn format_lat_lng(value: &Value) -> Option<String> {
    lat_lng(value).map(|(lat, lng)| format!("{lat},{lng}"))
}

fn check_lat_lng(model: &ModelInstance, key: &str) -> Result<(), InvalidSpecError> {
    match model.get(key) {
        None | Some(Value::Null) => Ok(()),
        Some(value) if lat_lng(&value).is_some() => Ok(()),
        Some(value) => Err(InvalidSpecError::Rejected {
            module: MODULE_NAME.to_string(),
            reason: format!("`{key}` must be [lat, lng] with lat in [-90, 90], got {value}"),
        }),
    }
}

fn set_view_attributes(map: &Element, model: &ModelInstance) {
    match model.get("center").as_ref().and_then(format_lat_lng) {
        Some(center) => map.set_attribute("data-center", center),
        None => {
            map.remove_attribute("data-center");
        }
    }
    match model.get("zoom") {
        Some(Value::Number(zoom)) => map.set_attribute("data-zoom", zoom.to_string()),
        _ => {
            map.remove_attribute("data-zoom");
        }
    }
}

/// Marker element for one layer model.
fn layer_element(layer: &ModelInstance) -> Element {
    let element = Element::new("div");
    element.add_class(LAYER_CLASS);
    element.set_attribute("data-model-id", layer.id().as_str());
    element.set_attribute("data-kind", layer.model_name());
    if let Some(url) = layer.get_str("url") {
        element.set_attribute("data-url", url);
    }
    if let Some(location) = layer.get("location").as_ref().and_then(format_lat_lng) {
        element.add_class("leaflet-marker");
        element.set_attribute("data-location", location);
    }
    element
}

struct MapView {
    map: Element,
    lookup: ModelLookup,
}

impl MapView {
    /// Rebuild the layer elements from the current `layers` list.
    ///
    /// Updates are synchronous, so only layers the manager has already built
    /// can be drawn; the rest are skipped until the next change.
    fn sync_layers(&self, model: &ModelInstance) {
        for child in self.map.children() {
            if child.has_class(LAYER_CLASS) {
                self.map.remove_child(&child);
            }
        }
        let ids = model.get("layers").map(|layers| collect_references(&layers)).unwrap_or_default();
        for id in ids {
            let Some(layer) = self.lookup.ready(&id) else {
                tracing::debug!(model_id = %model.id(), layer = %id, "layer not built, skipped");
                continue;
            };
            if let Err(err) = self.map.append_child(&layer_element(&layer)) {
                tracing::warn!(model_id = %model.id(), layer = %id, error = %err, "layer not attached");
            }
        }
    }
}

impl WidgetView for MapView {
    fn update(&mut self, model: &ModelInstance, changed: &[String]) {
        if changed.iter().any(|key| key == "center" || key == "zoom") {
            set_view_attributes(&self.map, model);
        }
        if changed.iter().any(|key| key == "layers") {
            self.sync_layers(model);
        }
    }
}

struct LayerView {
    element: Element,
}

impl WidgetView for LayerView {
    fn update(&mut self, model: &ModelInstance, changed: &[String]) {
        if changed.iter().any(|key| key == "location") {
            if let Some(location) = model.get("location").as_ref().and_then(format_lat_lng) {
                self.element.set_attribute("data-location", location);
            }
        }
        if changed.iter().any(|key| key == "url") {
            if let Some(url) = model.get_str("url") {
                self.element.set_attribute("data-url", url);
            }
        }
    }
}

/// The `jupyter-leaflet` module.
#[derive(Debug)]
pub struct LeafletModule {
    version: Version,
}

impl LeafletModule {
    pub const fn new() -> Self {
        Self {
            version: Version::new(0, 19, 2),
        }
    }

    async fn build_map(ctx: ViewContext, view_name: String) -> Result<Box<dyn WidgetView>, ViewConstructionError> {
        let root = ctx.element().clone();
        root.add_class(ROOT_CLASS);

        let map = Element::new("div");
        map.add_class(CONTAINER_CLASS);
        set_view_attributes(&map, ctx.model());
        apply_layout(&ctx, &map).await?;

        for layer in ctx.resolve_state_references("layers").await? {
            map.append_child(&layer_element(&layer))
                .map_err(|e| construction_failed(&view_name, e))?;
        }
        root.append_child(&map)
            .map_err(|e| construction_failed(&view_name, e))?;

        tracing::debug!(
            model_id = %ctx.model().id(),
            layers = map.child_count(),
            "leaflet map ready"
        );
        Ok(Box::new(MapView {
            map,
            lookup: ctx.lookup(),
        }) as Box<dyn WidgetView>)
    }

    async fn build_layer(ctx: ViewContext, view_name: String) -> Result<Box<dyn WidgetView>, ViewConstructionError> {
        let root = ctx.element().clone();
        root.add_class(ROOT_CLASS);
        let element = layer_element(ctx.model());
        root.append_child(&element)
            .map_err(|e| construction_failed(&view_name, e))?;
        Ok(Box::new(LayerView { element }) as Box<dyn WidgetView>)
    }
}

impl Default for LeafletModule {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetModule for LeafletModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn view_names(&self) -> &[&'static str] {
        &["LeafletMapView", "LeafletTileLayerView", "LeafletMarkerView"]
    }

    fn hydrate(&self, model: &ModelInstance) -> Result<(), InvalidSpecError> {
        check_lat_lng(model, "center")?;
        check_lat_lng(model, "location")?;
        match model.get("zoom") {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Number(n)) if n.as_f64().is_some_and(|z| z >= 0.0) => Ok(()),
            Some(other) => Err(InvalidSpecError::Rejected {
                module: MODULE_NAME.to_string(),
                reason: format!("`zoom` must be a non-negative number, got {other}"),
            }),
        }
    }

    fn create_view(
        &self,
        view_name: &str,
        ctx: ViewContext,
    ) -> LocalBoxFuture<'static, Result<Box<dyn WidgetView>, ViewConstructionError>> {
        let view_name = view_name.to_string();
        if view_name == "LeafletMapView" {
            Self::build_map(ctx, view_name).boxed_local()
        } else {
            Self::build_layer(ctx, view_name).boxed_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbwidget_core::{ModelEnvelope, ModelState};
    use proptest::prelude::*;
    use serde_json::json;

    fn model(name: &str, state: Value) -> ModelInstance {
        let envelope = ModelEnvelope::from_state(ModelState {
            model_module: Some(MODULE_NAME.to_string()),
            model_name: Some(name.to_string()),
            model_module_version: Some("^0.19.2".to_string()),
            state: Some(state),
        })
        .unwrap();
        ModelInstance::new("m".into(), envelope)
    }

    #[test]
    fn test_lat_lng() {
        assert_eq!(lat_lng(&json!([52.2, 4.9])), Some((52.2, 4.9)));
        assert_eq!(lat_lng(&json!([91, 0])), None);
        assert_eq!(lat_lng(&json!([1, 2, 3])), None);
        assert_eq!(lat_lng(&json!("52,4")), None);
        assert_eq!(format_lat_lng(&json!([51.5, -0.09])).as_deref(), Some("51.5,-0.09"));
    }

    #[test]
    fn test_hydrate() {
        let module = LeafletModule::new();
        assert!(module
            .hydrate(&model("LeafletMapModel", json!({ "center": [0, 0], "zoom": 3 })))
            .is_ok());
        assert!(module
            .hydrate(&model("LeafletMapModel", json!({ "center": [120, 0] })))
            .is_err());
        assert!(module
            .hydrate(&model("LeafletMapModel", json!({ "zoom": "far" })))
            .is_err());
        assert!(module
            .hydrate(&model("LeafletMarkerModel", json!({ "location": [10, 10] })))
            .is_ok());
    }

    #[test]
    fn test_layer_element() {
        let tiles = model(
            "LeafletTileLayerModel",
            json!({ "url": "https://tile.example.org/{z}/{x}/{y}.png" }),
        );
        let element = layer_element(&tiles);
        assert!(element.has_class(LAYER_CLASS));
        assert!(!element.has_class("leaflet-marker"));
        assert_eq!(element.attribute("data-kind").as_deref(), Some("LeafletTileLayerModel"));

        let marker = model("LeafletMarkerModel", json!({ "location": [1.5, 2] }));
        let element = layer_element(&marker);
        assert!(element.has_class("leaflet-marker"));
        assert_eq!(element.attribute("data-location").as_deref(), Some("1.5,2"));
    }

    #[test]
    fn test_map_update_moves_view() {
        let m = model("LeafletMapModel", json!({ "center": [0, 0], "zoom": 2 }));
        m.mark_ready();
        let map = Element::new("div");
        set_view_attributes(&map, &m);
        let mut view = MapView {
            map: map.clone(),
            lookup: ModelLookup::default(),
        };

        let changed = m.set_state(json!({ "zoom": 9, "center": [48.8, 2.3] })).unwrap();
        view.update(&m, &changed);
        assert_eq!(map.attribute("data-zoom").as_deref(), Some("9"));
        assert_eq!(map.attribute("data-center").as_deref(), Some("48.8,2.3"));
    }

    #[test]
    fn test_map_without_manager_drops_layers() {
        let m = model("LeafletMapModel", json!({ "layers": [] }));
        m.mark_ready();
        let map = Element::new("div");
        map.append_child(&layer_element(&model("LeafletTileLayerModel", json!({}))))
            .unwrap();
        let mut view = MapView {
            map: map.clone(),
            lookup: ModelLookup::default(),
        };

        let changed = m
            .set_state(json!({ "layers": ["IPY_MODEL_tiles"] }))
            .unwrap();
        view.update(&m, &changed);
        assert_eq!(map.child_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_valid_latitudes_accepted(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
            prop_assert_eq!(lat_lng(&json!([lat, lng])), Some((lat, lng)));
        }

        #[test]
        fn prop_out_of_range_latitudes_rejected(lat in 90.001f64..1e6, lng in -180.0f64..=180.0) {
            prop_assert_eq!(lat_lng(&json!([lat, lng])), None);
            prop_assert_eq!(lat_lng(&json!([-lat, lng])), None);
        }
    }
}

//! `jupyter-threejs`: 3D scene widgets.
//!
//! The views lay out the structure a WebGL host expects (a `canvas` inside a
//! `.jupyter-threejs` root, sized from `_width` / `_height`) and resolve the
//! scene graph references, but do not rasterize anything.

use crate::base::apply_layout;
use crate::construction_failed;
use futures_util::future::{FutureExt, LocalBoxFuture};
use nbwidget_core::{
    Element, InvalidSpecError, ModelInstance, Version, ViewConstructionError, WidgetView,
};
use nbwidget_manager::{ViewContext, WidgetModule};
use serde_json::Value;

pub const MODULE_NAME: &str = "jupyter-threejs";

/// Class on the scoped element of every three.js view.
pub const ROOT_CLASS: &str = "jupyter-threejs";

/// Class toggled on the canvas while a pointer is held down on it.
pub const DRAGGING_CLASS: &str = "jupyter-threejs-dragging";

/// Canvas size when the model does not set one.
pub const DEFAULT_CANVAS_SIZE: u32 = 200;

const SIZE_KEYS: [(&str, &str); 2] = [("_width", "width"), ("_height", "height")];

/// A canvas dimension as an attribute value.
fn dimension(model: &ModelInstance, key: &str) -> String {
    match model.get(key) {
        Some(Value::Number(n)) if n.as_u64().is_some() => n.to_string(),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map_or_else(|| DEFAULT_CANVAS_SIZE.to_string(), |v| v.round().to_string()),
        _ => DEFAULT_CANVAS_SIZE.to_string(),
    }
}

fn size_canvas(canvas: &Element, model: &ModelInstance) {
    for (key, attribute) in SIZE_KEYS {
        canvas.set_attribute(attribute, dimension(model, key));
    }
}

fn bind_pointer(canvas: &Element) {
    let weak = canvas.downgrade();
    canvas.add_event_listener("pointerdown", move |_| {
        if let Some(canvas) = weak.upgrade() {
            canvas.add_class(DRAGGING_CLASS);
        }
    });
    let weak = canvas.downgrade();
    canvas.add_event_listener("pointerup", move |_| {
        if let Some(canvas) = weak.upgrade() {
            canvas.remove_class(DRAGGING_CLASS);
        }
    });
}

/// A view drawing into one canvas.
struct CanvasView {
    canvas: Element,
}

impl WidgetView for CanvasView {
    fn update(&mut self, model: &ModelInstance, changed: &[String]) {
        if changed.iter().any(|key| key == "_width" || key == "_height") {
            size_canvas(&self.canvas, model);
        }
        if changed.iter().any(|key| key == "background") {
            match model.get_str("background") {
                Some(color) => self.canvas.set_attribute("data-background", color),
                None => {
                    self.canvas.remove_attribute("data-background");
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.canvas.remove_class(DRAGGING_CLASS);
    }
}

/// The `jupyter-threejs` module.
#[derive(Debug)]
pub struct ThreeJsModule {
    version: Version,
}

impl ThreeJsModule {
    pub const fn new() -> Self {
        Self {
            version: Version::new(2, 4, 1),
        }
    }

    async fn build(ctx: ViewContext, view_name: String) -> Result<Box<dyn WidgetView>, ViewConstructionError> {
        let root = ctx.element().clone();
        let model = ctx.model();
        root.add_class(ROOT_CLASS);

        let canvas = Element::new("canvas");
        size_canvas(&canvas, model);
        if let Some(color) = model.get_str("background") {
            canvas.set_attribute("data-background", color);
        }

        match view_name.as_str() {
            "RendererView" => {
                let scene = ctx.resolve_state_reference("scene").await?;
                let camera = ctx.resolve_state_reference("camera").await?;
                let (Some(scene), Some(camera)) = (scene, camera) else {
                    return Err(ViewConstructionError::InvalidState {
                        view_name,
                        reason: "a renderer needs both `scene` and `camera`".to_string(),
                    });
                };
                canvas.set_attribute("data-scene", scene.id().as_str());
                canvas.set_attribute("data-camera", camera.id().as_str());
                canvas.set_attribute("data-objects", scene.references().len().to_string());
            }
            "SceneView" => {
                let children = ctx.resolve_state_references("children").await?;
                canvas.set_attribute("data-objects", children.len().to_string());
            }
            _ => {
                if let Some(child) = ctx.resolve_state_reference("child").await? {
                    canvas.set_attribute("data-child", child.id().as_str());
                }
            }
        }

        apply_layout(&ctx, &root).await?;
        bind_pointer(&canvas);
        root.append_child(&canvas)
            .map_err(|e| construction_failed(&view_name, e))?;

        tracing::debug!(model_id = %model.id(), view = %view_name, "three.js canvas ready");
        Ok(Box::new(CanvasView { canvas }) as Box<dyn WidgetView>)
    }
}

impl Default for ThreeJsModule {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetModule for ThreeJsModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn view_names(&self) -> &[&'static str] {
        &["RendererView", "PreviewView", "SceneView"]
    }

    fn hydrate(&self, model: &ModelInstance) -> Result<(), InvalidSpecError> {
        for (key, _) in SIZE_KEYS {
            match model.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) if n.as_f64().is_some_and(|v| v >= 0.0) => {}
                Some(other) => {
                    return Err(InvalidSpecError::Rejected {
                        module: MODULE_NAME.to_string(),
                        reason: format!("`{key}` must be a non-negative number, got {other}"),
                    });
                }
            }
        }
        match model.get("children") {
            None | Some(Value::Null | Value::Array(_)) => Ok(()),
            Some(_) => Err(InvalidSpecError::Rejected {
                module: MODULE_NAME.to_string(),
                reason: "`children` must be a list of object references".to_string(),
            }),
        }
    }

    fn create_view(
        &self,
        view_name: &str,
        ctx: ViewContext,
    ) -> LocalBoxFuture<'static, Result<Box<dyn WidgetView>, ViewConstructionError>> {
        Self::build(ctx, view_name.to_string()).boxed_local()
    }
}

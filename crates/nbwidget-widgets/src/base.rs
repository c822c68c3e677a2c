//! `@jupyter-widgets/base`: layout and style models shared by every widget.
//!
//! These models are never rendered on their own in practice; other widgets
//! reference them through their `layout` / `style` keys and apply them to
//! their root element with [`apply_layout`].

use futures_util::future::{FutureExt, LocalBoxFuture};
use nbwidget_core::{Element, ModelInstance, Version, ViewConstructionError, WidgetView};
use nbwidget_manager::{ViewContext, WidgetModule};
use serde_json::Value;

pub const MODULE_NAME: &str = "@jupyter-widgets/base";

/// Layout keys that map onto CSS properties, in output order.
pub const LAYOUT_PROPERTIES: &[&str] = &[
    "width",
    "height",
    "min_width",
    "min_height",
    "max_width",
    "max_height",
    "margin",
    "padding",
    "border",
    "display",
    "overflow",
    "visibility",
];

/// CSS declarations for a layout model, e.g. `width: 100%; height: 400px`.
///
/// Returns `None` when the layout sets nothing.
pub fn layout_style(layout: &ModelInstance) -> Option<String> {
    let declarations: Vec<String> = LAYOUT_PROPERTIES
        .iter()
        .filter_map(|key| {
            let value = match layout.get(key)? {
                Value::String(s) if !s.trim().is_empty() => s,
                Value::Number(n) => format!("{n}px"),
                _ => return None,
            };
            Some(format!("{}: {value}", key.replace('_', "-")))
        })
        .collect();
    (!declarations.is_empty()).then(|| declarations.join("; "))
}

/// Resolve the view model's `layout` reference and apply it to `element`.
///
/// The style is applied once, at construction.
pub async fn apply_layout(ctx: &ViewContext, element: &Element) -> Result<(), ViewConstructionError> {
    if let Some(layout) = ctx.resolve_state_reference("layout").await? {
        if let Some(style) = layout_style(&layout) {
            element.set_attribute("style", style);
        }
    }
    Ok(())
}

/// Renders a layout or style model as a bare element carrying the styles.
struct StyleHolder {
    element: Element,
}

impl WidgetView for StyleHolder {
    fn update(&mut self, model: &ModelInstance, _changed: &[String]) {
        match layout_style(model) {
            Some(style) => self.element.set_attribute("style", style),
            None => {
                self.element.remove_attribute("style");
            }
        }
    }
}

/// Protocol versions the base models are served under. Notebooks saved by
/// ipywidgets 7 reference `1.x`, ipywidgets 8 references `2.x`.
pub const VERSIONS: [Version; 2] = [Version::new(1, 2, 0), Version::new(2, 0, 0)];

/// The `@jupyter-widgets/base` module.
#[derive(Debug)]
pub struct BaseModule {
    version: Version,
}

impl BaseModule {
    /// The module at its current (`2.0.0`) version.
    pub const fn new() -> Self {
        Self::with_version(Version::new(2, 0, 0))
    }

    pub const fn with_version(version: Version) -> Self {
        Self { version }
    }
}

impl Default for BaseModule {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetModule for BaseModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn view_names(&self) -> &[&'static str] {
        &["LayoutView", "StyleView"]
    }

    fn create_view(
        &self,
        _view_name: &str,
        ctx: ViewContext,
    ) -> LocalBoxFuture<'static, Result<Box<dyn WidgetView>, ViewConstructionError>> {
        async move {
            let element = ctx.element().clone();
            let mut holder = StyleHolder { element };
            holder.update(ctx.model(), &[]);
            Ok(Box::new(holder) as Box<dyn WidgetView>)
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbwidget_core::{ModelEnvelope, ModelState};
    use serde_json::json;

    fn layout(state: Value) -> ModelInstance {
        let envelope = ModelEnvelope::from_state(ModelState {
            model_module: Some(MODULE_NAME.to_string()),
            model_name: Some("LayoutModel".to_string()),
            model_module_version: Some("2.0.0".to_string()),
            state: Some(state),
        })
        .unwrap();
        ModelInstance::new("layout".into(), envelope)
    }

    #[test]
    fn test_layout_style_orders_and_skips_nulls() {
        let model = layout(json!({
            "height": "400px",
            "width": "100%",
            "margin": null,
            "min_height": 120,
            "_view_name": "LayoutView"
        }));
        assert_eq!(
            layout_style(&model).as_deref(),
            Some("width: 100%; height: 400px; min-height: 120px")
        );
    }

    #[test]
    fn test_base_versions() {
        assert_eq!(BaseModule::new().version(), &VERSIONS[1]);
        let legacy = BaseModule::with_version(VERSIONS[0].clone());
        assert_eq!(legacy.version().to_string(), "1.2.0");
        assert_eq!(legacy.view_names(), BaseModule::new().view_names());
    }

    #[test]
    fn test_empty_layout_has_no_style() {
        assert_eq!(layout_style(&layout(json!({ "width": "" }))), None);
        assert_eq!(layout_style(&layout(json!({}))), None);
    }
}

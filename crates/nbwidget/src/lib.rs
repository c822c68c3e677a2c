//! nbwidget: render notebook widgets from serialized model state.
//!
//! A [`WidgetManager`] asks a [`StateProvider`] for a model's envelope,
//! loads the matching widget module, builds the model and a view bound to
//! it, and mounts the view into a container element. Failures reject with a
//! [`RenderError`] and never leave partial content behind.
//!
//! ```ignore
//! use nbwidget::{create_widget_manager, Document, NotebookStateProvider};
//!
//! let provider = NotebookStateProvider::from_path("widgets.json")?;
//! let manager = create_widget_manager(provider);
//!
//! let document = Document::new();
//! let container = document.create_element("div");
//! document.body().append_child(&container)?;
//! let view = manager.render("34baf5762f2344e19200892a8efafc27", &container).await?;
//! println!("{}", view.element().to_html());
//! ```
//!
//! # Browser Usage (WASM)
//!
//! ```javascript
//! import init, { BrowserWidgetManager } from './nbwidget.js';
//!
//! await init();
//! const manager = new BrowserWidgetManager({ getModelState: async (id) => state[id] });
//! await manager.render(modelId, element);
//! ```

pub use nbwidget_core::*;
pub use nbwidget_manager::*;
pub use nbwidget_widgets as widgets;

#[cfg(target_arch = "wasm32")]
pub mod browser;

#[cfg(target_arch = "wasm32")]
pub use browser::{mirror_into, BrowserWidgetManager, JsStateProvider};

/// A manager with every reference widget module registered.
pub fn create_widget_manager(provider: impl StateProvider + 'static) -> WidgetManager {
    create_widget_manager_with_config(provider, ManagerConfig::default())
}

pub fn create_widget_manager_with_config(
    provider: impl StateProvider + 'static,
    config: ManagerConfig,
) -> WidgetManager {
    let manager = WidgetManager::with_registry(provider, config, widgets::builtin_registry());
    let modules = manager.with_module_registry(|registry| registry.module_names().join(", "));
    tracing::debug!(%modules, "widget manager created");
    manager
}

/// Parse notebook widget state from a JSON string and wrap it in a manager.
pub fn manager_from_notebook_json(json: &str) -> Result<WidgetManager, NotebookStateError> {
    let provider = NotebookStateProvider::from_json_str(json)?;
    Ok(create_widget_manager(provider))
}

/// Resolve each of `model_ids` without rendering it, collecting the failures.
///
/// Every envelope is validated and every module it names is loaded, so a
/// clean result means each model can be built.
pub async fn check_notebook(
    manager: &WidgetManager,
    model_ids: &[ModelId],
) -> Vec<RenderError> {
    let mut failures = Vec::new();
    for id in model_ids {
        if let Err(err) = manager.get_model(id.clone()).await {
            failures.push(err);
        }
    }
    failures
}

/// The envelope fields of `state`, as shown by listings.
pub fn describe(state: &ModelState) -> serde_json::Value {
    let view_name = state
        .state
        .as_ref()
        .and_then(|s| s.get("_view_name"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    serde_json::json!({
        "module": state.model_module,
        "version": state.model_module_version,
        "model": state.model_name,
        "view": view_name,
    })
}

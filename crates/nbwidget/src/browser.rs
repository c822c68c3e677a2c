//! Browser bridge for WASM builds.
//!
//! Views render into an in-memory [`Document`]; once mounted, the view's
//! element tree is mirrored into the page under the caller's container.

use crate::{
    create_widget_manager, Document, Element, ModelId, ModelState, ProviderError, RenderError,
    StateProvider, ViewHandle, WidgetManager,
};
use futures_util::future::{FutureExt, LocalBoxFuture};
use js_sys::{Function, Object, Promise, Reflect};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

/// State provider backed by a JS object with a `getModelState(id)` method.
///
/// The method may return the state directly or a promise of it; `null` and
/// `undefined` mean the id is unknown.
#[derive(Debug, Clone)]
pub struct JsStateProvider {
    target: Object,
}

impl JsStateProvider {
    pub const fn new(target: Object) -> Self {
        Self { target }
    }

    async fn lookup(&self, model_id: &ModelId) -> Result<ModelState, ProviderError> {
        let method: Function = Reflect::get(&self.target, &JsValue::from_str("getModelState"))
            .map_err(js_failure)?
            .dyn_into()
            .map_err(|_| ProviderError::Failed("getModelState is not a function".to_string()))?;

        let answer = method
            .call1(&self.target, &JsValue::from_str(model_id.as_str()))
            .map_err(js_failure)?;
        let value = JsFuture::from(Promise::resolve(&answer))
            .await
            .map_err(js_failure)?;
        if value.is_null() || value.is_undefined() {
            return Err(ProviderError::UnknownModel(model_id.clone()));
        }

        let json: String = js_sys::JSON::stringify(&value).map_err(js_failure)?.into();
        serde_json::from_str(&json).map_err(|e| ProviderError::Failed(e.to_string()))
    }
}

impl StateProvider for JsStateProvider {
    fn get_model_state<'a>(
        &'a self,
        model_id: &'a ModelId,
    ) -> LocalBoxFuture<'a, Result<ModelState, ProviderError>> {
        self.lookup(model_id).boxed_local()
    }
}

fn js_failure(value: JsValue) -> ProviderError {
    ProviderError::Failed(
        value
            .as_string()
            .unwrap_or_else(|| format!("{value:?}")),
    )
}

/// Copy `element` and its subtree into the page under `target`.
///
/// Returns the page element mirroring `element`. Event listeners are not
/// copied.
pub fn mirror_into(element: &Element, target: &web_sys::Element) -> Result<web_sys::Element, JsValue> {
    let document = target
        .owner_document()
        .ok_or("container has no owner document")?;
    let mirrored = mirror(&document, element)?;
    target.append_child(&mirrored)?;
    Ok(mirrored)
}

fn mirror(document: &web_sys::Document, element: &Element) -> Result<web_sys::Element, JsValue> {
    let out = document.create_element(element.tag())?;
    let classes = element.classes();
    if !classes.is_empty() {
        out.set_attribute("class", &classes.join(" "))?;
    }
    for (name, value) in element.attributes() {
        out.set_attribute(&name, &value)?;
    }
    if let Some(text) = element.text() {
        out.set_text_content(Some(&text));
    }
    for child in element.children() {
        out.append_child(&mirror(document, &child)?)?;
    }
    Ok(out)
}

/// A JS `Error` whose `name` is the failure kind and whose message is the
/// full error text.
fn render_error_to_js(err: &RenderError) -> JsValue {
    let kind = match err {
        RenderError::StateUnavailable { .. } => "StateUnavailable",
        RenderError::InvalidSpec { .. } => "InvalidSpec",
        RenderError::ModuleResolution { .. } => "ModuleResolution",
        RenderError::ViewConstruction { .. } => "ViewConstruction",
        RenderError::ContainerDetached { .. } => "ContainerDetached",
        RenderError::Mount { .. } => "Mount",
        RenderError::ModelReleased { .. } => "ModelReleased",
        RenderError::ManagerDisposed { .. } => "ManagerDisposed",
    };
    let error = js_sys::Error::new(&err.to_string());
    error.set_name(kind);
    error.into()
}

/// A rendered view together with the nodes the bridge created for it.
struct MountedView {
    view: ViewHandle,
    /// Holder of the view's in-memory element under the bridge document.
    mount: Element,
    /// Mirror of the view's element in the page.
    page: web_sys::Element,
}

impl MountedView {
    fn remove(self) {
        self.view.unmount();
        self.mount.remove();
        self.page.remove();
    }
}

/// Widget manager exported to JavaScript.
#[wasm_bindgen]
pub struct BrowserWidgetManager {
    manager: WidgetManager,
    document: Document,
    mounted: Rc<RefCell<Vec<MountedView>>>,
}

#[wasm_bindgen]
impl BrowserWidgetManager {
    /// Create a manager that reads state through `provider.getModelState`.
    #[wasm_bindgen(constructor)]
    pub fn new(provider: Object) -> Self {
        console_error_panic_hook::set_once();
        Self {
            manager: create_widget_manager(JsStateProvider::new(provider)),
            document: Document::new(),
            mounted: Rc::default(),
        }
    }

    /// Render `model_id` into `container`.
    ///
    /// Resolves with the mirrored root element, or rejects with an `Error`
    /// named after the failure kind (`InvalidSpec`, `ModuleResolution`, ...).
    pub fn render(&self, model_id: String, container: web_sys::Element) -> Promise {
        let manager = self.manager.clone();
        let document = self.document.clone();
        let mounted = Rc::clone(&self.mounted);
        future_to_promise(async move {
            let mount = document.create_element("div");
            document
                .body()
                .append_child(&mount)
                .map_err(|e| JsValue::from_str(&e.to_string()))?;

            let result = manager.render(model_id.as_str(), &mount).await;
            let view = match result {
                Ok(view) => view,
                Err(err) => {
                    mount.remove();
                    return Err(render_error_to_js(&err));
                }
            };

            if manager.config().require_connected_container && !container.is_connected() {
                view.unmount();
                mount.remove();
                return Err(render_error_to_js(&RenderError::ContainerDetached {
                    model_id: ModelId::new(model_id),
                }));
            }
            let page = match mirror_into(view.element(), &container) {
                Ok(page) => page,
                Err(err) => {
                    view.unmount();
                    mount.remove();
                    return Err(err);
                }
            };
            mounted.borrow_mut().push(MountedView {
                view,
                mount,
                page: page.clone(),
            });
            Ok(page.into())
        })
    }

    /// Release `model_id` and remove every page subtree rendered for it.
    #[wasm_bindgen(js_name = "releaseModel")]
    pub fn release_model(&self, model_id: &str) -> bool {
        let model_id = ModelId::new(model_id);
        let released = self.manager.release_model(&model_id);
        let views: Vec<MountedView> = {
            let mut mounted = self.mounted.borrow_mut();
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *mounted)
                .into_iter()
                .partition(|m| m.view.model_id() == &model_id);
            *mounted = kept;
            gone
        };
        for view in views {
            view.remove();
        }
        released
    }

    /// Number of views currently mirrored into the page.
    #[wasm_bindgen(js_name = "viewCount")]
    pub fn view_count(&self) -> usize {
        self.mounted.borrow().len()
    }

    pub fn dispose(&self) {
        self.manager.dispose();
        let views = std::mem::take(&mut *self.mounted.borrow_mut());
        for view in views {
            view.remove();
        }
    }
}

/// Initialize panic hook for better error messages.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

//! The widget manager: state lookup, module resolution, model and view
//! construction, and mounting.
//!
//! A `render` call runs its phases strictly in order:
//!
//! ```text
//! lookup → validate → resolve-module → construct-model → construct-view → mount
//! ```
//!
//! The view renders into a detached scoped element that is appended to the
//! caller's container only in the final step, after the manager has checked
//! that the container is still connected and that the model and manager are
//! still live. A failure anywhere leaves the container's children untouched.

use crate::config::ManagerConfig;
use crate::context::ViewContext;
use crate::provider::StateProvider;
use crate::resolver::{ModuleLoader, ModuleRegistry, ModuleResolver, WidgetModule};
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use nbwidget_core::{
    Element, InvalidSpecError, ModelEnvelope, ModelId, ModelInstance, ModelLifecycle, RenderError,
    RenderPhase, Version, ViewConstructionError, ViewId, ViewInstance, ViewLifecycle, ViewSpec,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::Instrument;

type EnvelopeResult = Result<Rc<ModelEnvelope>, RenderError>;
type PendingEnvelope = Shared<LocalBoxFuture<'static, EnvelopeResult>>;
type ModelResult = Result<Rc<ModelInstance>, RenderError>;
type PendingModel = Shared<LocalBoxFuture<'static, ModelResult>>;

enum ModelSlot {
    /// Initialization in flight; every caller awaits the same futures.
    ///
    /// `envelope` covers lookup and validation only, so a render can reject
    /// an envelope without a view before any module is resolved. `model`
    /// awaits `envelope` and continues with resolution and hydration.
    Pending {
        generation: u64,
        envelope: PendingEnvelope,
        model: PendingModel,
    },
    Ready(Rc<ModelInstance>),
}

pub(crate) struct ManagerInner {
    provider: Rc<dyn StateProvider>,
    resolver: Rc<ModuleResolver>,
    config: ManagerConfig,
    models: RefCell<HashMap<ModelId, ModelSlot>>,
    views: RefCell<BTreeMap<ViewId, Rc<ViewInstance>>>,
    generation: Cell<u64>,
    disposed: Cell<bool>,
}

impl ManagerInner {
    fn ensure_live(&self, model_id: &ModelId) -> Result<(), RenderError> {
        if self.disposed.get() {
            return Err(RenderError::ManagerDisposed {
                model_id: model_id.clone(),
            });
        }
        if model_id.as_str().trim().is_empty() {
            return Err(RenderError::InvalidSpec {
                model_id: model_id.clone(),
                phase: RenderPhase::Validate,
                source: InvalidSpecError::MissingField("model_id"),
            });
        }
        Ok(())
    }

    /// Create-or-reuse the model instance for `model_id`.
    pub(crate) async fn get_model(&self, model_id: &ModelId) -> ModelResult {
        self.acquire(model_id, false).await
    }

    /// The ready instance for `model_id`, if there is one. Never starts an
    /// initialization.
    pub(crate) fn ready_model(&self, model_id: &ModelId) -> Option<Rc<ModelInstance>> {
        match self.models.borrow().get(model_id) {
            Some(ModelSlot::Ready(model)) if !self.disposed.get() => Some(Rc::clone(model)),
            _ => None,
        }
    }

    /// Create-or-reuse the model instance for `model_id`.
    ///
    /// With `require_view`, an envelope without a view is rejected as soon as
    /// it has been validated, before its module is resolved. The pending
    /// model initialization is left in place for callers that do not need a
    /// view.
    async fn acquire(&self, model_id: &ModelId, require_view: bool) -> ModelResult {
        self.ensure_live(model_id)?;

        let (generation, envelope, pending) = {
            let mut models = self.models.borrow_mut();
            match models.get(model_id) {
                Some(ModelSlot::Ready(model)) => {
                    if require_view {
                        check_view(model_id, model.envelope())?;
                    }
                    return Ok(Rc::clone(model));
                }
                Some(ModelSlot::Pending {
                    generation,
                    envelope,
                    model,
                }) => (*generation, envelope.clone(), model.clone()),
                None => {
                    let generation = self.generation.get() + 1;
                    self.generation.set(generation);
                    let envelope = lookup(Rc::clone(&self.provider), model_id.clone())
                        .boxed_local()
                        .shared();
                    let model = initialize(Rc::clone(&self.resolver), model_id.clone(), envelope.clone())
                        .boxed_local()
                        .shared();
                    models.insert(
                        model_id.clone(),
                        ModelSlot::Pending {
                            generation,
                            envelope: envelope.clone(),
                            model: model.clone(),
                        },
                    );
                    (generation, envelope, model)
                }
            }
        };

        if require_view {
            // A failed lookup is reported (and the slot cleared) through the
            // model future below.
            if let Ok(envelope) = envelope.await {
                if let Err(err) = check_view(model_id, &envelope) {
                    self.abandon(model_id, generation, pending);
                    return Err(err);
                }
            }
        }

        let result = pending.await;
        self.settle(model_id, generation, result)
    }

    /// Record the outcome of an initialization in the model table.
    ///
    /// Only the first caller to observe its own pending slot updates it. If
    /// the slot was released or the manager disposed in the meantime, the
    /// instance is disposed instead of handed out.
    fn settle(&self, model_id: &ModelId, generation: u64, result: ModelResult) -> ModelResult {
        let mut models = self.models.borrow_mut();
        let owns_slot = matches!(
            models.get(model_id),
            Some(ModelSlot::Pending { generation: g, .. }) if *g == generation
        );
        if owns_slot {
            match &result {
                Ok(model) => {
                    models.insert(model_id.clone(), ModelSlot::Ready(Rc::clone(model)));
                }
                Err(_) => {
                    models.remove(model_id);
                }
            }
            return result;
        }

        let model = result?;
        let settled = matches!(
            models.get(model_id),
            Some(ModelSlot::Ready(current)) if Rc::ptr_eq(current, &model)
        );
        drop(models);
        if settled {
            return Ok(model);
        }

        model.dispose();
        let model_id = model_id.clone();
        Err(if self.disposed.get() {
            RenderError::ManagerDisposed { model_id }
        } else {
            RenderError::ModelReleased { model_id }
        })
    }

    /// Drop a pending slot that nobody but the caller is waiting on.
    fn abandon(&self, model_id: &ModelId, generation: u64, pending: PendingModel) {
        let mut models = self.models.borrow_mut();
        let unshared = matches!(
            models.get(model_id),
            Some(ModelSlot::Pending { generation: g, .. }) if *g == generation
        ) && pending.strong_count() == Some(2);
        if unshared {
            models.remove(model_id);
        }
    }

    async fn render(self: &Rc<Self>, model_id: &ModelId, container: &Element) -> Result<Rc<ViewInstance>, RenderError> {
        let model = self.acquire(model_id, true).await?;
        let view_spec = check_view(model_id, model.envelope())?.clone();

        tracing::debug!(module = %view_spec.module, view = %view_spec.name, "resolving view module");
        let module = self
            .resolver
            .resolve(&view_spec.module)
            .await
            .map_err(|source| RenderError::ModuleResolution {
                model_id: model_id.clone(),
                source,
            })?;

        if !module.view_names().contains(&view_spec.name.as_str()) {
            return Err(RenderError::ViewConstruction {
                model_id: model_id.clone(),
                source: ViewConstructionError::UnknownView {
                    module: module.name().to_string(),
                    view_name: view_spec.name,
                },
            });
        }

        let element = self.scoped_element(model_id);
        let ctx = ViewContext::new(Rc::clone(&model), element.clone(), Rc::downgrade(self));
        tracing::debug!(view = %view_spec.name, "constructing view");
        let widget = match module.create_view(&view_spec.name, ctx).await {
            Ok(widget) => widget,
            Err(source) => {
                element.remove_all_listeners();
                element.remove();
                return Err(RenderError::ViewConstruction {
                    model_id: model_id.clone(),
                    source,
                });
            }
        };

        let view = ViewInstance::new(&model, element, widget);
        if let Err(err) = self.check_mountable(model_id, &model, container) {
            view.discard();
            return Err(err);
        }
        if let Err(source) = view.mount(container) {
            view.discard();
            return Err(RenderError::Mount {
                model_id: model_id.clone(),
                source,
            });
        }

        self.views.borrow_mut().insert(view.id(), Rc::clone(&view));
        tracing::debug!(view = %view.id(), "view mounted");
        Ok(view)
    }

    fn scoped_element(&self, model_id: &ModelId) -> Element {
        let element = Element::new("div");
        element.add_class(self.config.root_class.as_str());
        element.set_attribute("data-model-id", model_id.as_str());
        element
    }

    /// Checks run right before the scoped element is attached.
    fn check_mountable(
        &self,
        model_id: &ModelId,
        model: &ModelInstance,
        container: &Element,
    ) -> Result<(), RenderError> {
        self.ensure_live(model_id)?;
        if !model.is_ready() {
            return Err(RenderError::ModelReleased {
                model_id: model_id.clone(),
            });
        }
        if self.config.require_connected_container && !container.is_connected() {
            return Err(RenderError::ContainerDetached {
                model_id: model_id.clone(),
            });
        }
        Ok(())
    }

    fn forget_view(&self, id: ViewId) {
        self.views.borrow_mut().remove(&id);
    }
}

fn check_view<'a>(model_id: &ModelId, envelope: &'a ModelEnvelope) -> Result<&'a ViewSpec, RenderError> {
    envelope
        .require_view()
        .map_err(|source| RenderError::InvalidSpec {
            model_id: model_id.clone(),
            phase: RenderPhase::Validate,
            source,
        })
}

/// State lookup and envelope validation for one model id.
///
/// Captures only the provider so that a pending initialization does not keep
/// the manager alive.
async fn lookup(provider: Rc<dyn StateProvider>, model_id: ModelId) -> EnvelopeResult {
    tracing::debug!(%model_id, "looking up model state");
    let raw = provider
        .get_model_state(&model_id)
        .await
        .map_err(|source| RenderError::StateUnavailable {
            model_id: model_id.clone(),
            source,
        })?;

    ModelEnvelope::from_state(raw)
        .map(Rc::new)
        .map_err(|source| RenderError::InvalidSpec {
            model_id,
            phase: RenderPhase::Validate,
            source,
        })
}

/// Module resolution and hydration once the envelope is known.
async fn initialize(
    resolver: Rc<ModuleResolver>,
    model_id: ModelId,
    envelope: PendingEnvelope,
) -> ModelResult {
    let envelope = envelope.await?;
    tracing::debug!(%model_id, module = %envelope.model_module(), "resolving model module");
    let module = resolver
        .resolve(envelope.model_module())
        .await
        .map_err(|source| RenderError::ModuleResolution {
            model_id: model_id.clone(),
            source,
        })?;

    let model = Rc::new(ModelInstance::new(model_id.clone(), (*envelope).clone()));
    if let Err(source) = module.hydrate(&model) {
        model.mark_failed();
        return Err(RenderError::InvalidSpec {
            model_id,
            phase: RenderPhase::ConstructModel,
            source,
        });
    }
    model.mark_ready();
    tracing::debug!(%model_id, "model ready");
    Ok(model)
}

/// Renders widgets from serialized model state into container elements.
///
/// Cloning is cheap and yields a handle to the same manager.
#[derive(Clone)]
pub struct WidgetManager {
    inner: Rc<ManagerInner>,
}

impl WidgetManager {
    /// A manager with the default configuration and an empty registry.
    pub fn new(provider: impl StateProvider + 'static) -> Self {
        Self::with_config(provider, ManagerConfig::default())
    }

    pub fn with_config(provider: impl StateProvider + 'static, config: ManagerConfig) -> Self {
        Self::with_registry(provider, config, ModuleRegistry::new())
    }

    /// A manager over a pre-populated registry. Aliases from `config` are
    /// added to it.
    pub fn with_registry(
        provider: impl StateProvider + 'static,
        config: ManagerConfig,
        mut registry: ModuleRegistry,
    ) -> Self {
        for (from, to) in &config.aliases {
            registry.add_alias(from.as_str(), to.as_str());
        }
        let resolver = ModuleResolver::new(registry, config.retry_failed_modules);
        Self {
            inner: Rc::new(ManagerInner {
                provider: Rc::new(provider),
                resolver: Rc::new(resolver),
                config,
                models: RefCell::new(HashMap::new()),
                views: RefCell::new(BTreeMap::new()),
                generation: Cell::new(0),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render `model_id` into `container`.
    ///
    /// On success the view's scoped element is the last child of
    /// `container`. On failure the container's children are exactly what
    /// they were before the call.
    pub async fn render(
        &self,
        model_id: impl Into<ModelId>,
        container: &Element,
    ) -> Result<ViewHandle, RenderError> {
        let model_id = model_id.into();
        let span = tracing::debug_span!("render", %model_id);
        let result = self
            .inner
            .render(&model_id, container)
            .instrument(span)
            .await;

        match result {
            Ok(view) => Ok(ViewHandle {
                view,
                manager: Rc::downgrade(&self.inner),
            }),
            Err(err) => {
                tracing::warn!(%model_id, phase = %err.phase(), error = %err, "render failed");
                Err(err)
            }
        }
    }

    /// Create-or-reuse the model instance for `model_id` without rendering it.
    pub async fn get_model(&self, model_id: impl Into<ModelId>) -> Result<Rc<ModelInstance>, RenderError> {
        let model_id = model_id.into();
        self.inner.get_model(&model_id).await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether a ready instance exists for `model_id`.
    pub fn has_model(&self, model_id: &ModelId) -> bool {
        matches!(
            self.inner.models.borrow().get(model_id),
            Some(ModelSlot::Ready(_))
        )
    }

    /// Where `model_id` is in its lifecycle within this manager.
    pub fn model_lifecycle(&self, model_id: &ModelId) -> ModelLifecycle {
        match self.inner.models.borrow().get(model_id) {
            None => ModelLifecycle::Uninitialized,
            Some(ModelSlot::Pending { .. }) => ModelLifecycle::Initializing,
            Some(ModelSlot::Ready(model)) => model.lifecycle(),
        }
    }

    /// Ids of ready models, sorted.
    pub fn model_ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self
            .inner
            .models
            .borrow()
            .iter()
            .filter(|(_, slot)| matches!(slot, ModelSlot::Ready(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of currently mounted views.
    pub fn view_count(&self) -> usize {
        self.inner.views.borrow().len()
    }

    /// Handles to the mounted views of `model_id`.
    pub fn views_of(&self, model_id: &ModelId) -> Vec<ViewHandle> {
        self.inner
            .views
            .borrow()
            .values()
            .filter(|view| view.model_id() == model_id)
            .map(|view| ViewHandle {
                view: Rc::clone(view),
                manager: Rc::downgrade(&self.inner),
            })
            .collect()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of widget module loads started so far.
    pub fn module_load_count(&self) -> usize {
        self.inner.resolver.load_count()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Mutable access to the module registry.
    pub fn with_module_registry<R>(&self, f: impl FnOnce(&mut ModuleRegistry) -> R) -> R {
        self.inner.resolver.with_registry(f)
    }

    pub fn register_module(&self, module: Rc<dyn WidgetModule>) {
        self.with_module_registry(|registry| registry.register_module(module));
    }

    pub fn register_loader(
        &self,
        name: impl Into<String>,
        version: Version,
        loader: impl ModuleLoader + 'static,
    ) {
        self.with_module_registry(|registry| registry.register_loader(name, version, loader));
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Unmount every view of `model_id`, dispose the instance and forget it.
    ///
    /// An initialization still in flight is abandoned: its callers receive
    /// [`RenderError::ModelReleased`]. Returns `false` if nothing was known
    /// about `model_id`.
    pub fn release_model(&self, model_id: &ModelId) -> bool {
        let Some(slot) = self.inner.models.borrow_mut().remove(model_id) else {
            return false;
        };

        let mut released = Vec::new();
        self.inner.views.borrow_mut().retain(|_, view| {
            if view.model_id() == model_id {
                released.push(Rc::clone(view));
                false
            } else {
                true
            }
        });
        for view in released {
            view.unmount();
        }

        if let ModelSlot::Ready(model) = slot {
            model.dispose();
        }
        tracing::debug!(%model_id, "model released");
        true
    }

    /// Unmount every view, dispose every model and clear the module cache.
    ///
    /// Idempotent. Every later (or still pending) call fails with
    /// [`RenderError::ManagerDisposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }

        let views = std::mem::take(&mut *self.inner.views.borrow_mut());
        for view in views.into_values() {
            view.unmount();
        }

        let models = std::mem::take(&mut *self.inner.models.borrow_mut());
        for slot in models.into_values() {
            if let ModelSlot::Ready(model) = slot {
                model.dispose();
            }
        }

        self.inner.resolver.clear();
        tracing::debug!("widget manager disposed");
    }
}

impl fmt::Debug for WidgetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetManager")
            .field("models", &self.inner.models.borrow().len())
            .field("views", &self.inner.views.borrow().len())
            .field("disposed", &self.inner.disposed.get())
            .finish_non_exhaustive()
    }
}

/// A mounted view returned by [`WidgetManager::render`].
#[derive(Clone)]
pub struct ViewHandle {
    view: Rc<ViewInstance>,
    manager: Weak<ManagerInner>,
}

impl ViewHandle {
    pub fn id(&self) -> ViewId {
        self.view.id()
    }

    pub fn model_id(&self) -> &ModelId {
        self.view.model_id()
    }

    /// The bound model, unless it has been released.
    pub fn model(&self) -> Option<Rc<ModelInstance>> {
        self.view.model()
    }

    /// The scoped element the view rendered into.
    pub fn element(&self) -> &Element {
        self.view.element()
    }

    pub fn container(&self) -> Option<Element> {
        self.view.container()
    }

    pub fn lifecycle(&self) -> ViewLifecycle {
        self.view.lifecycle()
    }

    pub fn is_mounted(&self) -> bool {
        self.view.is_mounted()
    }

    /// Remove the view from its container. Idempotent; returns `false` if it
    /// was already unmounted.
    pub fn unmount(&self) -> bool {
        if let Some(manager) = self.manager.upgrade() {
            manager.forget_view(self.view.id());
        }
        self.view.unmount()
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHandle")
            .field("id", &self.view.id())
            .field("model_id", self.view.model_id())
            .field("lifecycle", &self.view.lifecycle())
            .finish()
    }
}

//! Model instances and their lifecycle.
//!
//! A [`ModelInstance`] owns one widget's state. Views bind to it through a
//! weak back-reference and subscribe to state changes; the instance never
//! owns its views, it only records their ids.

use crate::envelope::{collect_references, ModelEnvelope, ModelId, ModuleSpec, IDENTITY_KEYS};
use crate::error::StateError;
use crate::view::ViewId;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Lifecycle of a model id within a manager.
///
/// `Uninitialized` and `Initializing` describe a model id before an instance
/// exists; an instance is created in `Initializing` and ends in `Ready`,
/// `Failed` or `Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelLifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Disposed,
}

impl ModelLifecycle {
    /// Whether the state can still be read and patched.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Initializing | Self::Ready)
    }
}

/// Handle returned by [`ModelInstance::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Called after a state patch with the keys whose values changed.
pub type ChangeCallback = Rc<dyn Fn(&ModelInstance, &[String])>;

/// In-memory state of one widget.
pub struct ModelInstance {
    id: ModelId,
    envelope: ModelEnvelope,
    state: RefCell<Map<String, Value>>,
    lifecycle: Cell<ModelLifecycle>,
    views: RefCell<Vec<ViewId>>,
    subscribers: RefCell<Vec<(SubscriptionId, ChangeCallback)>>,
    next_subscription: Cell<u64>,
}

impl ModelInstance {
    /// Create an instance in the `Initializing` state.
    pub fn new(id: ModelId, envelope: ModelEnvelope) -> Self {
        let state = envelope.state().clone();
        Self {
            id,
            envelope,
            state: RefCell::new(state),
            lifecycle: Cell::new(ModelLifecycle::Initializing),
            views: RefCell::new(Vec::new()),
            subscribers: RefCell::new(Vec::new()),
            next_subscription: Cell::new(0),
        }
    }

    pub const fn id(&self) -> &ModelId {
        &self.id
    }

    /// The immutable envelope this instance was created from.
    pub const fn envelope(&self) -> &ModelEnvelope {
        &self.envelope
    }

    pub const fn module(&self) -> &ModuleSpec {
        self.envelope.model_module()
    }

    pub fn model_name(&self) -> &str {
        self.envelope.model_name()
    }

    /// Name of the view this model renders with, if it has one.
    pub fn view_name(&self) -> Option<&str> {
        self.envelope.view().map(|v| v.name.as_str())
    }

    pub fn lifecycle(&self) -> ModelLifecycle {
        self.lifecycle.get()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == ModelLifecycle::Ready
    }

    /// `Initializing → Ready`. Has no effect in any other state.
    pub fn mark_ready(&self) {
        if self.lifecycle() == ModelLifecycle::Initializing {
            self.lifecycle.set(ModelLifecycle::Ready);
        }
    }

    /// `Initializing → Failed`. Has no effect in any other state.
    pub fn mark_failed(&self) {
        if self.lifecycle() == ModelLifecycle::Initializing {
            self.lifecycle.set(ModelLifecycle::Failed);
            self.subscribers.borrow_mut().clear();
        }
    }

    /// Move to `Disposed`, dropping every subscriber. Idempotent.
    ///
    /// Returns the ids of views that were still bound.
    pub fn dispose(&self) -> Vec<ViewId> {
        self.lifecycle.set(ModelLifecycle::Disposed);
        self.subscribers.borrow_mut().clear();
        std::mem::take(&mut *self.views.borrow_mut())
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Snapshot of the current state payload.
    pub fn state(&self) -> Map<String, Value> {
        self.state.borrow().clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.borrow().get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.state
            .borrow()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.state.borrow().get(key).and_then(Value::as_f64)
    }

    /// Models referenced from the current state via `IPY_MODEL_` strings.
    pub fn references(&self) -> Vec<ModelId> {
        let state = Value::Object(self.state());
        collect_references(&state)
            .into_iter()
            .filter(|id| *id != self.id)
            .collect()
    }

    /// Merge `patch` into the state and notify subscribers.
    ///
    /// Identity keys (`_model_module`, `_view_name`, ...) are immutable.
    /// Returns the keys whose value actually changed.
    pub fn set_state(&self, patch: Value) -> Result<Vec<String>, StateError> {
        if !self.lifecycle().is_live() {
            return Err(StateError::NotLive(self.id.clone()));
        }
        let Value::Object(patch) = patch else {
            return Err(StateError::PatchNotObject);
        };
        if let Some(key) = patch.keys().find(|k| IDENTITY_KEYS.contains(&k.as_str())) {
            return Err(StateError::ImmutableField(key.clone()));
        }

        let changed: Vec<String> = {
            let mut state = self.state.borrow_mut();
            patch
                .into_iter()
                .filter_map(|(key, value)| {
                    if state.get(&key) == Some(&value) {
                        return None;
                    }
                    state.insert(key.clone(), value);
                    Some(key)
                })
                .collect()
        };

        if !changed.is_empty() {
            self.notify(&changed);
        }
        Ok(changed)
    }

    fn notify(&self, changed: &[String]) {
        let callbacks: Vec<ChangeCallback> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(self, changed);
        }
    }

    // =========================================================================
    // Subscriptions and bound views
    // =========================================================================

    pub fn subscribe(
        &self,
        callback: impl Fn(&Self, &[String]) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn attach_view(&self, view: ViewId) {
        let mut views = self.views.borrow_mut();
        if !views.contains(&view) {
            views.push(view);
        }
    }

    pub fn detach_view(&self, view: ViewId) -> bool {
        let mut views = self.views.borrow_mut();
        let before = views.len();
        views.retain(|v| *v != view);
        views.len() != before
    }

    /// Ids of the views currently bound to this model.
    pub fn view_ids(&self) -> Vec<ViewId> {
        self.views.borrow().clone()
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("id", &self.id)
            .field("module", &self.module().to_string())
            .field("model_name", &self.model_name())
            .field("view_name", &self.view_name())
            .field("lifecycle", &self.lifecycle())
            .field("views", &self.views.borrow().len())
            .finish_non_exhaustive()
    }
}

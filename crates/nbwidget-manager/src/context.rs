//! What a view factory gets to work with.

use crate::manager::ManagerInner;
use nbwidget_core::{Element, ModelId, ModelInstance, ViewConstructionError};
use serde_json::Value;
use std::fmt;
use std::rc::{Rc, Weak};

/// Handed to [`crate::WidgetModule::create_view`].
///
/// Carries the bound model, the detached scoped element the view renders
/// into, and a weak link back to the manager for resolving models the state
/// references. The scoped element is only attached to the caller's
/// container once the factory has succeeded.
#[derive(Clone)]
pub struct ViewContext {
    model: Rc<ModelInstance>,
    element: Element,
    manager: Weak<ManagerInner>,
}

impl ViewContext {
    pub(crate) const fn new(
        model: Rc<ModelInstance>,
        element: Element,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            model,
            element,
            manager,
        }
    }

    pub const fn model(&self) -> &Rc<ModelInstance> {
        &self.model
    }

    /// The scoped element to render into.
    pub const fn element(&self) -> &Element {
        &self.element
    }

    /// A handle the view can keep to look up built models after
    /// construction, from its synchronous update hook.
    pub fn lookup(&self) -> ModelLookup {
        ModelLookup {
            manager: self.manager.clone(),
        }
    }

    /// Create-or-reuse the model `model_id` through the owning manager.
    pub async fn resolve_reference(
        &self,
        model_id: &ModelId,
    ) -> Result<Rc<ModelInstance>, ViewConstructionError> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| ViewConstructionError::Reference {
                model_id: model_id.clone(),
                reason: "widget manager has been dropped".to_string(),
            })?;

        manager
            .get_model(model_id)
            .await
            .map_err(|err| ViewConstructionError::Reference {
                model_id: model_id.clone(),
                reason: err.to_string(),
            })
    }

    /// Resolve the `IPY_MODEL_` reference stored under `key`.
    ///
    /// Returns `None` when the key is absent, null or not a reference.
    pub async fn resolve_state_reference(
        &self,
        key: &str,
    ) -> Result<Option<Rc<ModelInstance>>, ViewConstructionError> {
        let Some(model_id) = self
            .model
            .get_str(key)
            .and_then(|value| ModelId::from_reference(&value))
        else {
            return Ok(None);
        };
        self.resolve_reference(&model_id).await.map(Some)
    }

    /// Resolve every reference in the array stored under `key`, in order.
    ///
    /// Non-reference entries are skipped.
    pub async fn resolve_state_references(
        &self,
        key: &str,
    ) -> Result<Vec<Rc<ModelInstance>>, ViewConstructionError> {
        let ids: Vec<ModelId> = match self.model.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(ModelId::from_reference)
                .collect(),
            _ => Vec::new(),
        };

        let mut models = Vec::with_capacity(ids.len());
        for id in &ids {
            models.push(self.resolve_reference(id).await?);
        }
        Ok(models)
    }
}

impl fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewContext")
            .field("model", &self.model.id())
            .field("element", &self.element)
            .finish_non_exhaustive()
    }
}

/// Synchronous access to the models a manager has finished building.
///
/// Holds the manager weakly, so a view keeping one does not keep the manager
/// alive.
#[derive(Clone, Default)]
pub struct ModelLookup {
    manager: Weak<ManagerInner>,
}

impl ModelLookup {
    /// The ready instance for `model_id`. `None` if the model was never
    /// built, is still initializing, was released, or the manager is gone.
    pub fn ready(&self, model_id: &ModelId) -> Option<Rc<ModelInstance>> {
        self.manager.upgrade()?.ready_model(model_id)
    }
}

impl fmt::Debug for ModelLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLookup")
            .field("live", &(self.manager.strong_count() > 0))
            .finish()
    }
}

//! View instances: a widget implementation mounted under a container.
//!
//! Lifecycle: `Constructing → Mounted → Unmounted`, or
//! `Constructing → Discarded` when the view is never mounted.

use crate::dom::Element;
use crate::envelope::ModelId;
use crate::error::DomError;
use crate::model::{ModelInstance, SubscriptionId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a view instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewLifecycle {
    Constructing,
    Mounted,
    Unmounted,
    Discarded,
}

/// Behavior supplied by a widget implementation for one mounted view.
///
/// The view factory renders into the scoped element it is given; these hooks
/// only cover what happens afterwards. Listeners registered anywhere under
/// the scoped element are removed by the manager, so `teardown` only needs to
/// release state the element tree does not know about.
pub trait WidgetView {
    /// Called after the bound model's state changed.
    fn update(&mut self, _model: &ModelInstance, _changed: &[String]) {}

    /// Called once when the view is unmounted or discarded.
    fn teardown(&mut self) {}
}

/// A live view bound to a model.
pub struct ViewInstance {
    id: ViewId,
    model_id: ModelId,
    model: Weak<ModelInstance>,
    element: Element,
    widget: RefCell<Box<dyn WidgetView>>,
    lifecycle: Cell<ViewLifecycle>,
    subscription: Cell<Option<SubscriptionId>>,
}

impl ViewInstance {
    /// Wrap a constructed widget. The view starts in `Constructing`.
    pub fn new(model: &Rc<ModelInstance>, element: Element, widget: Box<dyn WidgetView>) -> Rc<Self> {
        Rc::new(Self {
            id: ViewId::next(),
            model_id: model.id().clone(),
            model: Rc::downgrade(model),
            element,
            widget: RefCell::new(widget),
            lifecycle: Cell::new(ViewLifecycle::Constructing),
            subscription: Cell::new(None),
        })
    }

    pub const fn id(&self) -> ViewId {
        self.id
    }

    pub const fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    /// The bound model, unless it has been dropped.
    pub fn model(&self) -> Option<Rc<ModelInstance>> {
        self.model.upgrade()
    }

    /// The scoped root element this view rendered into.
    pub const fn element(&self) -> &Element {
        &self.element
    }

    /// The container the view is mounted in.
    pub fn container(&self) -> Option<Element> {
        if self.is_mounted() {
            self.element.parent()
        } else {
            None
        }
    }

    pub fn lifecycle(&self) -> ViewLifecycle {
        self.lifecycle.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.lifecycle() == ViewLifecycle::Mounted
    }

    /// Attach the scoped element to `container` and start following model changes.
    pub fn mount(self: &Rc<Self>, container: &Element) -> Result<(), DomError> {
        if self.lifecycle() != ViewLifecycle::Constructing {
            return Ok(());
        }
        container.append_child(&self.element)?;
        self.lifecycle.set(ViewLifecycle::Mounted);

        if let Some(model) = self.model() {
            let weak = Rc::downgrade(self);
            let subscription = model.subscribe(move |model, changed| {
                if let Some(view) = weak.upgrade() {
                    view.model_changed(model, changed);
                }
            });
            self.subscription.set(Some(subscription));
            model.attach_view(self.id);
        }
        Ok(())
    }

    fn model_changed(&self, model: &ModelInstance, changed: &[String]) {
        if !self.is_mounted() {
            return;
        }
        match self.widget.try_borrow_mut() {
            Ok(mut widget) => widget.update(model, changed),
            Err(_) => tracing::warn!(
                view = %self.id,
                model_id = %self.model_id,
                "skipping re-entrant model change notification"
            ),
        };
    }

    /// Tear down a view that never reached `Mounted`.
    pub fn discard(&self) {
        if self.lifecycle() != ViewLifecycle::Constructing {
            return;
        }
        self.release();
        self.lifecycle.set(ViewLifecycle::Discarded);
    }

    /// Remove the view from its container. Returns `false` if it was not mounted.
    pub fn unmount(&self) -> bool {
        if !self.is_mounted() {
            return false;
        }
        self.release();
        if let Some(model) = self.model() {
            if let Some(subscription) = self.subscription.take() {
                model.unsubscribe(subscription);
            }
            model.detach_view(self.id);
        }
        self.lifecycle.set(ViewLifecycle::Unmounted);
        true
    }

    fn release(&self) {
        if let Ok(mut widget) = self.widget.try_borrow_mut() {
            widget.teardown();
        }
        self.element.remove_all_listeners();
        self.element.remove();
    }
}

impl fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewInstance")
            .field("id", &self.id)
            .field("model_id", &self.model_id)
            .field("lifecycle", &self.lifecycle())
            .field("element", &self.element)
            .finish_non_exhaustive()
    }
}

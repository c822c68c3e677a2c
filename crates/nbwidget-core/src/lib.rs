//! Core types for the nbwidget widget manager.
//!
//! This crate provides the pieces the rendering pipeline is built from:
//! - Element tree: [`Document`], [`Element`] and CSS-like [`Selector`] queries
//! - Model descriptions: [`ModelState`], [`ModelEnvelope`], [`ModuleSpec`]
//! - Live instances: [`ModelInstance`] and [`ViewInstance`]
//! - The error taxonomy: [`RenderError`] and the per-phase errors it wraps
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); widget managers run
//! on one event loop.

pub mod dom;
mod envelope;
mod error;
mod model;
mod selector;
mod view;

pub use dom::{Document, DomEvent, Element, ElementId, EventCallback, ListenerId, WeakElement};
pub use envelope::{
    collect_references, ModelEnvelope, ModelId, ModelState, ModuleSpec, ViewSpec,
    IDENTITY_KEYS, MODEL_REFERENCE_PREFIX,
};
pub use error::{
    DomError, InvalidSpecError, ModuleResolutionError, ProviderError, RenderError, RenderPhase,
    StateError, ViewConstructionError,
};
pub use model::{ChangeCallback, ModelInstance, ModelLifecycle, SubscriptionId};
pub use selector::{Selector, SelectorError, SelectorParser};
pub use view::{ViewId, ViewInstance, ViewLifecycle, WidgetView};

pub use semver::{Version, VersionReq};

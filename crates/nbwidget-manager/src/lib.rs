//! Widget manager for notebook widgets.
//!
//! [`WidgetManager::render`] turns a model id into a mounted view:
//!
//! 1. the [`StateProvider`] answers with the model's serialized state;
//! 2. the envelope is validated into a [`nbwidget_core::ModelEnvelope`];
//! 3. the [`ModuleResolver`] loads the widget implementation;
//! 4. a [`nbwidget_core::ModelInstance`] is created, or reused;
//! 5. the module's view factory renders into a detached scoped element;
//! 6. the element is mounted into the caller's container.
//!
//! Any failure rejects with a [`nbwidget_core::RenderError`] and leaves the
//! container exactly as it was.

mod config;
mod context;
mod manager;
mod provider;
mod resolver;

pub use config::{ConfigError, ManagerConfig};
pub use context::{ModelLookup, ViewContext};
pub use manager::{ViewHandle, WidgetManager};
pub use provider::{
    NotebookEntry, NotebookStateError, NotebookStateProvider, StateProvider,
    WIDGET_STATE_MIMETYPE,
};
pub use resolver::{ModuleKey, ModuleLoader, ModuleRegistry, ModuleResolver, WidgetModule};

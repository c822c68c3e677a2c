//! Error types for the rendering pipeline.
//!
//! Every error that travels through a memoized future is `Clone`, so a single
//! failed initialization can be reported to every caller that awaited it.

use crate::dom::ElementId;
use crate::envelope::ModelId;
use std::fmt;
use thiserror::Error;

/// The envelope returned by the state provider is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSpecError {
    /// A required field is absent, null or empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// A module version is not a valid version requirement.
    #[error("invalid module version `{version}` in `{field}`: {reason}")]
    InvalidVersion {
        field: &'static str,
        version: String,
        reason: String,
    },

    /// The state payload is not a JSON object.
    #[error("state payload must be a JSON object")]
    StateNotObject,

    /// The widget module refused to hydrate the state.
    #[error("state rejected by `{module}`: {reason}")]
    Rejected { module: String, reason: String },
}

/// A widget module could not be resolved or loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleResolutionError {
    /// Nothing is registered under this name.
    #[error("unknown widget module `{name}`")]
    UnknownModule { name: String },

    /// The module is registered, but no registered version satisfies the requirement.
    #[error("no version of `{name}` satisfies `{requested}` (registered: {available})")]
    VersionMismatch {
        name: String,
        requested: String,
        available: String,
    },

    /// The module loader failed.
    #[error("failed to load `{name}@{version}`: {reason}")]
    LoadFailed {
        name: String,
        version: String,
        reason: String,
    },
}

/// The view factory of a resolved module failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewConstructionError {
    /// The module does not provide the requested view.
    #[error("module `{module}` has no view named `{view_name}`")]
    UnknownView { module: String, view_name: String },

    /// The view cannot interpret the model state.
    #[error("view `{view_name}` cannot interpret state: {reason}")]
    InvalidState { view_name: String, reason: String },

    /// A model referenced from the state could not be loaded.
    #[error("referenced model `{model_id}` could not be loaded: {reason}")]
    Reference { model_id: ModelId, reason: String },

    /// Any other failure raised by the widget implementation.
    #[error("view `{view_name}` failed: {reason}")]
    Failed { view_name: String, reason: String },
}

/// Errors raised by a state provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider has no state for this id.
    #[error("unknown model `{0}`")]
    UnknownModel(ModelId),

    /// The provider failed for another reason.
    #[error("state provider failed: {0}")]
    Failed(String),
}

/// Errors raised when mutating a model's state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The patch touches one of the module/view identity keys.
    #[error("field `{0}` is immutable after creation")]
    ImmutableField(String),

    /// The patch is not a JSON object.
    #[error("state patch must be a JSON object")]
    PatchNotObject,

    /// The model has been disposed or failed to initialize.
    #[error("model `{0}` is not live")]
    NotLive(ModelId),
}

/// Element tree manipulation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DomError {
    /// Inserting the child would make an element its own ancestor.
    #[error("cannot insert element {child} under {parent}: would create a cycle")]
    HierarchyRequest { parent: ElementId, child: ElementId },

    /// Document roots can never be children.
    #[error("a document root cannot be inserted into another element")]
    DocumentInsert,
}

/// Phase of a `render` call, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderPhase {
    /// Fetching the envelope from the state provider.
    Lookup,
    /// Checking the envelope's required fields.
    Validate,
    /// Loading the widget module.
    ResolveModule,
    /// Hydrating the model instance.
    ConstructModel,
    /// Running the module's view factory.
    ConstructView,
    /// Attaching the view to its container.
    Mount,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lookup => "lookup",
            Self::Validate => "validate",
            Self::ResolveModule => "resolve-module",
            Self::ConstructModel => "construct-model",
            Self::ConstructView => "construct-view",
            Self::Mount => "mount",
        };
        f.write_str(name)
    }
}

/// Failure of a `render` (or `get_model`) call.
///
/// Each variant names the model it was rendering; [`RenderError::phase`]
/// reports where in the pipeline it failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("model `{model_id}`: state lookup failed: {source}")]
    StateUnavailable {
        model_id: ModelId,
        #[source]
        source: ProviderError,
    },

    #[error("model `{model_id}`: invalid widget spec: {source}")]
    InvalidSpec {
        model_id: ModelId,
        phase: RenderPhase,
        #[source]
        source: InvalidSpecError,
    },

    #[error("model `{model_id}`: {source}")]
    ModuleResolution {
        model_id: ModelId,
        #[source]
        source: ModuleResolutionError,
    },

    #[error("model `{model_id}`: view construction failed: {source}")]
    ViewConstruction {
        model_id: ModelId,
        #[source]
        source: ViewConstructionError,
    },

    #[error("model `{model_id}`: container was detached before the view could be mounted")]
    ContainerDetached { model_id: ModelId },

    #[error("model `{model_id}`: cannot mount view: {source}")]
    Mount {
        model_id: ModelId,
        #[source]
        source: DomError,
    },

    #[error("model `{model_id}` was released while it was being rendered")]
    ModelReleased { model_id: ModelId },

    #[error("model `{model_id}`: widget manager has been disposed")]
    ManagerDisposed { model_id: ModelId },
}

impl RenderError {
    /// The model id the failing call was working on.
    pub const fn model_id(&self) -> &ModelId {
        match self {
            Self::StateUnavailable { model_id, .. }
            | Self::InvalidSpec { model_id, .. }
            | Self::ModuleResolution { model_id, .. }
            | Self::ViewConstruction { model_id, .. }
            | Self::ContainerDetached { model_id }
            | Self::Mount { model_id, .. }
            | Self::ModelReleased { model_id }
            | Self::ManagerDisposed { model_id } => model_id,
        }
    }

    /// The pipeline phase that failed.
    pub const fn phase(&self) -> RenderPhase {
        match self {
            Self::StateUnavailable { .. } => RenderPhase::Lookup,
            Self::InvalidSpec { phase, .. } => *phase,
            Self::ModuleResolution { .. } => RenderPhase::ResolveModule,
            Self::ViewConstruction { .. } => RenderPhase::ConstructView,
            Self::ContainerDetached { .. }
            | Self::Mount { .. }
            | Self::ModelReleased { .. }
            | Self::ManagerDisposed { .. } => RenderPhase::Mount,
        }
    }

    /// Whether this is an [`RenderError::InvalidSpec`] error.
    pub const fn is_invalid_spec(&self) -> bool {
        matches!(self, Self::InvalidSpec { .. })
    }
}

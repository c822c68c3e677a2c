//! Widget module registry and resolution.
//!
//! Widget implementations are registered ahead of time, either as loaded
//! [`WidgetModule`]s or as [`ModuleLoader`]s that produce one on demand. The
//! [`ModuleResolver`] picks the highest registered version satisfying a
//! model's requirement and memoizes the load per `(name, requirement)`, so
//! concurrent and repeated resolutions share one load.

use crate::context::ViewContext;
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use nbwidget_core::{
    InvalidSpecError, ModelInstance, ModuleResolutionError, ModuleSpec, ViewConstructionError,
    WidgetView,
};
use semver::Version;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::rc::Rc;

/// A loaded widget implementation.
pub trait WidgetModule {
    /// Module name as it appears in `_model_module` / `_view_module`.
    fn name(&self) -> &str;

    fn version(&self) -> &Version;

    /// Views this module can construct.
    fn view_names(&self) -> &[&'static str];

    /// Validate or normalize a freshly created model before it becomes ready.
    fn hydrate(&self, _model: &ModelInstance) -> Result<(), InvalidSpecError> {
        Ok(())
    }

    /// Build the view named `view_name` inside `ctx.element()`.
    fn create_view(
        &self,
        view_name: &str,
        ctx: ViewContext,
    ) -> LocalBoxFuture<'static, Result<Box<dyn WidgetView>, ViewConstructionError>>;
}

/// Produces a [`WidgetModule`] on demand.
pub trait ModuleLoader {
    fn load(&self) -> LocalBoxFuture<'static, Result<Rc<dyn WidgetModule>, String>>;
}

impl<F, Fut> ModuleLoader for F
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Rc<dyn WidgetModule>, String>> + 'static,
{
    fn load(&self) -> LocalBoxFuture<'static, Result<Rc<dyn WidgetModule>, String>> {
        self().boxed_local()
    }
}

/// Loader for a module that is already in memory.
struct Preloaded(Rc<dyn WidgetModule>);

impl ModuleLoader for Preloaded {
    fn load(&self) -> LocalBoxFuture<'static, Result<Rc<dyn WidgetModule>, String>> {
        let module = Rc::clone(&self.0);
        async move { Ok(module) }.boxed_local()
    }
}

struct Registration {
    version: Version,
    loader: Rc<dyn ModuleLoader>,
}

/// The closed set of widget modules a manager may load.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Vec<Registration>>,
    aliases: HashMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded module under its own name and version.
    pub fn register_module(&mut self, module: Rc<dyn WidgetModule>) {
        let name = module.name().to_string();
        let version = module.version().clone();
        self.register_loader(name, version, Preloaded(module));
    }

    /// Register a lazily loaded module. Replaces an existing registration
    /// with the same name and version.
    pub fn register_loader(
        &mut self,
        name: impl Into<String>,
        version: Version,
        loader: impl ModuleLoader + 'static,
    ) {
        let versions = self.modules.entry(name.into()).or_default();
        versions.retain(|r| r.version != version);
        versions.push(Registration {
            version,
            loader: Rc::new(loader),
        });
        versions.sort_by(|a, b| b.version.cmp(&a.version));
    }

    /// Resolve requests for `from` as if they named `to`.
    pub fn add_alias(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.aliases.insert(from.into(), to.into());
    }

    /// The name `name` resolves to after aliasing.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Registered versions of `name`, highest first.
    pub fn versions(&self, name: &str) -> Vec<&Version> {
        self.modules
            .get(self.canonical_name(name))
            .map(|v| v.iter().map(|r| &r.version).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(self.canonical_name(name))
    }

    /// Pick the highest registered version satisfying `spec`.
    fn select(&self, spec: &ModuleSpec) -> Result<(Version, Rc<dyn ModuleLoader>), ModuleResolutionError> {
        let name = self.canonical_name(spec.name());
        let versions = self
            .modules
            .get(name)
            .ok_or_else(|| ModuleResolutionError::UnknownModule {
                name: spec.name().to_string(),
            })?;

        versions
            .iter()
            .find(|r| spec.requirement().matches(&r.version))
            .map(|r| (r.version.clone(), Rc::clone(&r.loader)))
            .ok_or_else(|| ModuleResolutionError::VersionMismatch {
                name: name.to_string(),
                requested: spec.version().to_string(),
                available: versions
                    .iter()
                    .map(|r| r.version.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Memoization key: module name (after aliasing) and requested version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    pub name: String,
    pub version: String,
}

type ModuleResult = Result<Rc<dyn WidgetModule>, ModuleResolutionError>;
type PendingModule = Shared<LocalBoxFuture<'static, ModuleResult>>;

/// Memoizing front end of a [`ModuleRegistry`].
pub struct ModuleResolver {
    registry: RefCell<ModuleRegistry>,
    cache: RefCell<HashMap<ModuleKey, PendingModule>>,
    retry_failed: bool,
    loads: Cell<usize>,
}

impl ModuleResolver {
    /// `retry_failed` evicts failed loads so a later call tries again.
    pub fn new(registry: ModuleRegistry, retry_failed: bool) -> Self {
        Self {
            registry: RefCell::new(registry),
            cache: RefCell::new(HashMap::new()),
            retry_failed,
            loads: Cell::new(0),
        }
    }

    /// Mutable access to the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut ModuleRegistry) -> R) -> R {
        f(&mut self.registry.borrow_mut())
    }

    /// Resolve `spec` to a loaded module.
    pub async fn resolve(&self, spec: &ModuleSpec) -> ModuleResult {
        let key = ModuleKey {
            name: self.registry.borrow().canonical_name(spec.name()).to_string(),
            version: spec.version().to_string(),
        };

        let cached = self.cache.borrow().get(&key).cloned();
        let pending = match cached {
            Some(pending) => pending,
            None => {
                let (version, loader) = self.registry.borrow().select(spec)?;
                let pending = Self::load(key.name.clone(), version, loader);
                self.loads.set(self.loads.get() + 1);
                self.cache.borrow_mut().insert(key.clone(), pending.clone());
                pending
            }
        };

        let result = pending.clone().await;
        if result.is_err() && self.retry_failed {
            let mut cache = self.cache.borrow_mut();
            if cache.get(&key).is_some_and(|current| current.ptr_eq(&pending)) {
                cache.remove(&key);
            }
        }
        result
    }

    fn load(name: String, version: Version, loader: Rc<dyn ModuleLoader>) -> PendingModule {
        async move {
            tracing::debug!(module = %name, %version, "loading widget module");
            loader
                .load()
                .await
                .map_err(|reason| {
                    tracing::warn!(module = %name, %version, %reason, "widget module failed to load");
                    ModuleResolutionError::LoadFailed {
                        name,
                        version: version.to_string(),
                        reason,
                    }
                })
        }
        .boxed_local()
        .shared()
    }

    /// Number of loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }

    /// Number of memoized (or in-flight) resolutions.
    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Forget every memoized resolution.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }
}

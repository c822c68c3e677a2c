//! Reference widget modules for nbwidget.
//!
//! Each module produces the DOM structure its real counterpart would mount
//! (a `canvas` under `.jupyter-threejs`, a `div.leaflet-widgets` map), so the
//! rendering pipeline can be driven end to end without a browser.

pub mod base;
#[cfg(feature = "leaflet")]
pub mod leaflet;
#[cfg(feature = "threejs")]
pub mod threejs;

pub use base::{apply_layout, layout_style, BaseModule};
#[cfg(feature = "leaflet")]
pub use leaflet::LeafletModule;
#[cfg(feature = "threejs")]
pub use threejs::ThreeJsModule;

use nbwidget_core::ViewConstructionError;
use nbwidget_manager::ModuleRegistry;
use std::fmt::Display;
use std::rc::Rc;

pub(crate) fn construction_failed(view_name: &str, err: impl Display) -> ViewConstructionError {
    ViewConstructionError::Failed {
        view_name: view_name.to_string(),
        reason: err.to_string(),
    }
}

/// Register every enabled module.
pub fn register_all(registry: &mut ModuleRegistry) {
    for version in base::VERSIONS {
        registry.register_module(Rc::new(BaseModule::with_version(version)));
    }
    #[cfg(feature = "threejs")]
    registry.register_module(Rc::new(ThreeJsModule::new()));
    #[cfg(feature = "leaflet")]
    registry.register_module(Rc::new(LeafletModule::new()));
}

/// A registry holding every enabled module.
pub fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    register_all(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry();
        let base: Vec<String> = registry
            .versions(base::MODULE_NAME)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(base, vec!["2.0.0", "1.2.0"]);
        #[cfg(feature = "threejs")]
        assert_eq!(registry.versions(threejs::MODULE_NAME)[0].to_string(), "2.4.1");
        #[cfg(feature = "leaflet")]
        assert_eq!(registry.versions(leaflet::MODULE_NAME)[0].to_string(), "0.19.2");
    }

    #[test]
    fn test_construction_failed_message() {
        let err = construction_failed("SceneView", "no canvas");
        assert_eq!(err.to_string(), "view `SceneView` failed: no canvas");
    }
}

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::new_without_default)]
//! Testing support for nbwidget.
//!
//! - [`fixture`]: notebook widget state for a three.js scene and a leaflet map
//! - [`provider`]: [`FakeState`] and the interleaving-friendly [`GatedState`]
//! - [`harness`]: [`MountHarness`], a connected container with DOM assertions
//!
//! ```ignore
//! let harness = MountHarness::new();
//! let manager = create_widget_manager(FakeState::new(Fixture::leaflet()?));
//! manager.render(LEAFLET_MAP_ID, harness.container()).await?;
//! harness.assert_exists("div.leaflet-widgets");
//! ```

pub mod fixture;
pub mod harness;
pub mod provider;

pub use fixture::{
    empty_entry, model_state, reference, Fixture, FixtureError, EMPTY_MODEL_ID, LEAFLET_MAP_ID,
    LEAFLET_STATE, THREEJS_RENDERER_ID, THREEJS_SCENE_ID, THREEJS_STATE,
};
pub use harness::{ChildrenSnapshot, MountHarness};
pub use provider::{FakeState, Gate, GatedState};

//! Render proxies and the scene they are attached to.
//!
//! Mesh and material construction live in the host renderer; this module
//! only decides where each marker goes, how large it is, and when its
//! distance label needs new text.

pub mod marker;
pub mod scaling;

pub use marker::{LocationMarker, MarkerUpdate};
pub use scaling::{ScaleBand, label_needs_update};

use crate::registry::LocalAnchorId;

/// Host rendering scene. Markers are keyed by the local anchor they follow.
pub trait RenderScene: Send + Sync {
    fn attach(&self, anchor: LocalAnchorId, marker: &LocationMarker);
    fn update(&self, anchor: LocalAnchorId, update: &MarkerUpdate);
    fn detach(&self, anchor: LocalAnchorId);
}

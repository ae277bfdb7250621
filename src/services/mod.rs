//! Collaborator interfaces consumed by the session.
//!
//! - [`PositioningService`] - the remote geospatial service: per-frame
//!   correlation, rooftop anchor creation, VPS availability checks
//! - [`LocalTracker`] - the on-device tracker that owns local anchors
//!
//! Completions are boxed callbacks that may run on any thread, in any order.

pub mod scripted;
pub mod simulated;

use std::time::Instant;

use nalgebra::{Matrix4, Vector3};

use crate::error::{FrameSyncError, RooftopAnchorState, SessionError};
use crate::geometry::{GeoCoordinate, PoseAlignment, SE3};
use crate::localization::EarthFrame;
use crate::registry::{LocalAnchor, LocalAnchorId, RemoteAnchor, RemoteAnchorId};

/// One frame from the local tracker.
#[derive(Debug, Clone)]
pub struct LocalFrame {
    pub timestamp: Instant,
    /// Camera pose T_wc in the local tracking world.
    pub camera_pose: SE3,
}

impl LocalFrame {
    pub fn viewer_position(&self) -> Vector3<f64> {
        self.camera_pose.translation
    }
}

/// Remote frame correlated with a [`LocalFrame`].
#[derive(Debug, Clone, Default)]
pub struct RemoteFrame {
    /// `None` when the geospatial subsystem has produced nothing yet.
    pub earth: Option<EarthFrame>,
    /// Anchors whose pose changed this frame.
    pub updated_anchors: Vec<RemoteAnchor>,
    /// Anchors the service no longer tracks.
    pub removed_anchors: Vec<RemoteAnchorId>,
}

/// Parameters for one rooftop anchor request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RooftopRequest {
    pub coordinate: GeoCoordinate,
    pub altitude_above_rooftop: f64,
    pub alignment: PoseAlignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpsAvailability {
    Available,
    Unavailable,
    ErrorNetwork,
    ErrorInternal,
}

impl VpsAvailability {
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

pub type RooftopCompletion = Box<dyn FnOnce(Option<RemoteAnchor>, RooftopAnchorState) + Send>;
pub type VpsCompletion = Box<dyn FnOnce(VpsAvailability) + Send>;

/// Remote geospatial positioning service.
pub trait PositioningService: Send + Sync {
    /// Apply the geospatial session configuration. Errors are session-fatal.
    fn configure(&self) -> Result<(), SessionError>;

    /// Correlate a local frame with the remote service. Must not block the
    /// frame loop.
    fn update_frame(&self, frame: &LocalFrame) -> Result<RemoteFrame, FrameSyncError>;

    /// Start resolving a rooftop anchor. `completion` runs exactly once, on
    /// an arbitrary thread, unless this call returns an error, in which case
    /// it is dropped without running.
    fn create_rooftop_anchor(
        &self,
        request: RooftopRequest,
        completion: RooftopCompletion,
    ) -> Result<(), SessionError>;

    fn check_vps_availability(&self, coordinate: GeoCoordinate, completion: VpsCompletion);
}

/// On-device tracking session.
pub trait LocalTracker: Send + Sync {
    /// Attach a new anchor so it receives per-frame pose updates.
    fn add_anchor(&self, transform: &Matrix4<f64>) -> LocalAnchor;
    fn remove_anchor(&self, id: LocalAnchorId);
}

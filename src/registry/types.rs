//! Identifier and handle types for the two anchor namespaces.
//!
//! Local ids come from the on-device tracker, remote ids from the geospatial
//! service. Neither side knows about the other; [`AnchorKey`] is the only
//! place the two are paired.

use nalgebra::Matrix4;
use uuid::Uuid;

/// Anchor identifier in the local tracking namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalAnchorId(pub Uuid);

impl LocalAnchorId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for LocalAnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

impl From<LocalAnchorId> for Uuid {
    fn from(id: LocalAnchorId) -> Self {
        id.0
    }
}

/// Anchor identifier in the remote geospatial namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteAnchorId(pub Uuid);

impl RemoteAnchorId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RemoteAnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

impl From<RemoteAnchorId> for Uuid {
    fn from(id: RemoteAnchorId) -> Self {
        id.0
    }
}

/// Composite key for one physically placed marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorKey {
    pub local: LocalAnchorId,
    pub remote: RemoteAnchorId,
}

impl AnchorKey {
    pub fn new(local: LocalAnchorId, remote: RemoteAnchorId) -> Self {
        Self { local, remote }
    }

    /// True if either half of the key carries `id`.
    pub fn touches(&self, id: Uuid) -> bool {
        self.local.0 == id || self.remote.0 == id
    }
}

impl std::fmt::Display for AnchorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.local, self.remote)
    }
}

/// Tracking state the remote service reports for an individual anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorTrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Handle to an anchor attached to the local tracking session.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAnchor {
    pub id: LocalAnchorId,
    pub transform: Matrix4<f64>,
}

/// Handle to an anchor resolved by the remote geospatial service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAnchor {
    pub id: RemoteAnchorId,
    pub transform: Matrix4<f64>,
    pub tracking_state: AnchorTrackingState,
}

impl RemoteAnchor {
    /// Only tracking anchors carry a transform worth rendering.
    pub fn has_valid_transform(&self) -> bool {
        self.tracking_state == AnchorTrackingState::Tracking
    }
}

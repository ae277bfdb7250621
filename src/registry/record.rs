//! AnchorRecord: everything owned by one placed marker.

use crate::catalog::LocationEntry;
use crate::render::LocationMarker;

use super::types::{AnchorKey, LocalAnchor, RemoteAnchor};

/// A resolved anchor pair plus the location it marks and its render proxy.
///
/// Created only by the resolution pipeline after a successful rooftop
/// resolution; destroyed by removal-by-id or a bulk clear.
#[derive(Debug, Clone)]
pub struct AnchorRecord {
    pub local: LocalAnchor,
    pub remote: RemoteAnchor,
    pub location: LocationEntry,
    pub marker: LocationMarker,
}

impl AnchorRecord {
    pub fn key(&self) -> AnchorKey {
        AnchorKey::new(self.local.id, self.remote.id)
    }
}

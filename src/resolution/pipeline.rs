//! Rooftop anchor resolution for a catalog.
//!
//! One request per catalog entry, all dispatched together under a single
//! once-per-session claim and an all-or-nothing capacity reservation.
//! Completions run on the service's threads:
//! 1. Check the resolution state and transform validity
//! 2. Drop the completion if the session was paused meanwhile
//! 3. Attach a local anchor at the resolved transform
//! 4. Attach the marker to the scene, then insert the record; a clear that
//!    raced the completion makes the insert fail and the marker is detached

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, LocationEntry};
use crate::config::{MarkerConfig, ResolutionConfig};
use crate::error::{ResolveError, RooftopAnchorState, SessionError};
use crate::geometry::PoseAlignment;
use crate::registry::{AnchorKey, AnchorRecord, Generation, RemoteAnchor};
use crate::render::{LocationMarker, RenderScene};
use crate::services::{LocalTracker, PositioningService, RooftopRequest};
use crate::system::shared_state::SharedState;

use super::gate::{OutstandingGate, Permit};

/// Summary of one dispatched resolution round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionRound {
    /// Requests handed to the service.
    pub dispatched: usize,
    /// Entries the service refused synchronously, by location id.
    pub rejected: Vec<(i64, SessionError)>,
    /// Entries skipped because their coordinate was not a valid WGS84 point.
    pub invalid_coordinates: Vec<i64>,
}

pub struct AnchorResolutionPipeline {
    service: Arc<dyn PositioningService>,
    completion: CompletionContext,
    gate: Arc<OutstandingGate>,
    altitude_above_rooftop: f64,
}

/// Everything a completion needs, cloned into each callback.
#[derive(Clone)]
struct CompletionContext {
    shared: Arc<SharedState>,
    tracker: Arc<dyn LocalTracker>,
    scene: Arc<dyn RenderScene>,
    marker_config: MarkerConfig,
}

impl AnchorResolutionPipeline {
    /// Pipeline capped at `config.max_outstanding_anchors`.
    pub fn new(
        service: Arc<dyn PositioningService>,
        tracker: Arc<dyn LocalTracker>,
        scene: Arc<dyn RenderScene>,
        shared: Arc<SharedState>,
        config: &ResolutionConfig,
        marker_config: MarkerConfig,
    ) -> Self {
        Self {
            service,
            completion: CompletionContext {
                shared,
                tracker,
                scene,
                marker_config,
            },
            gate: OutstandingGate::new(config.max_outstanding_anchors),
            altitude_above_rooftop: config.altitude_above_rooftop,
        }
    }

    /// Requests currently awaiting a completion.
    pub fn outstanding(&self) -> usize {
        self.gate.outstanding()
    }

    /// Dispatch one rooftop request per catalog entry.
    ///
    /// Must only be called while localized, with the alignment of the
    /// current frame. Refused rounds send nothing and leave the
    /// once-per-session claim untaken.
    pub fn resolve(
        &self,
        catalog: &Catalog,
        alignment: PoseAlignment,
    ) -> Result<ResolutionRound, ResolveError> {
        let shared = &self.completion.shared;

        if !shared.is_active() {
            return Err(ResolveError::SessionInactive);
        }
        if catalog.is_empty() {
            return Err(ResolveError::EmptyCatalog);
        }
        if !shared.try_begin_resolution() {
            return Err(ResolveError::AlreadyResolved);
        }

        let requested = catalog.len();
        let permits = match self.gate.try_acquire(requested, shared.registry.len()) {
            Ok(permits) => permits,
            Err(exhausted) => {
                shared.reset_resolution();
                warn!(
                    requested,
                    available = exhausted.available,
                    ceiling = exhausted.ceiling,
                    "refusing resolution round: anchor ceiling reached"
                );
                return Err(ResolveError::ResourceExhausted {
                    requested,
                    available: exhausted.available,
                    ceiling: exhausted.ceiling,
                });
            }
        };

        info!("creating anchors for {} locations", requested);
        let generation = shared.registry.generation();
        let mut round = ResolutionRound::default();

        for (entry, permit) in catalog.entries().iter().zip(permits) {
            if !entry.coordinate.is_valid() {
                warn!(location = %entry.name, coordinate = %entry.coordinate, "skipping invalid coordinate");
                round.invalid_coordinates.push(entry.id);
                continue;
            }

            let request = RooftopRequest {
                coordinate: entry.coordinate,
                altitude_above_rooftop: self.altitude_above_rooftop,
                alignment,
            };
            let ctx = self.completion.clone();
            let location = entry.clone();
            let completion = Box::new(move |anchor: Option<RemoteAnchor>, state: RooftopAnchorState| {
                ctx.complete(location, generation, permit, anchor, state);
            });

            match self.service.create_rooftop_anchor(request, completion) {
                Ok(()) => round.dispatched += 1,
                Err(e) => {
                    warn!(location = %entry.name, error = %e, "error adding rooftop anchor");
                    round.rejected.push((entry.id, e));
                }
            }
        }

        Ok(round)
    }
}

impl CompletionContext {
    fn complete(
        &self,
        location: LocationEntry,
        generation: Generation,
        permit: Permit,
        anchor: Option<RemoteAnchor>,
        state: RooftopAnchorState,
    ) {
        // Capacity returns to the gate however this completion ends.
        let _permit = permit;

        let remote = match anchor {
            Some(a) if state.is_success() && a.has_valid_transform() => a,
            other => {
                warn!(
                    location = %location.name,
                    state = %state,
                    valid_transform = ?other.as_ref().map(RemoteAnchor::has_valid_transform),
                    "failed to resolve anchor"
                );
                self.shared.record_failed();
                return;
            }
        };

        if !self.shared.is_active() {
            debug!(location = %location.name, "ignoring completion after session pause");
            return;
        }

        let local = self.tracker.add_anchor(&remote.transform);
        let key = AnchorKey::new(local.id, remote.id);
        let marker = LocationMarker::new(&location, &self.marker_config);
        self.scene.attach(local.id, &marker);

        let record = AnchorRecord {
            local,
            remote,
            location,
            marker,
        };

        match self.shared.registry.insert_if_current(generation, key, record) {
            Ok(evicted) => {
                for old in evicted {
                    self.scene.detach(old.local.id);
                    self.tracker.remove_anchor(old.local.id);
                }
                self.shared.record_resolved();
                debug!(key = %key, "anchor resolved");
            }
            Err(stale) => {
                debug!(location = %stale.location.name, "ignoring completion from a cleared registry");
                self.scene.detach(key.local);
                self.tracker.remove_anchor(key.local);
            }
        }
    }
}

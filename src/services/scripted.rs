//! Deterministic collaborators for tests and host integration checks.
//!
//! Nothing here spawns threads: remote frames are queued up front and
//! rooftop completions are held until the caller releases them, so tests
//! decide exactly how completions interleave with frame ticks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use parking_lot::Mutex;

use crate::error::{FrameSyncError, RooftopAnchorState, SessionError};
use crate::geometry::GeoCoordinate;
use crate::localization::{EarthFrame, EarthState, EarthTrackingState, GeospatialPose};
use crate::registry::{AnchorTrackingState, LocalAnchor, LocalAnchorId, RemoteAnchor, RemoteAnchorId};
use crate::render::{LocationMarker, MarkerUpdate, RenderScene};

use super::{
    LocalFrame, LocalTracker, PositioningService, RemoteFrame, RooftopCompletion, RooftopRequest,
    VpsAvailability, VpsCompletion,
};

/// Earth frame reporting `Tracking` with the given accuracies.
pub fn tracking_earth(horizontal: f64, yaw: f64) -> EarthFrame {
    EarthFrame {
        earth_state: EarthState::Enabled,
        tracking_state: EarthTrackingState::Tracking,
        camera_pose: Some(GeospatialPose {
            coordinate: GeoCoordinate::new(33.1284, -117.1597),
            altitude: 180.0,
            eus_rotation: UnitQuaternion::identity(),
            horizontal_accuracy: horizontal,
            vertical_accuracy: horizontal / 2.0,
            orientation_yaw_accuracy: yaw,
        }),
    }
}

/// Remote frame whose only content is a tracking earth frame.
pub fn tracking_frame(horizontal: f64, yaw: f64) -> RemoteFrame {
    RemoteFrame {
        earth: Some(tracking_earth(horizontal, yaw)),
        ..RemoteFrame::default()
    }
}

/// Remote frame whose earth tracking is paused.
pub fn paused_frame() -> RemoteFrame {
    RemoteFrame {
        earth: Some(EarthFrame {
            earth_state: EarthState::Enabled,
            tracking_state: EarthTrackingState::Paused,
            camera_pose: None,
        }),
        ..RemoteFrame::default()
    }
}

/// Tracking anchor at `translation`.
pub fn tracking_anchor(id: RemoteAnchorId, translation: Vector3<f64>) -> RemoteAnchor {
    RemoteAnchor {
        id,
        transform: Matrix4::new_translation(&translation),
        tracking_state: AnchorTrackingState::Tracking,
    }
}

/// Positioning service driven entirely by the test.
pub struct ScriptedPositioningService {
    frames: Mutex<VecDeque<Result<RemoteFrame, FrameSyncError>>>,
    /// Returned once the queue is drained.
    default_frame: Mutex<RemoteFrame>,
    pending: Mutex<VecDeque<(RooftopRequest, RooftopCompletion)>>,
    requests: Mutex<Vec<RooftopRequest>>,
    reject_with: Mutex<Option<SessionError>>,
    configure_error: Mutex<Option<SessionError>>,
    vps: Mutex<VpsAvailability>,
    vps_checks: AtomicUsize,
    resolved: AtomicUsize,
}

impl Default for ScriptedPositioningService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPositioningService {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            default_frame: Mutex::new(RemoteFrame::default()),
            pending: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
            configure_error: Mutex::new(None),
            vps: Mutex::new(VpsAvailability::Unavailable),
            vps_checks: AtomicUsize::new(0),
            resolved: AtomicUsize::new(0),
        }
    }

    pub fn push_frame(&self, frame: RemoteFrame) {
        self.frames.lock().push_back(Ok(frame));
    }

    pub fn push_error(&self, error: FrameSyncError) {
        self.frames.lock().push_back(Err(error));
    }

    pub fn set_default_frame(&self, frame: RemoteFrame) {
        *self.default_frame.lock() = frame;
    }

    /// Refuse every subsequent rooftop request synchronously.
    pub fn reject_requests(&self, error: Option<SessionError>) {
        *self.reject_with.lock() = error;
    }

    pub fn fail_configure(&self, error: SessionError) {
        *self.configure_error.lock() = Some(error);
    }

    pub fn set_vps_availability(&self, availability: VpsAvailability) {
        *self.vps.lock() = availability;
    }

    pub fn vps_checks(&self) -> usize {
        self.vps_checks.load(Ordering::SeqCst)
    }

    /// Requests accepted so far, in dispatch order.
    pub fn requests(&self) -> Vec<RooftopRequest> {
        self.requests.lock().clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run the oldest pending completion with `state`. Successful
    /// completions get a fresh tracking anchor. Returns the anchor id handed
    /// out, if any.
    pub fn complete_next(&self, state: RooftopAnchorState) -> Option<RemoteAnchorId> {
        let anchor = state.is_success().then(|| {
            let n = self.resolved.fetch_add(1, Ordering::SeqCst) + 1;
            tracking_anchor(RemoteAnchorId::new_v4(), Vector3::new(0.0, 0.0, -10.0 * n as f64))
        });
        let id = anchor.as_ref().map(|a| a.id);
        self.complete_next_with(anchor, state).then_some(id).flatten()
    }

    /// Run the oldest pending completion with exactly these arguments.
    /// Returns false when nothing was pending.
    pub fn complete_next_with(&self, anchor: Option<RemoteAnchor>, state: RooftopAnchorState) -> bool {
        // Released before the callback runs.
        let next = self.pending.lock().pop_front();
        match next {
            Some((_, completion)) => {
                completion(anchor, state);
                true
            }
            None => false,
        }
    }

    pub fn complete_all(&self, state: RooftopAnchorState) -> Vec<RemoteAnchorId> {
        let mut ids = Vec::new();
        while self.pending_requests() > 0 {
            ids.extend(self.complete_next(state));
        }
        ids
    }

    /// Drop every pending completion without running it.
    pub fn abandon_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.len();
        pending.clear();
        n
    }
}

impl PositioningService for ScriptedPositioningService {
    fn configure(&self) -> Result<(), SessionError> {
        match self.configure_error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn update_frame(&self, _frame: &LocalFrame) -> Result<RemoteFrame, FrameSyncError> {
        match self.frames.lock().pop_front() {
            Some(next) => next,
            None => Ok(self.default_frame.lock().clone()),
        }
    }

    fn create_rooftop_anchor(
        &self,
        request: RooftopRequest,
        completion: RooftopCompletion,
    ) -> Result<(), SessionError> {
        if let Some(e) = self.reject_with.lock().clone() {
            return Err(e);
        }
        self.requests.lock().push(request);
        self.pending.lock().push_back((request, completion));
        Ok(())
    }

    fn check_vps_availability(&self, _coordinate: GeoCoordinate, completion: VpsCompletion) {
        self.vps_checks.fetch_add(1, Ordering::SeqCst);
        let availability = *self.vps.lock();
        completion(availability);
    }
}

/// Local tracker that only keeps a table of live anchors.
#[derive(Default)]
pub struct RecordingTracker {
    anchors: Mutex<HashMap<LocalAnchorId, Matrix4<f64>>>,
    removed: AtomicUsize,
}

impl RecordingTracker {
    pub fn live_anchors(&self) -> usize {
        self.anchors.lock().len()
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn transform_of(&self, id: LocalAnchorId) -> Option<Matrix4<f64>> {
        self.anchors.lock().get(&id).copied()
    }
}

impl LocalTracker for RecordingTracker {
    fn add_anchor(&self, transform: &Matrix4<f64>) -> LocalAnchor {
        let anchor = LocalAnchor {
            id: LocalAnchorId::new_v4(),
            transform: *transform,
        };
        self.anchors.lock().insert(anchor.id, anchor.transform);
        anchor
    }

    fn remove_anchor(&self, id: LocalAnchorId) {
        if self.anchors.lock().remove(&id).is_some() {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Scene that records attachments and marker updates.
#[derive(Default)]
pub struct RecordingScene {
    attached: Mutex<HashMap<LocalAnchorId, LocationMarker>>,
    updates: Mutex<Vec<(LocalAnchorId, MarkerUpdate)>>,
    detached: AtomicUsize,
}

impl RecordingScene {
    pub fn attached(&self) -> Vec<LocalAnchorId> {
        self.attached.lock().keys().copied().collect()
    }

    pub fn marker(&self, id: LocalAnchorId) -> Option<LocationMarker> {
        self.attached.lock().get(&id).cloned()
    }

    pub fn updates(&self) -> Vec<(LocalAnchorId, MarkerUpdate)> {
        self.updates.lock().clone()
    }

    pub fn last_update(&self, id: LocalAnchorId) -> Option<MarkerUpdate> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|(anchor, _)| *anchor == id)
            .map(|(_, update)| update.clone())
    }

    pub fn detached(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

impl RenderScene for RecordingScene {
    fn attach(&self, anchor: LocalAnchorId, marker: &LocationMarker) {
        self.attached.lock().insert(anchor, marker.clone());
    }

    fn update(&self, anchor: LocalAnchorId, update: &MarkerUpdate) {
        self.updates.lock().push((anchor, update.clone()));
    }

    fn detach(&self, anchor: LocalAnchorId) {
        if self.attached.lock().remove(&anchor).is_some() {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }
}

//! Per-frame driver.
//!
//! Each tick:
//! 1. Correlate the local frame with the remote service (transient failure
//!    skips the tick without touching any state)
//! 2. Feed the earth data into the localization state machine
//! 3. Publish statistics
//! 4. Dispatch the resolution round when the machine asks for it
//! 5. Move, rescale and relabel the marker of every updated anchor
//! 6. Prune anchors the service stopped tracking

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::localization::{LocalizationInput, LocalizationState, LocalizationStateMachine, TickOutcome};
use crate::registry::{AnchorTrackingState, RemoteAnchorId};
use crate::render::RenderScene;
use crate::resolution::{AnchorResolutionPipeline, ResolutionRound};
use crate::services::{LocalFrame, LocalTracker, PositioningService, RemoteFrame};

use super::shared_state::SharedState;
use super::statistics::SessionStatistics;

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// `None` when the tick was skipped.
    pub outcome: Option<TickOutcome>,
    pub statistics: Option<SessionStatistics>,
    /// Set on the tick that attempted a resolution round.
    pub resolution: Option<Result<ResolutionRound, ResolveError>>,
    /// Markers moved this tick.
    pub updated: usize,
    /// Records pruned this tick.
    pub pruned: usize,
}

impl FrameReport {
    /// Whether the tick was skipped: inactive session or failed frame sync.
    pub fn skipped(&self) -> bool {
        self.outcome.is_none()
    }
}

pub struct FrameSynchronizer {
    machine: LocalizationStateMachine,
    pipeline: AnchorResolutionPipeline,
    service: Arc<dyn PositioningService>,
    tracker: Arc<dyn LocalTracker>,
    scene: Arc<dyn RenderScene>,
    shared: Arc<SharedState>,
    stats_tx: Sender<SessionStatistics>,
}

impl FrameSynchronizer {
    /// Wire a synchronizer around an already configured state machine.
    pub fn new(
        machine: LocalizationStateMachine,
        pipeline: AnchorResolutionPipeline,
        service: Arc<dyn PositioningService>,
        tracker: Arc<dyn LocalTracker>,
        scene: Arc<dyn RenderScene>,
        shared: Arc<SharedState>,
        stats_tx: Sender<SessionStatistics>,
    ) -> Self {
        Self {
            machine,
            pipeline,
            service,
            tracker,
            scene,
            shared,
            stats_tx,
        }
    }

    /// Current localization state.
    pub fn state(&self) -> LocalizationState {
        self.machine.state()
    }

    /// Direct access for session lifecycle changes.
    pub fn machine_mut(&mut self) -> &mut LocalizationStateMachine {
        &mut self.machine
    }

    /// The resolution pipeline, for outstanding request counts.
    pub fn pipeline(&self) -> &AnchorResolutionPipeline {
        &self.pipeline
    }

    /// Run one tick for `frame`.
    pub fn on_frame(&mut self, frame: &LocalFrame, now: Instant) -> FrameReport {
        if !self.shared.is_active() {
            return FrameReport::default();
        }

        let remote = match self.service.update_frame(frame) {
            Ok(remote) => remote,
            Err(e) => {
                debug!(error = %e, "frame sync failed, skipping tick");
                return FrameReport::default();
            }
        };

        let input = remote
            .earth
            .as_ref()
            .map(LocalizationInput::from)
            .unwrap_or_else(LocalizationInput::not_tracking);
        let outcome = self.machine.update(&input, now);

        let statistics = SessionStatistics::from_tick(outcome.current, remote.earth.as_ref());
        if let Some(stats) = &statistics {
            let _ = self.stats_tx.try_send(stats.clone());
        }

        let resolution = outcome
            .resolve_anchors
            .then(|| self.resolve(&remote))
            .flatten();

        let (updated, stopped) = self.update_markers(frame, &remote);
        let pruned = self.prune(remote.removed_anchors.iter().chain(&stopped));

        FrameReport {
            outcome: Some(outcome),
            statistics,
            resolution,
            updated,
            pruned,
        }
    }

    fn resolve(&mut self, remote: &RemoteFrame) -> Option<Result<ResolutionRound, ResolveError>> {
        let Some(pose) = remote.earth.as_ref().and_then(|e| e.camera_pose.as_ref()) else {
            warn!("localized without a geospatial pose, deferring anchor resolution");
            self.machine.rearm_resolution();
            return None;
        };

        let catalog = self.shared.catalog();
        let result = self.pipeline.resolve(&catalog, pose.alignment());
        match &result {
            Ok(round) => debug!(
                dispatched = round.dispatched,
                rejected = round.rejected.len(),
                "resolution round dispatched"
            ),
            Err(e) => warn!(error = %e, "resolution round refused"),
        }
        Some(result)
    }

    /// Returns the number of markers moved and the anchors reported as
    /// stopped.
    fn update_markers(&self, frame: &LocalFrame, remote: &RemoteFrame) -> (usize, Vec<RemoteAnchorId>) {
        let viewer = frame.viewer_position();
        let mut updated = 0;
        let mut stopped = Vec::new();

        for anchor in &remote.updated_anchors {
            match anchor.tracking_state {
                AnchorTrackingState::Stopped => {
                    stopped.push(anchor.id);
                    continue;
                }
                AnchorTrackingState::Paused => continue,
                AnchorTrackingState::Tracking => {}
            }

            let change = self.shared.registry.with_remote_mut(anchor.id, |record| {
                record.remote = anchor.clone();
                record.local.transform = anchor.transform;
                let update = record.marker.update_transform(&anchor.transform, Some(&viewer));
                (record.local.id, update)
            });

            // Scene calls happen outside the registry lock.
            if let Some((local, update)) = change {
                self.scene.update(local, &update);
                updated += 1;
            }
        }

        (updated, stopped)
    }

    fn prune<'a>(&self, ids: impl Iterator<Item = &'a RemoteAnchorId>) -> usize {
        let mut pruned = 0;
        for id in ids {
            for record in self.shared.registry.remove_all(*id) {
                debug!(location = %record.location.name, anchor = %id, "pruning anchor");
                self.scene.detach(record.local.id);
                self.tracker.remove_anchor(record.local.id);
                pruned += 1;
            }
        }
        pruned
    }
}

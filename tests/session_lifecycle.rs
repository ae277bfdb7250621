//! End-to-end session scenarios against the scripted collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use nalgebra::Vector3;

use geoanchor::catalog::{Catalog, Category, LocationEntry};
use geoanchor::config::SessionConfig;
use geoanchor::error::{FrameSyncError, ResolveError, RooftopAnchorState, SessionError};
use geoanchor::geometry::{GeoCoordinate, SE3};
use geoanchor::localization::LocalizationState;
use geoanchor::registry::AnchorTrackingState;
use geoanchor::services::scripted::{
    RecordingScene, RecordingTracker, ScriptedPositioningService, paused_frame, tracking_anchor,
    tracking_frame,
};
use geoanchor::services::{LocalFrame, RemoteFrame, VpsAvailability};
use geoanchor::system::{GeospatialSession, SessionStatistics};

struct Harness {
    service: Arc<ScriptedPositioningService>,
    tracker: Arc<RecordingTracker>,
    scene: Arc<RecordingScene>,
    session: GeospatialSession,
    t0: Instant,
}

impl Harness {
    fn new(config: SessionConfig, catalog: Catalog) -> Self {
        Self::with_service(config, catalog, ScriptedPositioningService::new())
    }

    fn with_service(config: SessionConfig, catalog: Catalog, service: ScriptedPositioningService) -> Self {
        let service = Arc::new(service);
        let tracker = Arc::new(RecordingTracker::default());
        let scene = Arc::new(RecordingScene::default());
        let mut session = GeospatialSession::new(
            config,
            catalog,
            service.clone(),
            tracker.clone(),
            scene.clone(),
        )
        .unwrap();
        session.run();
        Self {
            service,
            tracker,
            scene,
            session,
            t0: Instant::now(),
        }
    }

    fn tick(&mut self, secs: f64) -> geoanchor::system::FrameReport {
        let t = self.t0 + Duration::from_secs_f64(secs);
        let frame = LocalFrame {
            timestamp: t,
            camera_pose: SE3::identity(),
        };
        self.session.on_frame_at(&frame, t)
    }

    /// Two good ticks: Pretracking -> Localizing -> Localized.
    fn localize(&mut self) -> geoanchor::system::FrameReport {
        self.service.push_frame(tracking_frame(4.0, 8.0));
        self.service.push_frame(tracking_frame(4.0, 8.0));
        self.tick(0.0);
        self.tick(0.1)
    }
}

fn campus(n: i64) -> Catalog {
    let origin = GeoCoordinate::new(33.1284, -117.1597);
    Catalog::new(
        (0..n)
            .map(|i| LocationEntry {
                id: 100 + i,
                name: format!("Hall {i}"),
                category: Category {
                    id: 1,
                    name: "Academic".into(),
                    icon_url: Some("https://example.invalid/academic.png".into()),
                },
                coordinate: origin.offset_by(20.0 * i as f64, 50.0),
            })
            .collect(),
    )
}

#[test]
fn test_localize_resolve_and_track_markers() {
    let mut h = Harness::new(SessionConfig::default(), campus(3));
    let stats = h.session.statistics();

    let report = h.localize();
    assert_eq!(h.session.localization_state(), LocalizationState::Localized);
    let round = report.resolution.unwrap().unwrap();
    assert_eq!(round.dispatched, 3);
    assert_eq!(h.session.outstanding_requests(), 3);

    // Every request carries the rooftop offset.
    for request in h.service.requests() {
        assert_relative_eq!(request.altitude_above_rooftop, 15.24);
    }

    let ids = h.service.complete_all(RooftopAnchorState::Success);
    assert_eq!(ids.len(), 3);
    assert_eq!(h.session.registry().len(), 3);
    assert_eq!(h.scene.attached().len(), 3);
    assert_eq!(h.tracker.live_anchors(), 3);
    assert_eq!(h.session.outstanding_requests(), 0);

    // Anchor 12.5m in front of the viewer: scale 1.5 and a fresh label.
    h.service.push_frame(RemoteFrame {
        updated_anchors: vec![tracking_anchor(ids[0], Vector3::new(0.0, 0.0, -12.5))],
        ..tracking_frame(4.0, 8.0)
    });
    let report = h.tick(0.2);
    assert_eq!(report.updated, 1);

    let record = &h.session.registry().lookup(ids[0])[0];
    let update = h.scene.last_update(record.local.id).unwrap();
    assert_relative_eq!(update.scale, 1.5);
    assert_relative_eq!(update.relabel.unwrap(), 12.5);
    assert_relative_eq!(record.marker.scale(), 1.5);
    assert_relative_eq!(record.marker.position(), Vector3::new(0.0, 0.0, -12.5));

    // Statistics flowed once per tick that had a pose.
    let received: Vec<_> = stats.try_iter().collect();
    assert_eq!(received.len(), 3);
    assert!(matches!(received[0], SessionStatistics::Accuracy { .. }));
}

#[test]
fn test_label_only_refreshes_past_threshold() {
    let mut h = Harness::new(SessionConfig::default(), campus(1));
    h.localize();
    let id = h.service.complete_all(RooftopAnchorState::Success)[0];

    let mut relabels = Vec::new();
    for (i, distance) in [100.0, 102.0, 103.5].into_iter().enumerate() {
        h.service.push_frame(RemoteFrame {
            updated_anchors: vec![tracking_anchor(id, Vector3::new(0.0, 0.0, -distance))],
            ..tracking_frame(4.0, 8.0)
        });
        h.tick(1.0 + i as f64);
        let local = h.session.registry().lookup(id)[0].local.id;
        relabels.push(h.scene.last_update(local).unwrap().relabel);
    }

    assert_eq!(relabels[0], Some(100.0));
    assert_eq!(relabels[1], None);
    assert_eq!(relabels[2], Some(103.5));
}

#[test]
fn test_resolution_happens_once_across_regressions() {
    let mut h = Harness::new(SessionConfig::default(), campus(2));
    h.localize();

    for i in 0..5 {
        let base = 1.0 + i as f64;
        h.service.push_frame(tracking_frame(30.0, 40.0));
        h.service.push_frame(tracking_frame(4.0, 8.0));
        h.tick(base);
        let report = h.tick(base + 0.5);
        assert_eq!(h.session.localization_state(), LocalizationState::Localized);
        assert!(report.resolution.is_none());
    }

    assert_eq!(h.service.requests().len(), 2);
}

#[test]
fn test_round_over_ceiling_is_refused_until_catalog_fits() {
    let mut config = SessionConfig::default();
    config.resolution.max_outstanding_anchors = 2;
    let mut h = Harness::new(config, campus(3));

    let report = h.localize();
    let err = report.resolution.unwrap().unwrap_err();
    assert_eq!(
        err,
        ResolveError::ResourceExhausted {
            requested: 3,
            available: 2,
            ceiling: 2
        }
    );
    assert!(err.to_string().contains("clear anchors to continue"));
    assert!(h.service.requests().is_empty());

    // Disarmed until the host acts.
    h.service.push_frame(tracking_frame(4.0, 8.0));
    assert!(h.tick(0.2).resolution.is_none());

    h.session.set_catalog(campus(2));
    h.service.push_frame(tracking_frame(4.0, 8.0));
    let round = h.tick(0.3).resolution.unwrap().unwrap();
    assert_eq!(round.dispatched, 2);
}

#[test]
fn test_replacing_catalog_detaches_everything() {
    let mut h = Harness::new(SessionConfig::default(), campus(3));
    h.localize();
    h.service.complete_all(RooftopAnchorState::Success);
    assert_eq!(h.scene.attached().len(), 3);

    h.session.set_catalog(campus(1));
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());
    assert_eq!(h.scene.detached(), 3);
    assert_eq!(h.tracker.live_anchors(), 0);

    // Still localized: the new catalog resolves on the next tick.
    h.service.push_frame(tracking_frame(4.0, 8.0));
    let round = h.tick(0.5).resolution.unwrap().unwrap();
    assert_eq!(round.dispatched, 1);
    h.service.complete_all(RooftopAnchorState::Success);
    assert_eq!(h.session.registry().len(), 1);
}

#[test]
fn test_completions_after_pause_are_ignored() {
    let mut h = Harness::new(SessionConfig::default(), campus(2));
    h.localize();
    h.service.complete_next(RooftopAnchorState::Success);
    assert_eq!(h.session.registry().len(), 1);

    h.session.pause();
    assert!(!h.session.is_active());
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());

    h.service.complete_all(RooftopAnchorState::Success);
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());
    assert_eq!(h.tracker.live_anchors(), 0);
    assert_eq!(h.session.outstanding_requests(), 0);

    // Paused sessions skip ticks entirely.
    assert!(h.tick(1.0).skipped());

    // Running again starts localization over and resolves afresh.
    h.session.run();
    assert_eq!(h.session.localization_state(), LocalizationState::Pretracking);
    h.service.push_frame(tracking_frame(4.0, 8.0));
    h.service.push_frame(tracking_frame(4.0, 8.0));
    h.tick(2.0);
    let round = h.tick(2.1).resolution.unwrap().unwrap();
    assert_eq!(round.dispatched, 2);
}

#[test]
fn test_clear_anchors_recovers_from_refused_round() {
    let mut config = SessionConfig::default();
    config.resolution.max_outstanding_anchors = 4;
    let mut h = Harness::new(config, campus(3));

    h.localize();
    h.service.complete_next(RooftopAnchorState::Success);
    assert_eq!(h.session.registry().len(), 1);
    assert_eq!(h.session.outstanding_requests(), 2);

    // Two requests of the old catalog are still in flight.
    h.session.set_catalog(campus(3));
    h.service.push_frame(tracking_frame(4.0, 8.0));
    let err = h.tick(0.2).resolution.unwrap().unwrap_err();
    assert_eq!(
        err,
        ResolveError::ResourceExhausted {
            requested: 3,
            available: 2,
            ceiling: 4
        }
    );

    // Late completions free their capacity but do not place anchors.
    h.service.complete_all(RooftopAnchorState::Success);
    assert_eq!(h.session.outstanding_requests(), 0);
    h.service.push_frame(tracking_frame(4.0, 8.0));
    assert!(h.tick(0.3).resolution.is_none());

    assert_eq!(h.session.clear_anchors(), 0);
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());
    assert_eq!(h.tracker.live_anchors(), 0);

    h.service.push_frame(tracking_frame(4.0, 8.0));
    let round = h.tick(0.4).resolution.unwrap().unwrap();
    assert_eq!(round.dispatched, 3);
    h.service.complete_all(RooftopAnchorState::Success);
    assert_eq!(h.session.registry().len(), 3);

    // Clearing placed anchors detaches every marker.
    assert_eq!(h.session.clear_anchors(), 3);
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());
    assert_eq!(h.tracker.live_anchors(), 0);
}

#[test]
fn test_shutdown_detaches_anchors() {
    let mut h = Harness::new(SessionConfig::default(), campus(2));
    h.localize();
    h.service.complete_all(RooftopAnchorState::Success);
    assert_eq!(h.scene.attached().len(), 2);

    h.session.shutdown();
    assert!(!h.session.is_active());
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());
    assert_eq!(h.tracker.live_anchors(), 0);

    // A pause after shutdown has nothing left to do.
    h.session.pause();
    h.session.shutdown();
    assert_eq!(h.scene.detached(), 2);
}

#[test]
fn test_dropping_session_detaches_anchors() {
    let mut h = Harness::new(SessionConfig::default(), campus(2));
    h.localize();
    h.service.complete_all(RooftopAnchorState::Success);

    let Harness {
        session,
        scene,
        tracker,
        ..
    } = h;
    assert_eq!(scene.attached().len(), 2);

    drop(session);
    assert!(scene.attached().is_empty());
    assert_eq!(tracker.live_anchors(), 0);
    assert_eq!(tracker.removed(), 2);
}

#[test]
fn test_failed_anchor_is_absent_and_counted() {
    let mut h = Harness::new(SessionConfig::default(), campus(3));
    h.localize();

    h.service.complete_next(RooftopAnchorState::ErrorNotAuthorized);
    h.service.complete_next(RooftopAnchorState::Success);
    // Reported success but the anchor is not tracking.
    let mut anchor = tracking_anchor(
        geoanchor::registry::RemoteAnchorId::new_v4(),
        Vector3::zeros(),
    );
    anchor.tracking_state = AnchorTrackingState::Stopped;
    h.service.complete_next_with(Some(anchor), RooftopAnchorState::Success);

    assert_eq!(h.session.registry().len(), 1);
    assert_eq!(h.session.failed_anchors(), 2);
    assert_eq!(h.session.resolved_anchors(), 1);
}

#[test]
fn test_frame_sync_failure_changes_nothing() {
    let mut h = Harness::new(SessionConfig::default(), campus(1));
    let stats = h.session.statistics();

    h.service.push_frame(tracking_frame(30.0, 40.0));
    h.tick(0.0);
    assert_eq!(h.session.localization_state(), LocalizationState::Localizing);
    let before = stats.try_iter().count();

    h.service.push_error(FrameSyncError::FrameOutOfOrder);
    let report = h.tick(200.0);
    assert!(report.skipped());
    // The timeout did not fire on the skipped tick.
    assert_eq!(h.session.localization_state(), LocalizationState::Localizing);
    assert_eq!(before, 1);
    assert_eq!(stats.try_iter().count(), 0);
}

#[test]
fn test_localizing_times_out() {
    let mut h = Harness::new(SessionConfig::default(), campus(1));
    let stats = h.session.statistics();

    h.service.set_default_frame(tracking_frame(30.0, 40.0));
    h.tick(0.0);
    h.tick(179.0);
    assert_eq!(h.session.localization_state(), LocalizationState::Localizing);

    h.tick(180.0);
    assert_eq!(h.session.localization_state(), LocalizationState::Failed);
    let last = stats.try_iter().last().unwrap();
    assert_eq!(last, SessionStatistics::Error("Localization Failed".into()));

    // Terminal: good accuracy no longer helps.
    h.service.set_default_frame(tracking_frame(1.0, 1.0));
    h.tick(181.0);
    h.tick(182.0);
    assert_eq!(h.session.localization_state(), LocalizationState::Failed);
    assert!(h.service.requests().is_empty());
}

#[test]
fn test_paused_earth_tracking_reports_not_tracking() {
    let mut h = Harness::new(SessionConfig::default(), campus(1));
    let stats = h.session.statistics();

    h.service.push_frame(paused_frame());
    h.tick(0.0);
    assert_eq!(h.session.localization_state(), LocalizationState::Pretracking);
    assert_eq!(
        stats.try_recv().unwrap(),
        SessionStatistics::Error("Not Tracking Environment".into())
    );
}

#[test]
fn test_configuration_error_fails_session() {
    let service = ScriptedPositioningService::new();
    service.fail_configure(SessionError::LocationPermissionNotGranted);
    let mut h = Harness::with_service(SessionConfig::default(), campus(1), service);

    assert_eq!(h.session.localization_state(), LocalizationState::Failed);
    assert_eq!(
        h.session.last_error(),
        Some(&SessionError::LocationPermissionNotGranted)
    );

    h.service.set_default_frame(tracking_frame(1.0, 1.0));
    let report = h.tick(0.0);
    assert_eq!(report.outcome.unwrap().current, LocalizationState::Failed);
    assert!(report.resolution.is_none());
}

#[test]
fn test_removed_and_stopped_anchors_are_pruned() {
    let mut h = Harness::new(SessionConfig::default(), campus(2));
    h.localize();
    let ids = h.service.complete_all(RooftopAnchorState::Success);

    let mut stopped = tracking_anchor(ids[1], Vector3::zeros());
    stopped.tracking_state = AnchorTrackingState::Stopped;
    h.service.push_frame(RemoteFrame {
        removed_anchors: vec![ids[0]],
        updated_anchors: vec![stopped],
        ..tracking_frame(4.0, 8.0)
    });

    let report = h.tick(1.0);
    assert_eq!(report.pruned, 2);
    assert!(h.session.registry().is_empty());
    assert!(h.scene.attached().is_empty());
    assert_eq!(h.tracker.removed(), 2);
}

#[test]
fn test_vps_availability_published() {
    let service = ScriptedPositioningService::new();
    service.set_vps_availability(VpsAvailability::Available);
    let h = Harness::with_service(SessionConfig::default(), campus(1), service);

    let events = h.session.vps_events();
    h.session.offer_location(GeoCoordinate::new(33.1284, -117.1597));

    assert_eq!(events.recv_timeout(Duration::from_secs(2)), Ok(true));
    assert!(h.session.vps_available());
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = SessionConfig::default();
    config.localization.horizontal_low = 30.0;

    let result = GeospatialSession::new(
        config,
        campus(1),
        Arc::new(ScriptedPositioningService::new()),
        Arc::new(RecordingTracker::default()),
        Arc::new(RecordingScene::default()),
    );
    assert!(result.is_err());
}

//! Simulated positioning backend for the demo binary.
//!
//! The local tracking world is taken to coincide with the east-up-south
//! frame at `origin`, so camera poses map straight onto geographic fixes.
//! Accuracy decays exponentially from its initial to its final value after
//! a warm-up period during which earth tracking stays paused. Rooftop
//! anchors resolve on their own threads after a jittered delay and some of
//! them fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nalgebra::{Matrix4, Vector3};
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::error::{FrameSyncError, RooftopAnchorState, SessionError};
use crate::geometry::{GeoCoordinate, SE3};
use crate::localization::{EarthFrame, EarthState, EarthTrackingState, GeospatialPose};
use crate::registry::{AnchorTrackingState, RemoteAnchor, RemoteAnchorId};

use super::{
    LocalFrame, PositioningService, RemoteFrame, RooftopCompletion, RooftopRequest,
    VpsAvailability, VpsCompletion,
};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Geographic position of the local tracking origin.
    pub origin: GeoCoordinate,
    /// Ellipsoid altitude of the local tracking origin, meters.
    pub origin_altitude: f64,
    /// Height assumed for every rooftop, meters above the origin.
    pub rooftop_height: f64,
    /// Earth tracking stays paused this long after the first frame.
    pub warmup: Duration,
    /// Time constant of the accuracy decay.
    pub convergence: Duration,
    pub initial_horizontal: f64,
    pub final_horizontal: f64,
    pub initial_yaw: f64,
    pub final_yaw: f64,
    /// Mean time from request to completion.
    pub resolve_delay: Duration,
    pub failure_probability: f64,
    pub frame_drop_probability: f64,
    /// VPS is reported available within this distance of `origin`, meters.
    pub vps_radius: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            origin: GeoCoordinate::new(33.128_446, -117.159_685),
            origin_altitude: 180.0,
            rooftop_height: 12.0,
            warmup: Duration::from_secs(1),
            convergence: Duration::from_secs(6),
            initial_horizontal: 45.0,
            final_horizontal: 2.5,
            initial_yaw: 50.0,
            final_yaw: 4.0,
            resolve_delay: Duration::from_millis(400),
            failure_probability: 0.1,
            frame_drop_probability: 0.02,
            vps_radius: 2_000.0,
        }
    }
}

pub struct SimulatedPositioningService {
    config: SimulationConfig,
    first_frame: Mutex<Option<Instant>>,
    last_frame: Mutex<Option<Instant>>,
    anchors: Arc<Mutex<HashMap<RemoteAnchorId, Matrix4<f64>>>>,
}

impl SimulatedPositioningService {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            first_frame: Mutex::new(None),
            last_frame: Mutex::new(None),
            anchors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Local translation of a rooftop anchor for `request`.
    pub fn local_position(&self, request: &RooftopRequest) -> Vector3<f64> {
        let (east, north) = request.coordinate.east_north_from(&self.config.origin);
        Vector3::new(
            east,
            self.config.rooftop_height + request.altitude_above_rooftop,
            -north,
        )
    }

    /// Horizontal and yaw accuracy `elapsed` after the first frame, or
    /// `None` while still warming up.
    pub fn accuracy_at(&self, elapsed: Duration) -> Option<(f64, f64)> {
        let c = &self.config;
        let converging = elapsed.checked_sub(c.warmup)?;
        let k = (-converging.as_secs_f64() / c.convergence.as_secs_f64().max(1e-3)).exp();
        Some((
            c.final_horizontal + (c.initial_horizontal - c.final_horizontal) * k,
            c.final_yaw + (c.initial_yaw - c.final_yaw) * k,
        ))
    }

    fn earth_frame(&self, frame: &LocalFrame, elapsed: Duration) -> EarthFrame {
        let Some((horizontal, yaw)) = self.accuracy_at(elapsed) else {
            return EarthFrame {
                earth_state: EarthState::Enabled,
                tracking_state: EarthTrackingState::Paused,
                camera_pose: None,
            };
        };

        let p = frame.camera_pose.translation;
        EarthFrame {
            earth_state: EarthState::Enabled,
            tracking_state: EarthTrackingState::Tracking,
            camera_pose: Some(GeospatialPose {
                coordinate: self.config.origin.offset_by(p.x, -p.z),
                altitude: self.config.origin_altitude + p.y,
                eus_rotation: frame.camera_pose.rotation,
                horizontal_accuracy: horizontal,
                vertical_accuracy: horizontal * 0.6,
                orientation_yaw_accuracy: yaw,
            }),
        }
    }
}

impl PositioningService for SimulatedPositioningService {
    fn configure(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn update_frame(&self, frame: &LocalFrame) -> Result<RemoteFrame, FrameSyncError> {
        {
            let mut last = self.last_frame.lock();
            if last.is_some_and(|t| frame.timestamp < t) {
                return Err(FrameSyncError::FrameOutOfOrder);
            }
            *last = Some(frame.timestamp);
        }

        if rand::thread_rng().gen_bool(self.config.frame_drop_probability.clamp(0.0, 1.0)) {
            return Err(FrameSyncError::Unavailable("simulated dropout".into()));
        }

        let start = *self.first_frame.lock().get_or_insert(frame.timestamp);
        let elapsed = frame.timestamp.saturating_duration_since(start);

        let updated_anchors = self
            .anchors
            .lock()
            .iter()
            .map(|(id, transform)| RemoteAnchor {
                id: *id,
                transform: *transform,
                tracking_state: AnchorTrackingState::Tracking,
            })
            .collect();

        Ok(RemoteFrame {
            earth: Some(self.earth_frame(frame, elapsed)),
            updated_anchors,
            removed_anchors: Vec::new(),
        })
    }

    fn create_rooftop_anchor(
        &self,
        request: RooftopRequest,
        completion: RooftopCompletion,
    ) -> Result<(), SessionError> {
        if !request.coordinate.is_valid() {
            return Err(SessionError::InvalidArgument);
        }

        let pose = SE3 {
            rotation: *request.alignment.quaternion(),
            translation: self.local_position(&request),
        };
        let anchors = Arc::clone(&self.anchors);
        let mean_delay = self.config.resolve_delay;
        let failure_probability = self.config.failure_probability.clamp(0.0, 1.0);

        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            thread::sleep(mean_delay.mul_f64(rng.gen_range(0.5..1.5)));

            if rng.gen_bool(failure_probability) {
                completion(None, RooftopAnchorState::ErrorUnsupportedLocation);
                return;
            }

            let anchor = RemoteAnchor {
                id: RemoteAnchorId::new_v4(),
                transform: pose.to_homogeneous(),
                tracking_state: AnchorTrackingState::Tracking,
            };
            anchors.lock().insert(anchor.id, anchor.transform);
            debug!(anchor = %anchor.id, coordinate = %request.coordinate, "simulated rooftop anchor resolved");
            completion(Some(anchor), RooftopAnchorState::Success);
        });
        Ok(())
    }

    fn check_vps_availability(&self, coordinate: GeoCoordinate, completion: VpsCompletion) {
        let availability = if coordinate.distance_to(&self.config.origin) <= self.config.vps_radius {
            VpsAvailability::Available
        } else {
            VpsAvailability::Unavailable
        };
        completion(availability);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PoseAlignment;
    use approx::assert_relative_eq;
    use crossbeam_channel::bounded;

    fn quiet() -> SimulationConfig {
        SimulationConfig {
            failure_probability: 0.0,
            frame_drop_probability: 0.0,
            resolve_delay: Duration::from_millis(10),
            ..SimulationConfig::default()
        }
    }

    fn frame_at(t: Instant) -> LocalFrame {
        LocalFrame {
            timestamp: t,
            camera_pose: SE3::identity(),
        }
    }

    #[test]
    fn test_accuracy_converges_after_warmup() {
        let service = SimulatedPositioningService::new(quiet());
        assert!(service.accuracy_at(Duration::from_millis(500)).is_none());

        let (h0, y0) = service.accuracy_at(Duration::from_secs(1)).unwrap();
        assert_relative_eq!(h0, 45.0);
        assert_relative_eq!(y0, 50.0);

        let (h, y) = service.accuracy_at(Duration::from_secs(60)).unwrap();
        assert!(h < 3.0 && y < 5.0);
    }

    #[test]
    fn test_frames_pause_then_track() {
        let service = SimulatedPositioningService::new(quiet());
        let t0 = Instant::now();

        let first = service.update_frame(&frame_at(t0)).unwrap();
        assert_eq!(first.earth.unwrap().tracking_state, EarthTrackingState::Paused);

        let later = service.update_frame(&frame_at(t0 + Duration::from_secs(2))).unwrap();
        let earth = later.earth.unwrap();
        assert_eq!(earth.tracking_state, EarthTrackingState::Tracking);
        assert!(earth.camera_pose.is_some());

        let stale = service.update_frame(&frame_at(t0));
        assert_eq!(stale.unwrap_err(), FrameSyncError::FrameOutOfOrder);
    }

    #[test]
    fn test_rooftop_anchor_resolves_asynchronously() {
        let service = SimulatedPositioningService::new(quiet());
        let origin = service.config().origin;
        let request = RooftopRequest {
            coordinate: origin.offset_by(30.0, 40.0),
            altitude_above_rooftop: 15.24,
            alignment: PoseAlignment::identity(),
        };
        let expected = service.local_position(&request);

        let (tx, rx) = bounded(1);
        service
            .create_rooftop_anchor(
                request,
                Box::new(move |anchor: Option<RemoteAnchor>, state: RooftopAnchorState| {
                    let _ = tx.send((anchor, state));
                }),
            )
            .unwrap();

        let (anchor, state) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(state, RooftopAnchorState::Success);
        let anchor = anchor.unwrap();
        let p = crate::geometry::translation_of(&anchor.transform);
        assert_relative_eq!(p, expected, epsilon = 1e-9);
        assert_relative_eq!(p.x, 30.0, epsilon = 1e-3);
        assert_relative_eq!(p.z, -40.0, epsilon = 1e-3);

        // The resolved anchor is reported on every following frame.
        let frame = service.update_frame(&frame_at(Instant::now())).unwrap();
        assert_eq!(frame.updated_anchors.len(), 1);
    }
}

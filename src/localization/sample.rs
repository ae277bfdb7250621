//! Per-tick inputs to the localization state machine.

use nalgebra::UnitQuaternion;

use crate::geometry::{GeoCoordinate, PoseAlignment};

/// Health of the geospatial ("earth") subsystem of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarthState {
    Enabled,
    ErrorInternal,
    ErrorNotAuthorized,
    ErrorResourcesExhausted,
}

impl EarthState {
    /// Any non-enabled earth state ends the session.
    pub fn is_unrecoverable(self) -> bool {
        self != Self::Enabled
    }
}

impl std::fmt::Display for EarthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enabled => "Enabled",
            Self::ErrorInternal => "Internal Error",
            Self::ErrorNotAuthorized => "Not Authorized",
            Self::ErrorResourcesExhausted => "Resources Exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarthTrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Camera pose resolved in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GeospatialPose {
    pub coordinate: GeoCoordinate,
    /// Meters above the WGS84 ellipsoid.
    pub altitude: f64,
    /// Camera orientation in the east-up-south frame.
    pub eus_rotation: UnitQuaternion<f64>,
    /// Meters.
    pub horizontal_accuracy: f64,
    /// Meters.
    pub vertical_accuracy: f64,
    /// Degrees.
    pub orientation_yaw_accuracy: f64,
}

impl GeospatialPose {
    pub fn accuracy(&self) -> AccuracySample {
        AccuracySample {
            horizontal: self.horizontal_accuracy,
            vertical: self.vertical_accuracy,
            yaw: self.orientation_yaw_accuracy,
        }
    }

    pub fn alignment(&self) -> PoseAlignment {
        PoseAlignment(self.eus_rotation)
    }
}

/// Accuracy figures taken from a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracySample {
    pub horizontal: f64,
    pub vertical: f64,
    pub yaw: f64,
}

/// Earth portion of a remote frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EarthFrame {
    pub earth_state: EarthState,
    pub tracking_state: EarthTrackingState,
    pub camera_pose: Option<GeospatialPose>,
}

/// What the state machine consumes each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalizationInput {
    pub earth_state: EarthState,
    pub tracking: bool,
    /// `None` when no valid geospatial pose is available this tick.
    pub sample: Option<AccuracySample>,
}

impl LocalizationInput {
    pub fn tracking(sample: Option<AccuracySample>) -> Self {
        Self {
            earth_state: EarthState::Enabled,
            tracking: true,
            sample,
        }
    }

    pub fn not_tracking() -> Self {
        Self {
            earth_state: EarthState::Enabled,
            tracking: false,
            sample: None,
        }
    }

    pub fn error(earth_state: EarthState) -> Self {
        Self {
            earth_state,
            tracking: false,
            sample: None,
        }
    }
}

impl From<&EarthFrame> for LocalizationInput {
    fn from(earth: &EarthFrame) -> Self {
        let tracking = earth.tracking_state == EarthTrackingState::Tracking;
        Self {
            earth_state: earth.earth_state,
            tracking,
            sample: if tracking {
                earth.camera_pose.as_ref().map(GeospatialPose::accuracy)
            } else {
                None
            },
        }
    }
}

impl AccuracySample {
    pub fn new(horizontal: f64, yaw: f64) -> Self {
        Self {
            horizontal,
            vertical: horizontal,
            yaw,
        }
    }
}

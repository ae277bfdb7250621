//! Per-tick session statistics for the status overlay.

use crate::localization::{EarthFrame, EarthTrackingState, LocalizationState};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatistics {
    Accuracy {
        /// Horizontal accuracy, meters.
        location: f64,
        /// Vertical accuracy, meters.
        altitude: f64,
        /// Yaw accuracy, degrees.
        orientation: f64,
    },
    Error(String),
}

impl SessionStatistics {
    /// Statistics for one successful tick, or `None` when there is nothing
    /// to report yet.
    pub fn from_tick(state: LocalizationState, earth: Option<&EarthFrame>) -> Option<Self> {
        if state == LocalizationState::Failed {
            return Some(Self::Error("Localization Failed".into()));
        }
        let earth = earth?;
        if earth.tracking_state == EarthTrackingState::Paused {
            return Some(Self::Error("Not Tracking Environment".into()));
        }
        earth.camera_pose.as_ref().map(|pose| Self::Accuracy {
            location: pose.horizontal_accuracy,
            altitude: pose.vertical_accuracy,
            orientation: pose.orientation_yaw_accuracy,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn location_label(&self) -> String {
        match self {
            Self::Accuracy { location, .. } => format!("{location:.2}m\nLocation Accuracy"),
            Self::Error(_) => "Unknown\nLocation Accuracy".into(),
        }
    }

    pub fn altitude_label(&self) -> String {
        match self {
            Self::Accuracy { altitude, .. } => format!("{altitude:.2}m\nAltitude Accuracy"),
            Self::Error(_) => "Unknown\nAltitude Accuracy".into(),
        }
    }

    pub fn orientation_label(&self) -> String {
        match self {
            Self::Accuracy { orientation, .. } => {
                format!("{orientation:.2}°\nCompass Direction Accuracy")
            }
            Self::Error(_) => "Unknown\nDirection Accuracy".into(),
        }
    }

    pub fn error_label(&self) -> String {
        match self {
            Self::Error(message) => format!("Error: {message}"),
            Self::Accuracy { .. } => "Unknown Error".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoCoordinate;
    use crate::localization::{EarthState, GeospatialPose};
    use nalgebra::UnitQuaternion;

    fn earth(tracking_state: EarthTrackingState, with_pose: bool) -> EarthFrame {
        EarthFrame {
            earth_state: EarthState::Enabled,
            tracking_state,
            camera_pose: with_pose.then(|| GeospatialPose {
                coordinate: GeoCoordinate::new(33.128, -117.159),
                altitude: 180.0,
                eus_rotation: UnitQuaternion::identity(),
                horizontal_accuracy: 12.345,
                vertical_accuracy: 3.0,
                orientation_yaw_accuracy: 7.5,
            }),
        }
    }

    #[test]
    fn test_failed_state_wins() {
        let frame = earth(EarthTrackingState::Tracking, true);
        let stats = SessionStatistics::from_tick(LocalizationState::Failed, Some(&frame)).unwrap();
        assert_eq!(stats, SessionStatistics::Error("Localization Failed".into()));
        assert_eq!(stats.error_label(), "Error: Localization Failed");
        assert_eq!(stats.location_label(), "Unknown\nLocation Accuracy");
    }

    #[test]
    fn test_paused_tracking_reports_error() {
        let frame = earth(EarthTrackingState::Paused, true);
        let stats =
            SessionStatistics::from_tick(LocalizationState::Pretracking, Some(&frame)).unwrap();
        assert_eq!(stats, SessionStatistics::Error("Not Tracking Environment".into()));
    }

    #[test]
    fn test_pose_reports_accuracy_labels() {
        let frame = earth(EarthTrackingState::Tracking, true);
        let stats =
            SessionStatistics::from_tick(LocalizationState::Localizing, Some(&frame)).unwrap();
        assert!(!stats.is_error());
        assert_eq!(stats.location_label(), "12.35m\nLocation Accuracy");
        assert_eq!(stats.altitude_label(), "3.00m\nAltitude Accuracy");
        assert_eq!(stats.orientation_label(), "7.50°\nCompass Direction Accuracy");
    }

    #[test]
    fn test_nothing_to_report() {
        let frame = earth(EarthTrackingState::Tracking, false);
        assert!(SessionStatistics::from_tick(LocalizationState::Localizing, Some(&frame)).is_none());
        assert!(SessionStatistics::from_tick(LocalizationState::Pretracking, None).is_none());
    }
}

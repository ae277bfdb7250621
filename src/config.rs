//! Session configuration.
//!
//! Defaults reproduce the production tuning; a JSON file may override any
//! subset of fields.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Hysteresis bounds and timeout for the localization state machine.
///
/// The low bounds must be met to enter `Localized`; only exceeding the high
/// bounds drops back to `Localizing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationThresholds {
    /// Meters.
    pub horizontal_low: f64,
    /// Meters.
    pub horizontal_high: f64,
    /// Degrees.
    pub yaw_low: f64,
    /// Degrees.
    pub yaw_high: f64,
    /// Time allowed in `Localizing` before giving up.
    #[serde(with = "secs_f64")]
    pub failure_timeout: Duration,
}

impl Default for LocalizationThresholds {
    fn default() -> Self {
        Self {
            horizontal_low: 10.0,
            horizontal_high: 20.0,
            yaw_low: 15.0,
            yaw_high: 25.0,
            failure_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Hard ceiling on rooftop/terrain anchors per session.
    pub max_outstanding_anchors: usize,
    /// Meters above the resolved rooftop (50 ft).
    pub altitude_above_rooftop: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_outstanding_anchors: 100,
            altitude_above_rooftop: 15.24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Markers closer than this render at 1.0x.
    pub near_distance: f64,
    /// Markers farther than this render at 2.0x.
    pub far_distance: f64,
    /// Minimum change in viewer distance before the label is re-rendered (10 ft).
    pub label_update_threshold: f64,
    /// Marker card width in meters (40 ft).
    pub marker_width: f64,
}

impl MarkerConfig {
    /// Height/width ratio of the marker card artwork.
    pub const ASPECT_RATIO: f64 = 0.2877697842;

    pub fn marker_height(&self) -> f64 {
        (self.marker_width * Self::ASPECT_RATIO).round()
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            near_distance: 5.0,
            far_distance: 20.0,
            label_update_threshold: 3.048,
            marker_width: 12.19,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VpsConfig {
    /// At most one location fix is checked per window.
    #[serde(with = "secs_f64")]
    pub debounce_window: Duration,
}

impl Default for VpsConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(5),
        }
    }
}

/// Top-level configuration for a [`crate::system::GeospatialSession`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub localization: LocalizationThresholds,
    pub resolution: ResolutionConfig,
    pub marker: MarkerConfig,
    pub vps: VpsConfig,
}

impl SessionConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading session config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing session config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds the state machine or marker scaling cannot work with.
    /// Comparisons are written in their positive form so NaN never passes.
    pub fn validate(&self) -> Result<()> {
        let loc = &self.localization;
        if !(loc.horizontal_low > 0.0 && loc.horizontal_low <= loc.horizontal_high) {
            bail!(
                "horizontal bounds must satisfy 0 < low ({}) <= high ({})",
                loc.horizontal_low,
                loc.horizontal_high
            );
        }
        if !(loc.yaw_low > 0.0 && loc.yaw_low <= loc.yaw_high) {
            bail!(
                "yaw bounds must satisfy 0 < low ({}) <= high ({})",
                loc.yaw_low,
                loc.yaw_high
            );
        }
        if self.resolution.max_outstanding_anchors == 0 {
            bail!("max_outstanding_anchors must be positive");
        }
        if !self.resolution.altitude_above_rooftop.is_finite() {
            bail!(
                "altitude_above_rooftop must be finite, got {}",
                self.resolution.altitude_above_rooftop
            );
        }
        let marker = &self.marker;
        if !(marker.near_distance > 0.0
            && marker.far_distance > marker.near_distance
            && marker.far_distance.is_finite())
        {
            bail!(
                "marker distance band must satisfy 0 < near ({}) < far ({})",
                marker.near_distance,
                marker.far_distance
            );
        }
        if !(marker.label_update_threshold >= 0.0 && marker.label_update_threshold.is_finite()) {
            bail!(
                "label_update_threshold must be a non-negative distance, got {}",
                marker.label_update_threshold
            );
        }
        Ok(())
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolution.max_outstanding_anchors, 100);
        assert_eq!(config.localization.failure_timeout, Duration::from_secs(180));
        assert_eq!(config.marker.marker_height(), 4.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "localization": { "yaw_high": 30.0 }, "vps": { "debounce_window": 2.5 } }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.localization.yaw_high, 30.0);
        assert_eq!(config.localization.horizontal_low, 10.0);
        assert_eq!(config.vps.debounce_window, Duration::from_millis(2500));
        assert_eq!(config.marker.label_update_threshold, 3.048);
    }

    #[test]
    fn test_inverted_hysteresis_rejected() {
        let mut config = SessionConfig::default();
        config.localization.horizontal_low = 30.0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.resolution.max_outstanding_anchors = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_bounds_rejected() {
        let mut config = SessionConfig::default();
        config.marker.near_distance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.marker.far_distance = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.marker.label_update_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.localization.horizontal_high = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.localization.yaw_low = f64::NAN;
        assert!(config.validate().is_err());
    }
}

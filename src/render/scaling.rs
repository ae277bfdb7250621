//! Distance-based marker scaling.

use crate::config::MarkerConfig;

/// Linear scale band: 1.0x at or below `near`, 2.0x at or beyond `far`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBand {
    pub near: f64,
    pub far: f64,
}

impl ScaleBand {
    pub fn new(near: f64, far: f64) -> Self {
        Self { near, far }
    }

    /// `1 + (clamp(d, near, far) - near) / (far - near)`
    #[inline]
    pub fn scale_for(&self, distance: f64) -> f64 {
        1.0 + (distance.clamp(self.near, self.far) - self.near) / (self.far - self.near)
    }
}

impl Default for ScaleBand {
    fn default() -> Self {
        Self::new(5.0, 20.0)
    }
}

impl From<&MarkerConfig> for ScaleBand {
    fn from(config: &MarkerConfig) -> Self {
        Self::new(config.near_distance, config.far_distance)
    }
}

/// Whether a label showing `last` should be re-rendered for `current`.
#[inline]
pub fn label_needs_update(last: f64, current: f64, threshold: f64) -> bool {
    (current - last).abs() >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scale_clamped_outside_band() {
        let band = ScaleBand::default();
        assert_eq!(band.scale_for(0.0), 1.0);
        assert_eq!(band.scale_for(5.0), 1.0);
        assert_eq!(band.scale_for(20.0), 2.0);
        assert_eq!(band.scale_for(250.0), 2.0);
    }

    #[test]
    fn test_scale_linear_inside_band() {
        let band = ScaleBand::default();
        assert_relative_eq!(band.scale_for(12.5), 1.5);
        assert_relative_eq!(band.scale_for(8.0), 1.2, epsilon = 1e-12);
        assert_relative_eq!(band.scale_for(17.0), 1.8, epsilon = 1e-12);
    }

    #[test]
    fn test_label_threshold() {
        assert!(!label_needs_update(100.0, 102.0, 3.048));
        assert!(label_needs_update(100.0, 103.5, 3.048));
        assert!(label_needs_update(100.0, 96.0, 3.048));
        assert!(label_needs_update(0.0, 3.048, 3.048));
    }
}

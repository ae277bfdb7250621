//! Location marker: the render proxy owned by each anchor record.

use nalgebra::{Matrix4, Vector3, Vector4};

use crate::catalog::LocationEntry;
use crate::config::MarkerConfig;
use crate::geometry::translation_of;

use super::scaling::{ScaleBand, label_needs_update};

/// Result of one per-frame transform update, handed to the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerUpdate {
    /// Final transform with uniform scale applied.
    pub transform: Matrix4<f64>,
    pub scale: f64,
    /// Viewer distance this frame, if a viewer was available.
    pub distance: Option<f64>,
    /// Set only when the distance label must be re-rendered.
    pub relabel: Option<f64>,
}

/// Billboard card representing a resolved location.
#[derive(Debug, Clone)]
pub struct LocationMarker {
    pub location_name: String,
    pub category_name: String,
    pub icon_url: Option<String>,
    pub width: f64,
    pub height: f64,
    transform: Matrix4<f64>,
    scale: f64,
    last_reported_distance: f64,
    band: ScaleBand,
    label_threshold: f64,
}

impl LocationMarker {
    pub fn new(entry: &LocationEntry, config: &MarkerConfig) -> Self {
        Self {
            location_name: entry.name.clone(),
            category_name: entry.category.name.clone(),
            icon_url: entry.category.icon_url.clone(),
            width: config.marker_width,
            height: config.marker_height(),
            transform: Matrix4::identity(),
            scale: 1.0,
            last_reported_distance: 0.0,
            band: ScaleBand::from(config),
            label_threshold: config.label_update_threshold,
        }
    }

    pub fn transform(&self) -> &Matrix4<f64> {
        &self.transform
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Distance currently shown on the label.
    pub fn last_reported_distance(&self) -> f64 {
        self.last_reported_distance
    }

    pub fn position(&self) -> Vector3<f64> {
        translation_of(&self.transform)
    }

    /// Place the marker at `anchor_transform`.
    ///
    /// With a viewer position the marker is scaled uniformly by distance and
    /// the label distance is refreshed once it drifts past the threshold.
    /// Without one the raw anchor transform is applied unscaled.
    pub fn update_transform(
        &mut self,
        anchor_transform: &Matrix4<f64>,
        viewer: Option<&Vector3<f64>>,
    ) -> MarkerUpdate {
        let Some(viewer) = viewer else {
            self.transform = *anchor_transform;
            self.scale = 1.0;
            return MarkerUpdate {
                transform: self.transform,
                scale: 1.0,
                distance: None,
                relabel: None,
            };
        };

        let distance = (translation_of(anchor_transform) - viewer).norm();

        let relabel = if label_needs_update(self.last_reported_distance, distance, self.label_threshold)
        {
            self.last_reported_distance = distance;
            Some(distance)
        } else {
            None
        };

        let scale = self.band.scale_for(distance);
        let diagonal = Matrix4::from_diagonal(&Vector4::new(scale, scale, scale, 1.0));
        self.transform = anchor_transform * diagonal;
        self.scale = scale;

        MarkerUpdate {
            transform: self.transform,
            scale,
            distance: Some(distance),
            relabel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use crate::geometry::{GeoCoordinate, SE3};
    use approx::assert_relative_eq;

    fn marker() -> LocationMarker {
        let entry = LocationEntry {
            id: 1,
            name: "Craven Hall".into(),
            category: Category {
                id: 3,
                name: "Administration".into(),
                icon_url: None,
            },
            coordinate: GeoCoordinate::new(33.1284, -117.1589),
        };
        LocationMarker::new(&entry, &MarkerConfig::default())
    }

    fn anchor_at(x: f64) -> Matrix4<f64> {
        SE3::from_translation(Vector3::new(x, 0.0, 0.0)).to_homogeneous()
    }

    #[test]
    fn test_scale_applied_to_rotation_block_only() {
        let mut m = marker();
        let viewer = Vector3::zeros();
        let update = m.update_transform(&anchor_at(12.5), Some(&viewer));

        assert_relative_eq!(update.scale, 1.5);
        assert_relative_eq!(update.transform[(0, 0)], 1.5);
        assert_relative_eq!(update.transform[(1, 1)], 1.5);
        assert_relative_eq!(update.transform[(2, 2)], 1.5);
        assert_relative_eq!(update.transform[(3, 3)], 1.0);
        // Translation untouched by the scale.
        assert_relative_eq!(m.position(), Vector3::new(12.5, 0.0, 0.0));
    }

    #[test]
    fn test_label_refresh_respects_threshold() {
        let mut m = marker();
        let viewer = Vector3::zeros();

        let first = m.update_transform(&anchor_at(100.0), Some(&viewer));
        assert_eq!(first.relabel, Some(100.0));

        let small_move = m.update_transform(&anchor_at(102.0), Some(&viewer));
        assert_eq!(small_move.relabel, None);
        assert_relative_eq!(m.last_reported_distance(), 100.0);

        let big_move = m.update_transform(&anchor_at(103.5), Some(&viewer));
        assert_eq!(big_move.relabel, Some(103.5));
    }

    #[test]
    fn test_without_viewer_applies_raw_transform() {
        let mut m = marker();
        let update = m.update_transform(&anchor_at(40.0), None);

        assert_eq!(update.scale, 1.0);
        assert_eq!(update.distance, None);
        assert_eq!(update.transform, anchor_at(40.0));
    }

    #[test]
    fn test_dimensions_from_config() {
        let m = marker();
        assert_relative_eq!(m.width, 12.19);
        assert_relative_eq!(m.height, 4.0);
        assert_eq!(m.category_name, "Administration");
    }
}

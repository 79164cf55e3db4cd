use crate::math::AABB;
use float_ord::FloatOrd;
use nalgebra::{Vector2, Vector3};
use std::iter::FromIterator;

/// Scanner attributes carried through the segmentation unchanged.
///
/// The segmentation core only ever reads the return number (the canopy
/// rasterizer keeps first returns); everything else is pass-through data that
/// ends up in the per-tree output clouds. Which attributes are present is
/// decided once when the cloud is ingested, not probed per call site.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointAttributes {
    pub return_number: Option<u8>,
    pub intensity: Option<u16>,
}

impl PointAttributes {
    /// True if this point is a first return. Points without return information
    /// are treated as first returns.
    pub fn is_first_return(&self) -> bool {
        self.return_number.map_or(true, |r| r == 1)
    }
}

/// A single laser point: position plus pass-through attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub position: Vector3<f64>,
    pub attributes: PointAttributes,
}

impl PlotPoint {
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            position,
            attributes: PointAttributes::default(),
        }
    }

    /// Planar (x, y) part of the position.
    pub fn planar(&self) -> Vector2<f64> {
        self.position.xy()
    }

    /// Height (z) of the point.
    pub fn height(&self) -> f64 {
        self.position.z
    }
}

/// An ordered, index-addressable collection of [`PlotPoint`]s.
///
/// All segmentation stages pass subsets of the plot around as `PointCloud`
/// values; selection is always by index so attributes travel with their
/// points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<PlotPoint>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<PlotPoint>) -> Self {
        Self { points }
    }

    /// Builds a cloud from bare positions with default (absent) attributes.
    pub fn from_positions<I: IntoIterator<Item = Vector3<f64>>>(positions: I) -> Self {
        Self {
            points: positions.into_iter().map(PlotPoint::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> &PlotPoint {
        &self.points[index]
    }

    pub fn position(&self, index: usize) -> Vector3<f64> {
        self.points[index].position
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlotPoint> {
        self.points.iter()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vector3<f64>> + '_ {
        self.points.iter().map(|p| p.position)
    }

    pub fn push(&mut self, point: PlotPoint) {
        self.points.push(point);
    }

    /// Appends all points of `other`, preserving their order and attributes.
    pub fn extend_from(&mut self, other: &PointCloud) {
        self.points.extend_from_slice(&other.points);
    }

    /// The axis-aligned extent of the cloud, or `None` if it is empty.
    pub fn bounds(&self) -> Option<AABB> {
        AABB::from_positions(self.positions())
    }

    /// Height of the highest point, or `None` if the cloud is empty.
    pub fn max_height(&self) -> Option<f64> {
        self.points
            .iter()
            .map(|p| p.position.z)
            .max_by_key(|&z| FloatOrd(z))
    }

    /// Height of the lowest point, or `None` if the cloud is empty.
    pub fn min_height(&self) -> Option<f64> {
        self.points
            .iter()
            .map(|p| p.position.z)
            .min_by_key(|&z| FloatOrd(z))
    }

    /// A new cloud with the points at the given indices, in the given order.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        PointCloud {
            points: indices.iter().map(|&i| self.points[i]).collect(),
        }
    }

    /// A new cloud with the points for which `keep` returns true.
    pub fn filter<F: FnMut(&PlotPoint) -> bool>(&self, mut keep: F) -> PointCloud {
        PointCloud {
            points: self.points.iter().filter(|p| keep(p)).copied().collect(),
        }
    }
}

impl FromIterator<PlotPoint> for PointCloud {
    fn from_iter<I: IntoIterator<Item = PlotPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a PlotPoint;
    type IntoIter = std::slice::Iter<'a, PlotPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cloud() -> PointCloud {
        PointCloud::from_positions(vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 2.0, 5.0),
            Vector3::new(-1.0, 0.5, 3.0),
        ])
    }

    #[test]
    fn select_preserves_order_and_attributes() {
        let mut cloud = sample_cloud();
        cloud.points[1].attributes.return_number = Some(2);
        let selected = cloud.select(&[2, 1]);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.position(0), Vector3::new(-1.0, 0.5, 3.0));
        assert_eq!(selected.point(1).attributes.return_number, Some(2));
    }

    #[test]
    fn bounds_and_heights() {
        let cloud = sample_cloud();
        let bounds = cloud.bounds().unwrap();
        assert_eq!(bounds.min().z, 1.0);
        assert_eq!(bounds.max().z, 5.0);
        assert_eq!(cloud.max_height(), Some(5.0));
        assert_eq!(cloud.min_height(), Some(1.0));
        assert_eq!(PointCloud::new().max_height(), None);
    }

    #[test]
    fn extend_from_concatenates() {
        let mut a = sample_cloud();
        let b = PointCloud::from_positions(vec![Vector3::new(9.0, 9.0, 9.0)]);
        a.extend_from(&b);
        assert_eq!(a.len(), 4);
        assert_eq!(a.position(3), Vector3::new(9.0, 9.0, 9.0));
    }

    #[test]
    fn missing_return_number_counts_as_first_return() {
        let attrs = PointAttributes::default();
        assert!(attrs.is_first_return());
        let second = PointAttributes {
            return_number: Some(2),
            ..Default::default()
        };
        assert!(!second.is_first_return());
    }
}

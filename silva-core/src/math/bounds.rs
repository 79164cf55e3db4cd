use nalgebra::{Point3, Vector3};

/// 3D axis-aligned bounding box over `f64` coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl AABB {
    /// Creates a new AABB from the given minimum and maximum coordinates.
    /// Panics if the minimum position is not less than or equal to the maximum
    /// position
    pub fn from_min_max(min: Point3<f64>, max: Point3<f64>) -> Self {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            panic!("AABB::from_min_max: minimum position must be <= maximum position");
        }
        Self { min, max }
    }

    /// Computes the bounding box of an iterator of positions. Returns `None`
    /// for an empty iterator.
    pub fn from_positions<I: IntoIterator<Item = Vector3<f64>>>(positions: I) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        let mut min = Point3::new(first.x, first.y, first.z);
        let mut max = min;
        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some(Self { min, max })
    }

    /// Returns the minimum point of this AABB
    pub fn min(&self) -> &Point3<f64> {
        &self.min
    }

    /// Returns the maximum point of this AABB
    pub fn max(&self) -> &Point3<f64> {
        &self.max
    }

    /// Returns the extent of this AABB, i.e. the size between the minimum and
    /// maximum position
    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Returns true if the given position lies within this AABB. Positions
    /// right on the boundary count as contained.
    pub fn contains(&self, position: &Vector3<f64>) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.y >= self.min.y
            && position.y <= self.max.y
            && position.z >= self.min.z
            && position.z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_positions_spans_all_points() {
        let bounds = AABB::from_positions(vec![
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(-1.0, 5.0, 0.5),
            Vector3::new(0.0, -2.0, 9.0),
        ])
        .unwrap();
        assert_eq!(*bounds.min(), Point3::new(-1.0, -2.0, 0.5));
        assert_eq!(*bounds.max(), Point3::new(1.0, 5.0, 9.0));
    }

    #[test]
    fn from_positions_empty_is_none() {
        assert!(AABB::from_positions(Vec::new()).is_none());
    }

    #[test]
    fn contains_includes_boundary() {
        let bounds =
            AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(bounds.contains(&Vector3::new(0.0, 0.5, 1.0)));
        assert!(!bounds.contains(&Vector3::new(1.1, 0.5, 0.5)));
    }

    #[test]
    #[should_panic]
    fn from_min_max_rejects_inverted_bounds() {
        AABB::from_min_max(Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0));
    }
}

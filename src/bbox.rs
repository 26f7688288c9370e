//! Axis-aligned bounding boxes over point sets.

/// Per-dimension `(min, max)` extent of a set of points.
///
/// Invariant: `min[i] <= max[i]` for every dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl BoundingBox {
    /// Computes the tight bounding box of a non-empty iterator of points.
    ///
    /// Returns `None` when the iterator yields nothing.
    pub fn from_points<'p, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'p [f64]>,
    {
        let mut iter = points.into_iter();
        let mut bbox = Self::from_point(iter.next()?);
        for p in iter {
            bbox.extend(p);
        }
        Some(bbox)
    }

    /// The degenerate box holding a single point.
    #[must_use]
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// Grows the box to include `point`.
    pub fn extend(&mut self, point: &[f64]) {
        for ((lo, hi), &x) in self.min.iter_mut().zip(&mut self.max).zip(point) {
            if x < *lo {
                *lo = x;
            }
            if x > *hi {
                *hi = x;
            }
        }
    }

    /// The smallest box enclosing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self
                .min
                .iter()
                .zip(&other.min)
                .map(|(a, b)| a.min(*b))
                .collect(),
            max: self
                .max
                .iter()
                .zip(&other.max)
                .map(|(a, b)| a.max(*b))
                .collect(),
        }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.min.len()
    }

    /// Lower corner.
    #[must_use]
    pub fn min(&self) -> &[f64] {
        &self.min
    }

    /// Upper corner.
    #[must_use]
    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Extent `max - min` along dimension `d`.
    #[must_use]
    pub fn width(&self, d: usize) -> f64 {
        self.max[d] - self.min[d]
    }

    /// The dimension with the greatest extent. Ties go to the lowest index.
    #[must_use]
    pub fn widest_dimension(&self) -> usize {
        let mut best = 0;
        for d in 1..self.dim() {
            if self.width(d) > self.width(best) {
                best = d;
            }
        }
        best
    }

    /// Whether `point` lies inside the box (boundaries inclusive).
    #[must_use]
    pub fn contains(&self, point: &[f64]) -> bool {
        point
            .iter()
            .zip(self.min.iter().zip(&self.max))
            .all(|(&x, (&lo, &hi))| x >= lo && x <= hi)
    }

    /// Minimum and maximum squared Euclidean distance from `q` to any point of
    /// the box.
    #[must_use]
    pub fn distance_bounds(&self, q: &[f64]) -> (f64, f64) {
        let mut min_sq = 0.0;
        let mut max_sq = 0.0;
        for (d, &x) in q.iter().enumerate() {
            let (near, far) = self.axis_offsets(d, x);
            min_sq += near * near;
            max_sq += far * far;
        }
        (min_sq, max_sq)
    }

    /// Like [`distance_bounds`](Self::distance_bounds), with the offset along
    /// each dimension multiplied by `scale[d]` before squaring.
    #[must_use]
    pub fn scaled_distance_bounds(&self, q: &[f64], scale: &[f64]) -> (f64, f64) {
        let mut min_sq = 0.0;
        let mut max_sq = 0.0;
        for (d, (&x, &s)) in q.iter().zip(scale).enumerate() {
            let (near, far) = self.axis_offsets(d, x);
            min_sq += (near * s) * (near * s);
            max_sq += (far * s) * (far * s);
        }
        (min_sq, max_sq)
    }

    /// Absolute offsets from coordinate `x` to the nearest and farthest point
    /// of the box along dimension `d`. The near offset is zero inside the range.
    fn axis_offsets(&self, d: usize, x: f64) -> (f64, f64) {
        let lo = self.min[d];
        let hi = self.max[d];
        if x < lo {
            (lo - x, hi - x)
        } else if x > hi {
            (x - hi, x - lo)
        } else {
            (0.0, (x - lo).max(hi - x))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(rows: &[[f64; 3]]) -> BoundingBox {
        BoundingBox::from_points(rows.iter().map(|r| r.as_slice())).unwrap()
    }

    #[test]
    fn bounding_box_of_rows() {
        let b = bbox(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, -9.0]]);
        assert!((b.min()[0] - 1.0).abs() < 1e-10);
        assert!((b.max()[0] - 7.0).abs() < 1e-10);
        assert!((b.min()[2] + 9.0).abs() < 1e-10);
        assert!((b.max()[2] - 6.0).abs() < 1e-10);
        assert_eq!(b.widest_dimension(), 2);
    }

    #[test]
    fn empty_iterator_has_no_box() {
        let rows: Vec<&[f64]> = Vec::new();
        assert!(BoundingBox::from_points(rows).is_none());
    }

    #[test]
    fn union_encloses_both() {
        let a = bbox(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let b = bbox(&[[-1.0, 0.5, 2.0]]);
        let u = a.union(&b);
        assert_eq!(u.min(), &[-1.0, 0.0, 0.0]);
        assert_eq!(u.max(), &[1.0, 1.0, 2.0]);
        assert!(u.contains(&[-1.0, 0.5, 2.0]));
        assert!(!u.contains(&[-1.5, 0.5, 2.0]));
    }

    #[test]
    fn distance_bounds_inside_and_outside() {
        let b = bbox(&[[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]]);

        // Inside: nearest is zero, farthest is the opposite corner.
        let (lo, hi) = b.distance_bounds(&[0.5, 0.5, 0.5]);
        assert!(lo.abs() < 1e-12);
        assert!((hi - 3.0 * 1.5 * 1.5).abs() < 1e-12);

        // Outside along x only.
        let (lo, hi) = b.distance_bounds(&[5.0, 1.0, 1.0]);
        assert!((lo - 9.0).abs() < 1e-12);
        assert!((hi - (25.0 + 1.0 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn scaled_bounds_apply_per_dimension_scale() {
        let b = bbox(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let (lo, hi) = b.scaled_distance_bounds(&[3.0, 0.5, 0.5], &[0.5, 1.0, 1.0]);
        assert!((lo - 1.0).abs() < 1e-12);
        assert!((hi - (2.25 + 0.25 + 0.25)).abs() < 1e-12);
    }
}

//! Integer texel bounding boxes used to limit per-face filter searches.

/// Integer axis-aligned box in (u, v) texel space, inclusive on both ends.
///
/// A fresh box is empty: `min` sits at `i32::MAX` and `max` at `i32::MIN`, so the first
/// `augment` collapses it onto that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBoxInt {
    pub min: [i32; 2],
    pub max: [i32; 2],
}

impl Default for BBoxInt {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BBoxInt {
    pub const EMPTY: Self = Self { min: [i32::MAX; 2], max: [i32::MIN; 2] };

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    pub fn augment(&mut self, u: i32, v: i32) {
        self.min[0] = self.min[0].min(u);
        self.min[1] = self.min[1].min(v);
        self.max[0] = self.max[0].max(u);
        self.max[1] = self.max[1].max(v);
    }

    /// Raises any component of `min` and `max` below `(u, v)`. Empty boxes stay empty.
    pub fn clamp_min(&mut self, u: i32, v: i32) {
        if self.is_empty() {
            return;
        }
        for (axis, bound) in [u, v].into_iter().enumerate() {
            self.min[axis] = self.min[axis].max(bound);
            self.max[axis] = self.max[axis].max(bound);
        }
    }

    /// Lowers any component of `min` and `max` above `(u, v)`. Empty boxes stay empty.
    pub fn clamp_max(&mut self, u: i32, v: i32) {
        if self.is_empty() {
            return;
        }
        for (axis, bound) in [u, v].into_iter().enumerate() {
            self.min[axis] = self.min[axis].min(bound);
            self.max[axis] = self.max[axis].min(bound);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    /// Inclusive texel ranges `(u_range, v_range)`, or `None` for an empty box.
    ///
    /// Callers clamp the box to the face first so both ranges are non-negative.
    pub fn ranges(&self) -> Option<(std::ops::RangeInclusive<usize>, std::ops::RangeInclusive<usize>)> {
        if self.is_empty() || self.min[0] < 0 || self.min[1] < 0 {
            return None;
        }
        Some((
            self.min[0] as usize..=self.max[0] as usize,
            self.min[1] as usize..=self.max[1] as usize,
        ))
    }

    pub fn contains(&self, u: i32, v: i32) -> bool {
        u >= self.min[0] && u <= self.max[0] && v >= self.min[1] && v <= self.max[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_box_is_empty_until_augmented() {
        let mut bbox = BBoxInt::default();
        assert!(bbox.is_empty());
        assert!(bbox.ranges().is_none());
        bbox.augment(3, 7);
        assert!(!bbox.is_empty());
        assert_eq!(bbox.min, [3, 7]);
        assert_eq!(bbox.max, [3, 7]);
        bbox.augment(-2, 9);
        assert_eq!(bbox.min, [-2, 7]);
        assert_eq!(bbox.max, [3, 9]);
    }

    #[test]
    fn clamping_keeps_box_inside_face() {
        let mut bbox = BBoxInt::default();
        bbox.augment(-4, -1);
        bbox.augment(12, 5);
        bbox.clamp_min(0, 0);
        bbox.clamp_max(7, 7);
        assert_eq!(bbox.min, [0, 0]);
        assert_eq!(bbox.max, [7, 5]);
        let (us, vs) = bbox.ranges().expect("non-empty");
        assert_eq!(us, 0..=7);
        assert_eq!(vs, 0..=5);
    }

    #[test]
    fn clamping_does_not_revive_empty_box() {
        let mut bbox = BBoxInt::default();
        bbox.clamp_min(0, 0);
        bbox.clamp_max(7, 7);
        assert!(bbox.is_empty());
    }
}

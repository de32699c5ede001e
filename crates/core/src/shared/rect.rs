use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle: top-left corner plus extent, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union. Identical rects score 1 even when degenerate.
    pub fn iou(&self, other: &Rect) -> f32 {
        if self == other {
            return 1.0;
        }
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.max_x().min(other.max_x());
        let iy2 = self.max_y().min(other.max_y());

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Uniformly scales position and extent about the origin.
    pub fn scale(&self, factor: f32) -> Rect {
        Rect::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_iou_identical() {
        let a = Rect::new(10.0, 10.0, 100.0, 100.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50x100 = 5000, union 10000 + 10000 - 5000
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 0.0, 100.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_contained() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(25.0, 25.0, 50.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.25);
    }

    #[rstest]
    #[case::disjoint(Rect::new(100.0, 100.0, 50.0, 50.0))]
    #[case::touching(Rect::new(50.0, 0.0, 50.0, 50.0))]
    #[case::zero_area(Rect::new(10.0, 10.0, 0.0, 20.0))]
    fn test_iou_without_overlap(#[case] other: Rect) {
        let a = Rect::new(0.0, 0.0, 50.0, 50.0);
        assert_eq!(a.iou(&other), 0.0);
    }

    #[rstest]
    #[case::point(Rect::new(100.0, 100.0, 0.0, 0.0))]
    #[case::line(Rect::new(10.0, 10.0, 0.0, 20.0))]
    fn test_iou_identical_degenerate(#[case] r: Rect) {
        assert_eq!(r.iou(&r), 1.0);
    }

    #[test]
    fn test_center() {
        assert_eq!(Rect::new(40.0, 35.0, 20.0, 10.0).center(), (50.0, 40.0));
    }

    #[test]
    fn test_area_ignores_negative_extent() {
        assert_eq!(Rect::new(0.0, 0.0, -5.0, 10.0).area(), 0.0);
        assert_eq!(Rect::default().area(), 0.0);
    }

    #[test]
    fn test_scale_then_translate() {
        let r = Rect::new(1.0, 2.0, 3.0, 4.0).scale(2.0).translate(10.0, -1.0);
        assert_eq!(r, Rect::new(12.0, 3.0, 6.0, 8.0));
        assert_eq!(r.max_x(), 18.0);
        assert_eq!(r.max_y(), 11.0);
    }
}

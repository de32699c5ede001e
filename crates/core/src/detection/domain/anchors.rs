/// Anchor center in normalized model-input space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub cx: f32,
    pub cy: f32,
}

/// Feature-map layers of the short-range face model: (stride, anchors per cell).
const SHORT_RANGE_LAYERS: [(u32, usize); 2] = [(8, 2), (16, 6)];

/// Anchor grid of the short-range face model, row-major per layer.
///
/// For a 128 input this is 16×16×2 + 8×8×6 = 896 anchors.
pub fn short_range_anchors(input_size: u32) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for &(stride, per_cell) in &SHORT_RANGE_LAYERS {
        let grid = (input_size / stride).max(1);
        for y in 0..grid {
            for x in 0..grid {
                let cx = (x as f32 + 0.5) / grid as f32;
                let cy = (y as f32 + 0.5) / grid as f32;
                anchors.extend(std::iter::repeat(Anchor { cx, cy }).take(per_cell));
            }
        }
    }
    anchors
}

/// Centered square crop taken from a frame before resizing.
///
/// Recorded by preprocessing so box decoding can invert the crop exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

impl CropRegion {
    /// Square of side `min(width, height)`, centered on the longer axis.
    pub fn center_square(width: u32, height: u32) -> Self {
        let side = width.min(height);
        let offset = (width.max(height) - side) / 2;
        if width > height {
            Self {
                x: offset,
                y: 0,
                side,
            }
        } else {
            Self {
                x: 0,
                y: offset,
                side,
            }
        }
    }

    /// Source pixels per pixel of a `target_size` square model input.
    pub fn scale_from(&self, target_size: u32) -> f64 {
        self.side as f64 / target_size as f64
    }

    pub fn origin(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

use crate::detection::domain::detection::FrameDetections;
use crate::preprocessing::domain::crop_region::CropRegion;
use crate::shared::rect::Rect;

/// The frame a set of boxes was measured against.
///
/// `origin_*` is where box coordinates start within the full frame: zero for
/// full-frame boxes, the crop origin for crop-relative ones.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceFrameRect {
    pub origin_x: f32,
    pub origin_y: f32,
    pub frame_width: f32,
    pub frame_height: f32,
}

impl SourceFrameRect {
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            frame_width: width as f32,
            frame_height: height as f32,
        }
    }

    pub fn cropped(crop: &CropRegion, width: u32, height: u32) -> Self {
        let (origin_x, origin_y) = crop.origin();
        Self {
            origin_x,
            origin_y,
            ..Self::full_frame(width, height)
        }
    }
}

/// Projects frame-space boxes into a display viewport with aspect fill.
pub struct CoordinateMapper;

impl CoordinateMapper {
    /// Uniform `scale = max(dw / fw, dh / fh)`, centered; the overflowing
    /// axis is cropped by the viewport.
    pub fn map_to_display(
        detections: &FrameDetections,
        source: &SourceFrameRect,
        display: &Rect,
    ) -> FrameDetections {
        if detections.is_empty() {
            return FrameDetections::NoDetection;
        }

        let scale = (display.width / source.frame_width).max(display.height / source.frame_height);
        if !scale.is_finite() || scale <= 0.0 {
            log::warn!(
                "Cannot map {}x{} frame into {}x{} display, dropping detections",
                source.frame_width,
                source.frame_height,
                display.width,
                display.height
            );
            return FrameDetections::NoDetection;
        }

        let offset_x = display.x + (display.width - source.frame_width * scale) / 2.0;
        let offset_y = display.y + (display.height - source.frame_height * scale) / 2.0;

        detections.map_rects(|r| {
            r.translate(source.origin_x, source.origin_y)
                .scale(scale)
                .translate(offset_x, offset_y)
        })
    }
}

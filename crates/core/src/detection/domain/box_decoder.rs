use ndarray::{ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::anchors::{short_range_anchors, Anchor};
use crate::detection::domain::detection::Detection;
use crate::preprocessing::domain::crop_region::CropRegion;
use crate::shared::constants::ANCHOR_COUNT;
use crate::shared::rect::Rect;

/// How a raw regression row becomes a normalized center/size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeFormula {
    /// The row already is `(cx, cy, w, h)` in `[0, 1]` input space.
    #[default]
    Direct,
    /// Offsets against the short-range anchor grid, in units of `1 / scale`:
    /// `cx = anchor.cx + raw_cx / scale`, `w = raw_w / scale`.
    AnchorOffset { scale: f32 },
}

/// Mapping from the raw confidence output to a probability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceActivation {
    #[default]
    Identity,
    Sigmoid,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("confidence tensor has shape {actual:?}, expected [1, {anchors}, 1]")]
    ConfidenceShape { actual: Vec<usize>, anchors: usize },
    #[error("box tensor has shape {actual:?}, expected [1, {anchors}, >=4]")]
    BoxShape { actual: Vec<usize>, anchors: usize },
    #[error("anchor grid for input size {input_size} has {actual} anchors, model needs {expected}")]
    AnchorCount {
        input_size: u32,
        actual: usize,
        expected: usize,
    },
    #[error("anchor offset scale must be positive and finite")]
    InvalidScale,
}

/// Turns raw per-anchor outputs into boxes in source-frame pixels.
///
/// Every decode consumes exactly [`ANCHOR_COUNT`] anchors and emits one
/// detection per anchor; filtering is left to suppression.
#[derive(Clone, Debug)]
pub struct BoxDecoder {
    input_size: u32,
    formula: DecodeFormula,
    activation: ConfidenceActivation,
    anchors: Vec<Anchor>,
}

impl BoxDecoder {
    pub fn new(
        input_size: u32,
        formula: DecodeFormula,
        activation: ConfidenceActivation,
    ) -> Result<Self, DecodeError> {
        let anchors = match formula {
            DecodeFormula::Direct => Vec::new(),
            DecodeFormula::AnchorOffset { scale } => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(DecodeError::InvalidScale);
                }
                let anchors = short_range_anchors(input_size);
                if anchors.len() != ANCHOR_COUNT {
                    return Err(DecodeError::AnchorCount {
                        input_size,
                        actual: anchors.len(),
                        expected: ANCHOR_COUNT,
                    });
                }
                anchors
            }
        };
        Ok(Self {
            input_size,
            formula,
            activation,
            anchors,
        })
    }

    pub fn decode(
        &self,
        confidences: ArrayView3<'_, f32>,
        boxes: ArrayView3<'_, f32>,
        crop: &CropRegion,
    ) -> Result<Vec<Detection>, DecodeError> {
        if confidences.shape() != &[1, ANCHOR_COUNT, 1] {
            return Err(DecodeError::ConfidenceShape {
                actual: confidences.shape().to_vec(),
                anchors: ANCHOR_COUNT,
            });
        }
        let box_shape = boxes.shape();
        if box_shape[0] != 1 || box_shape[1] != ANCHOR_COUNT || box_shape[2] < 4 {
            return Err(DecodeError::BoxShape {
                actual: box_shape.to_vec(),
                anchors: ANCHOR_COUNT,
            });
        }

        // normalized → resized-input pixels → crop pixels → frame pixels
        let input_px = self.input_size as f64;
        let crop_scale = crop.scale_from(self.input_size);
        let (ox, oy) = (crop.x as f64, crop.y as f64);
        let to_frame = |v: f32| v as f64 * input_px * crop_scale;

        let rows = boxes.index_axis(Axis(0), 0);
        let detections = rows
            .outer_iter()
            .zip(confidences.iter())
            .enumerate()
            .map(|(i, (row, &raw_conf))| {
                let raw = [row[0], row[1], row[2], row[3]].map(finite_or_zero);
                let (cx, cy, w, h) = self.normalized_box(i, raw);
                let w = to_frame(w).max(0.0);
                let h = to_frame(h).max(0.0);
                let rect = Rect::new(
                    (to_frame(cx) - w / 2.0 + ox) as f32,
                    (to_frame(cy) - h / 2.0 + oy) as f32,
                    w as f32,
                    h as f32,
                );
                Detection {
                    rect,
                    confidence: self.confidence(raw_conf),
                }
            })
            .collect();
        Ok(detections)
    }

    fn normalized_box(&self, index: usize, raw: [f32; 4]) -> (f32, f32, f32, f32) {
        let [rx, ry, rw, rh] = raw;
        match self.formula {
            DecodeFormula::Direct => (rx, ry, rw, rh),
            DecodeFormula::AnchorOffset { scale } => {
                let anchor = self.anchors[index];
                (
                    anchor.cx + rx / scale,
                    anchor.cy + ry / scale,
                    rw / scale,
                    rh / scale,
                )
            }
        }
    }

    fn confidence(&self, raw: f32) -> f32 {
        let p = match self.activation {
            ConfidenceActivation::Identity => raw,
            ConfidenceActivation::Sigmoid => sigmoid(raw),
        };
        finite_or_zero(p).clamp(0.0, 1.0)
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    const INPUT: u32 = 128;

    fn tensors(channels: usize) -> (Array3<f32>, Array3<f32>) {
        (
            Array3::zeros((1, ANCHOR_COUNT, 1)),
            Array3::zeros((1, ANCHOR_COUNT, channels)),
        )
    }

    fn set_box(boxes: &mut Array3<f32>, i: usize, values: [f32; 4]) {
        for (c, v) in values.into_iter().enumerate() {
            boxes[[0, i, c]] = v;
        }
    }

    fn direct() -> BoxDecoder {
        BoxDecoder::new(INPUT, DecodeFormula::Direct, ConfidenceActivation::Identity).unwrap()
    }

    #[test]
    fn test_one_detection_per_anchor() {
        let (conf, boxes) = tensors(4);
        let crop = CropRegion::center_square(128, 128);
        let dets = direct().decode(conf.view(), boxes.view(), &crop).unwrap();
        assert_eq!(dets.len(), ANCHOR_COUNT);
    }

    #[test]
    fn test_portrait_hd_center_face() {
        // 1080x1920 portrait frame: crop side 1080 at y offset 420.
        let (mut conf, mut boxes) = tensors(4);
        conf[[0, 7, 0]] = 0.9;
        set_box(&mut boxes, 7, [0.5, 0.5, 0.2, 0.2]);
        let crop = CropRegion::center_square(1080, 1920);

        let dets = direct().decode(conf.view(), boxes.view(), &crop).unwrap();
        let d = dets[7];

        // 0.2 * 128 px input * (1080 / 128) = 216 px
        assert_relative_eq!(d.rect.width, 216.0, epsilon = 1e-3);
        assert_relative_eq!(d.rect.height, 216.0, epsilon = 1e-3);
        let (cx, cy) = d.rect.center();
        assert_relative_eq!(cx, 540.0, epsilon = 1e-3);
        assert_relative_eq!(cy, 420.0 + 540.0, epsilon = 1e-3);
        assert_relative_eq!(d.rect.x, 432.0, epsilon = 1e-3);
        assert_relative_eq!(d.rect.y, 852.0, epsilon = 1e-3);
        assert_relative_eq!(d.confidence, 0.9);
    }

    #[test]
    fn test_landscape_translates_x() {
        let (conf, mut boxes) = tensors(4);
        set_box(&mut boxes, 0, [0.0, 0.0, 0.0, 0.0]);
        let crop = CropRegion::center_square(1920, 1080);
        let dets = direct().decode(conf.view(), boxes.view(), &crop).unwrap();
        assert_relative_eq!(dets[0].rect.x, 420.0);
        assert_relative_eq!(dets[0].rect.y, 0.0);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let (mut conf, mut boxes) = tensors(4);
        let mut state: u32 = 12345;
        let mut next = || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 8) as f32 / (1u32 << 24) as f32
        };
        for i in 0..ANCHOR_COUNT {
            conf[[0, i, 0]] = next();
            set_box(&mut boxes, i, [next(), next(), next() * 0.3, next() * 0.3]);
        }
        let crop = CropRegion::center_square(1080, 1920);
        let decoder = direct();

        let first = decoder.decode(conf.view(), boxes.view(), &crop).unwrap();
        let second = decoder.decode(conf.view(), boxes.view(), &crop).unwrap();
        let bits = |dets: &[Detection]| -> Vec<u32> {
            dets.iter()
                .flat_map(|d| {
                    [d.rect.x, d.rect.y, d.rect.width, d.rect.height, d.confidence]
                        .map(f32::to_bits)
                })
                .collect()
        };
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_confidence_clamped() {
        let (mut conf, boxes) = tensors(4);
        conf[[0, 0, 0]] = 1.7;
        conf[[0, 1, 0]] = -0.2;
        conf[[0, 2, 0]] = f32::NAN;
        let crop = CropRegion::center_square(128, 128);
        let dets = direct().decode(conf.view(), boxes.view(), &crop).unwrap();
        assert_eq!(dets[0].confidence, 1.0);
        assert_eq!(dets[1].confidence, 0.0);
        assert_eq!(dets[2].confidence, 0.0);
    }

    #[test]
    fn test_negative_extent_clamped() {
        let (conf, mut boxes) = tensors(4);
        set_box(&mut boxes, 3, [0.5, 0.5, -0.1, f32::INFINITY]);
        let crop = CropRegion::center_square(128, 128);
        let dets = direct().decode(conf.view(), boxes.view(), &crop).unwrap();
        assert_eq!(dets[3].rect.width, 0.0);
        assert_eq!(dets[3].rect.height, 0.0);
        assert_eq!(dets[3].rect.center(), (64.0, 64.0));
    }

    #[test]
    fn test_sigmoid_activation() {
        let decoder =
            BoxDecoder::new(INPUT, DecodeFormula::Direct, ConfidenceActivation::Sigmoid).unwrap();
        let (mut conf, boxes) = tensors(4);
        conf[[0, 0, 0]] = 0.0;
        conf[[0, 1, 0]] = 10.0;
        let crop = CropRegion::center_square(128, 128);
        let dets = decoder.decode(conf.view(), boxes.view(), &crop).unwrap();
        assert_relative_eq!(dets[0].confidence, 0.5);
        assert!(dets[1].confidence > 0.999);
    }

    #[test]
    fn test_anchor_offset_formula() {
        let decoder = BoxDecoder::new(
            INPUT,
            DecodeFormula::AnchorOffset { scale: 128.0 },
            ConfidenceActivation::Identity,
        )
        .unwrap();
        // 16 channels: box followed by keypoints, which are ignored
        let (conf, mut boxes) = tensors(16);
        set_box(&mut boxes, 512, [8.0, -8.0, 32.0, 16.0]);
        boxes[[0, 512, 4]] = 999.0;
        let crop = CropRegion::center_square(128, 128);

        let dets = decoder.decode(conf.view(), boxes.view(), &crop).unwrap();
        let (cx, cy) = dets[512].rect.center();
        // anchor 512 sits at (1/16, 1/16) = 8px; offsets are in input pixels
        assert_relative_eq!(cx, 16.0, epsilon = 1e-4);
        assert_relative_eq!(cy, 0.0, epsilon = 1e-4);
        assert_relative_eq!(dets[512].rect.width, 32.0, epsilon = 1e-4);
        assert_relative_eq!(dets[512].rect.height, 16.0, epsilon = 1e-4);
    }

    #[test]
    fn test_anchor_offset_requires_matching_grid() {
        let err = BoxDecoder::new(
            256,
            DecodeFormula::AnchorOffset { scale: 256.0 },
            ConfidenceActivation::Identity,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::AnchorCount { input_size: 256, .. }));
    }

    #[test]
    fn test_anchor_offset_rejects_zero_scale() {
        let err = BoxDecoder::new(
            INPUT,
            DecodeFormula::AnchorOffset { scale: 0.0 },
            ConfidenceActivation::Identity,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::InvalidScale);
    }

    #[test]
    fn test_wrong_anchor_count_rejected() {
        let conf = Array3::<f32>::zeros((1, 895, 1));
        let boxes = Array3::<f32>::zeros((1, 895, 4));
        let crop = CropRegion::center_square(128, 128);
        let err = direct().decode(conf.view(), boxes.view(), &crop).unwrap_err();
        assert!(matches!(err, DecodeError::ConfidenceShape { .. }));
    }

    #[test]
    fn test_narrow_box_tensor_rejected() {
        let conf = Array3::<f32>::zeros((1, ANCHOR_COUNT, 1));
        let boxes = Array3::<f32>::zeros((1, ANCHOR_COUNT, 3));
        let crop = CropRegion::center_square(128, 128);
        let err = direct().decode(conf.view(), boxes.view(), &crop).unwrap_err();
        assert!(matches!(err, DecodeError::BoxShape { .. }));
    }
}

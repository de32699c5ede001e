/// Anchors predicted by the short-range face model; fixed by the network.
pub const ANCHOR_COUNT: usize = 896;

/// Square input resolution of the face model.
pub const DEFAULT_INPUT_SIZE: u32 = 128;

/// Largest accepted model input side.
pub const MAX_INPUT_SIZE: u32 = 1024;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

pub const FACE_MODEL_NAME: &str = "face_detection_short_range.onnx";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("target size must be between 1 and {max}, got {size}")]
    InvalidTargetSize { size: u32, max: u32 },
    #[error("failed to allocate {bytes} bytes for the crop buffer")]
    Allocation { bytes: usize },
    #[error("crop buffer does not form a {side}x{side} RGB image")]
    CropBuffer { side: u32 },
    #[error("resampling produced {width}x{height}, expected {expected}x{expected}")]
    Resample { width: u32, height: u32, expected: u32 },
}

/// Frame preprocessing: center crop, resample, RGB tensor conversion.
///
/// Resampling goes through `image::imageops`, whose separable filters widen
/// their support when downscaling, so a 1080-pixel crop shrinking to 128
/// averages every source pixel instead of point-sampling.
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::preprocessing::domain::crop_region::CropRegion;
use crate::preprocessing::domain::input_tensor::{InputMode, InputTensor, TensorLayout};
use crate::preprocessing::domain::preprocess_error::PreprocessError;
use crate::shared::constants::MAX_INPUT_SIZE;
use crate::shared::frame::{VideoFrame, BYTES_PER_PIXEL};

/// Resampling filter used to shrink the crop to the model input size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Bilinear,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Output of one preprocessing pass.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    pub tensor: InputTensor,
    pub crop: CropRegion,
    /// The resized RGB crop, kept for debug overlays.
    pub image: RgbImage,
}

pub struct FramePreprocessor {
    filter: ResizeFilter,
    mode: InputMode,
    layout: TensorLayout,
}

impl FramePreprocessor {
    pub fn new(filter: ResizeFilter, mode: InputMode, layout: TensorLayout) -> Self {
        Self {
            filter,
            mode,
            layout,
        }
    }

    pub fn preprocess(
        &self,
        frame: &VideoFrame<'_>,
        target_size: u32,
    ) -> Result<Preprocessed, PreprocessError> {
        if target_size == 0 || target_size > MAX_INPUT_SIZE {
            return Err(PreprocessError::InvalidTargetSize {
                size: target_size,
                max: MAX_INPUT_SIZE,
            });
        }

        let crop = CropRegion::center_square(frame.width(), frame.height());
        let cropped = extract_rgb_crop(frame, &crop)?;

        let resized = if crop.side == target_size {
            cropped
        } else {
            imageops::resize(&cropped, target_size, target_size, self.filter.filter_type())
        };
        if resized.dimensions() != (target_size, target_size) {
            return Err(PreprocessError::Resample {
                width: resized.width(),
                height: resized.height(),
                expected: target_size,
            });
        }

        let tensor = InputTensor::from_rgb(&resized, self.mode, self.layout);
        Ok(Preprocessed {
            tensor,
            crop,
            image: resized,
        })
    }
}

/// Copies the crop out of the frame as packed RGB, dropping alpha.
fn extract_rgb_crop(
    frame: &VideoFrame<'_>,
    crop: &CropRegion,
) -> Result<RgbImage, PreprocessError> {
    let side = crop.side as usize;
    let bytes = side
        .checked_mul(side)
        .and_then(|n| n.checked_mul(3))
        .ok_or(PreprocessError::Allocation { bytes: usize::MAX })?;

    let mut rgb = Vec::new();
    rgb.try_reserve_exact(bytes)
        .map_err(|_| PreprocessError::Allocation { bytes })?;

    let [r, g, b] = frame.format().rgb_offsets();
    let start = crop.x as usize * BYTES_PER_PIXEL;
    let end = start + side * BYTES_PER_PIXEL;
    for y in crop.y..crop.y + crop.side {
        for pixel in frame.row(y)[start..end].chunks_exact(BYTES_PER_PIXEL) {
            rgb.extend_from_slice(&[pixel[r], pixel[g], pixel[b]]);
        }
    }

    RgbImage::from_raw(crop.side, crop.side, rgb)
        .ok_or(PreprocessError::CropBuffer { side: crop.side })
}

use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Element type the inference engine expects on its input slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// RGB components divided by 255 into `[0, 1]`.
    #[default]
    Float,
    /// Raw RGB bytes.
    Quantized,
}

/// Axis order of the input tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

/// Model input for one frame, built fresh per call.
#[derive(Clone, Debug, PartialEq)]
pub enum InputTensor {
    Float(Array4<f32>),
    Quantized(Array4<u8>),
}

impl InputTensor {
    pub fn from_rgb(image: &RgbImage, mode: InputMode, layout: TensorLayout) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let component = |x: usize, y: usize, c: usize| image.get_pixel(x as u32, y as u32)[c];

        match (mode, layout) {
            (InputMode::Float, TensorLayout::Nhwc) => {
                Self::Float(Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                    component(x, y, c) as f32 / 255.0
                }))
            }
            (InputMode::Float, TensorLayout::Nchw) => {
                Self::Float(Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
                    component(x, y, c) as f32 / 255.0
                }))
            }
            (InputMode::Quantized, TensorLayout::Nhwc) => {
                Self::Quantized(Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                    component(x, y, c)
                }))
            }
            (InputMode::Quantized, TensorLayout::Nchw) => {
                Self::Quantized(Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
                    component(x, y, c)
                }))
            }
        }
    }

    pub fn mode(&self) -> InputMode {
        match self {
            Self::Float(_) => InputMode::Float,
            Self::Quantized(_) => InputMode::Quantized,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(a) => a.shape(),
            Self::Quantized(a) => a.shape(),
        }
    }
}

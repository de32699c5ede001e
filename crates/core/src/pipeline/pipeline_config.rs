use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::box_decoder::{ConfidenceActivation, DecodeFormula};
use crate::preprocessing::domain::input_tensor::TensorLayout;
use crate::preprocessing::infrastructure::frame_preprocessor::ResizeFilter;
use crate::shared::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD, MAX_INPUT_SIZE,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("input size {0} is outside 1..={max}", max = MAX_INPUT_SIZE)]
    InputSize(u32),
    #[error("{name} must be within [0, 1], got {value}")]
    Threshold { name: &'static str, value: f32 },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable settings for one [`FacePipeline`](super::face_pipeline::FacePipeline).
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side of the square model input.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub decode: DecodeFormula,
    pub activation: ConfidenceActivation,
    pub layout: TensorLayout,
    pub resize_filter: ResizeFilter,
    /// Attach the resized model input to every result.
    pub debug_image: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            decode: DecodeFormula::default(),
            activation: ConfidenceActivation::default(),
            layout: TensorLayout::default(),
            resize_filter: ResizeFilter::default(),
            debug_image: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 || self.input_size > MAX_INPUT_SIZE {
            return Err(ConfigError::InputSize(self.input_size));
        }
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("iou_threshold", self.iou_threshold)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Threshold { name, value })
    }
}

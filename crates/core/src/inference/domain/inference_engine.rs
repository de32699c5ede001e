use ndarray::{Array3, ArrayD, Ix3};
use thiserror::Error;

use crate::preprocessing::domain::input_tensor::{InputMode, InputTensor};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("failed to initialise inference engine: {0}")]
    Initialization(String),
    #[error("inference failed: {0}")]
    Execution(String),
    #[error("unexpected output tensors: {0}")]
    OutputShape(String),
}

/// Raw network outputs for one frame.
///
/// `confidences` is `[1, anchors, 1]`; `boxes` is `[1, anchors, C]` with
/// `C >= 4`, the first four channels being the box regression.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceOutput {
    pub confidences: Array3<f32>,
    pub boxes: Array3<f32>,
}

impl InferenceOutput {
    /// Picks the confidence and box tensors out of a model's raw outputs.
    ///
    /// The confidence tensor is the one whose last dimension is 1; the box
    /// tensor is the first one with at least four channels.
    pub fn from_outputs(outputs: Vec<ArrayD<f32>>) -> Result<Self, InferenceError> {
        let mut confidences = None;
        let mut boxes = None;

        for output in outputs {
            let shape = output.shape().to_vec();
            let output = output
                .into_dimensionality::<Ix3>()
                .map_err(|_| {
                    InferenceError::OutputShape(format!("expected rank 3, got {shape:?}"))
                })?;
            match shape[2] {
                1 if confidences.is_none() => confidences = Some(output),
                c if c >= 4 && boxes.is_none() => boxes = Some(output),
                _ => log::debug!("Ignoring extra model output with shape {shape:?}"),
            }
        }

        match (confidences, boxes) {
            (Some(confidences), Some(boxes)) => Ok(Self { confidences, boxes }),
            (None, _) => Err(InferenceError::OutputShape(
                "no [1, N, 1] confidence output".into(),
            )),
            (_, None) => Err(InferenceError::OutputShape("no [1, N, >=4] box output".into())),
        }
    }
}

/// Port to the neural-network runtime.
///
/// Implementations hold a loaded model; `&mut self` because runtimes
/// typically reuse internal buffers between calls. A failed `run` must
/// leave the engine usable for the next frame.
pub trait InferenceEngine: Send {
    fn input_mode(&self) -> InputMode;

    fn run(&mut self, input: &InputTensor) -> Result<InferenceOutput, InferenceError>;
}

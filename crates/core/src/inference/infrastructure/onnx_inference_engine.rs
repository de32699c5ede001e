//! Face model inference through ONNX Runtime via `ort`.
//!
//! Input element type decides the input mode: a `uint8` input means the
//! model is quantized and takes raw RGB bytes.

use std::path::Path;

use ndarray::ArrayD;

use crate::inference::domain::inference_engine::{
    InferenceEngine, InferenceError, InferenceOutput,
};
use crate::preprocessing::domain::input_tensor::{InputMode, InputTensor};

pub struct OnnxInferenceEngine {
    session: ort::session::Session,
    input_mode: InputMode,
}

impl OnnxInferenceEngine {
    /// Load a model file. Any failure here is fatal for the pipeline.
    ///
    /// `intra_threads` bounds ONNX Runtime's intra-op thread pool; 0 is
    /// treated as 1.
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self, InferenceError> {
        let session = build_session(model_path, intra_threads).map_err(|e| {
            InferenceError::Initialization(format!("{}: {e}", model_path.display()))
        })?;

        let input_mode = session
            .inputs()
            .first()
            .map(|input| {
                if matches!(
                    input.dtype(),
                    ort::value::ValueType::Tensor {
                        ty: ort::tensor::TensorElementType::Uint8,
                        ..
                    }
                ) {
                    InputMode::Quantized
                } else {
                    InputMode::Float
                }
            })
            .ok_or_else(|| InferenceError::Initialization("model declares no inputs".into()))?;

        log::info!(
            "Loaded face model {} ({:?} input, {} intra-op threads)",
            model_path.display(),
            input_mode,
            intra_threads.max(1)
        );

        Ok(Self {
            session,
            input_mode,
        })
    }
}

impl InferenceEngine for OnnxInferenceEngine {
    fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    fn run(&mut self, input: &InputTensor) -> Result<InferenceOutput, InferenceError> {
        let outputs = match input {
            InputTensor::Float(array) => {
                let value = ort::value::Tensor::from_array(array.clone()).map_err(execution)?;
                self.session.run(ort::inputs![value]).map_err(execution)?
            }
            InputTensor::Quantized(array) => {
                let value = ort::value::Tensor::from_array(array.clone()).map_err(execution)?;
                self.session.run(ort::inputs![value]).map_err(execution)?
            }
        };

        let mut arrays: Vec<ArrayD<f32>> = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let view = outputs[i].try_extract_array::<f32>().map_err(execution)?;
            arrays.push(view.to_owned());
        }
        InferenceOutput::from_outputs(arrays)
    }
}

fn build_session(
    model_path: &Path,
    intra_threads: usize,
) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads.max(1))?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Platform accelerator first; ONNX Runtime falls back to CPU on its own.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

fn execution(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Execution(e.to_string())
}

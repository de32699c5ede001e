use std::time::{Duration, Instant};

use image::RgbImage;
use thiserror::Error;

use crate::detection::domain::box_decoder::{BoxDecoder, DecodeError};
use crate::detection::domain::coordinate_mapper::{CoordinateMapper, SourceFrameRect};
use crate::detection::domain::detection::FrameDetections;
use crate::detection::domain::weighted_suppressor::WeightedSuppressor;
use crate::inference::domain::inference_engine::{InferenceEngine, InferenceError};
use crate::pipeline::pipeline_config::{ConfigError, PipelineConfig};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::preprocessing::domain::input_tensor::InputMode;
use crate::preprocessing::domain::preprocess_error::PreprocessError;
use crate::preprocessing::infrastructure::frame_preprocessor::FramePreprocessor;
use crate::shared::frame::{FrameError, VideoFrame};
use crate::shared::rect::Rect;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("detection worker panicked")]
    WorkerPanicked,
}

/// Outcome of one frame, handed to the presentation layer.
#[derive(Debug)]
pub struct FrameResult {
    /// Boxes in display coordinates.
    pub detections: FrameDetections,
    pub elapsed: Duration,
    pub fps: f64,
    /// Capture index, when the frame came through the live loop.
    pub frame_index: Option<usize>,
    /// Resized model input, or a blank placeholder if the frame failed.
    pub debug_image: Option<RgbImage>,
    /// Why the frame produced nothing, if it failed.
    pub failure: Option<PipelineError>,
}

/// Runs preprocess → infer → decode → suppress → map for one frame at a time.
///
/// Holds no per-frame state; the only thing that changes across calls is the
/// engine's internal buffers and the logger's statistics.
pub struct FacePipeline {
    config: PipelineConfig,
    preprocessor: FramePreprocessor,
    decoder: BoxDecoder,
    suppressor: WeightedSuppressor,
    engine: Box<dyn InferenceEngine>,
    logger: Box<dyn PipelineLogger>,
    frames: usize,
}

impl FacePipeline {
    pub fn new(
        config: PipelineConfig,
        engine: Box<dyn InferenceEngine>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let decoder = BoxDecoder::new(config.input_size, config.decode, config.activation)?;
        let preprocessor =
            FramePreprocessor::new(config.resize_filter, engine.input_mode(), config.layout);
        let suppressor = WeightedSuppressor::new(config.confidence_threshold, config.iou_threshold);

        log::debug!("{}", ready_message(&config, engine.input_mode()));

        Ok(Self {
            config,
            preprocessor,
            decoder,
            suppressor,
            engine,
            logger: Box::new(NullPipelineLogger),
            frames: 0,
        })
    }

    /// Replaces the logger and announces the pipeline's settings through it.
    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        let ready = ready_message(&self.config, self.engine.input_mode());
        self.logger.info(&ready);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn log_summary(&self) {
        self.logger.summary();
    }

    /// Never fails: per-frame errors come back as `NoDetection` with the
    /// error in `failure`, and the next frame starts clean.
    pub fn process(&mut self, frame: &VideoFrame<'_>, display: &Rect) -> FrameResult {
        let start = Instant::now();
        let outcome = self.detect(frame, display);
        let elapsed = start.elapsed();
        let secs = elapsed.as_secs_f64();
        let fps = if secs > 0.0 { 1.0 / secs } else { 0.0 };

        self.frames += 1;
        self.logger.timing("total", secs * 1000.0);
        self.logger.frame_completed(self.frames, fps);

        match outcome {
            Ok((detections, image)) => FrameResult {
                detections,
                elapsed,
                fps,
                frame_index: None,
                debug_image: self.config.debug_image.then_some(image),
                failure: None,
            },
            Err(e) => {
                log::warn!("Frame {} produced no detections: {e}", self.frames);
                FrameResult {
                    detections: FrameDetections::NoDetection,
                    elapsed,
                    fps,
                    frame_index: None,
                    debug_image: self.config.debug_image.then(|| self.placeholder_image()),
                    failure: Some(e),
                }
            }
        }
    }

    fn detect(
        &mut self,
        frame: &VideoFrame<'_>,
        display: &Rect,
    ) -> Result<(FrameDetections, RgbImage), PipelineError> {
        let logger = self.logger.as_mut();

        let prepared = timed(logger, "preprocess", || {
            self.preprocessor.preprocess(frame, self.config.input_size)
        })?;
        let output = timed(logger, "infer", || self.engine.run(&prepared.tensor))?;
        let candidates = timed(logger, "decode", || {
            self.decoder
                .decode(output.confidences.view(), output.boxes.view(), &prepared.crop)
        })?;
        let merged = timed(logger, "suppress", || self.suppressor.suppress(&candidates));
        logger.metric("faces", merged.len() as f64);

        // decoded boxes are already full-frame
        let source = SourceFrameRect::full_frame(frame.width(), frame.height());
        let mapped = CoordinateMapper::map_to_display(&merged, &source, display);

        Ok((mapped, prepared.image))
    }

    fn placeholder_image(&self) -> RgbImage {
        RgbImage::new(self.config.input_size, self.config.input_size)
    }
}

fn ready_message(config: &PipelineConfig, mode: InputMode) -> String {
    format!(
        "Face pipeline ready: input {}px, {:?} input, confidence >= {}, IoU >= {}",
        config.input_size, mode, config.confidence_threshold, config.iou_threshold
    )
}

fn timed<T>(logger: &mut dyn PipelineLogger, stage: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let value = f();
    logger.timing(stage, start.elapsed().as_secs_f64() * 1000.0);
    value
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detection::domain::box_decoder::DecodeFormula;
    use crate::inference::domain::inference_engine::InferenceOutput;
    use crate::preprocessing::domain::input_tensor::{InputMode, InputTensor};
    use crate::shared::constants::ANCHOR_COUNT;
    use crate::shared::frame::PixelFormat;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use std::sync::{Arc, Mutex};

    /// One confident face at normalized center (0.5, 0.5), size 0.2.
    pub(crate) fn single_face_output(confidence: f32) -> InferenceOutput {
        let mut confidences = Array3::<f32>::zeros((1, ANCHOR_COUNT, 1));
        let mut boxes = Array3::<f32>::zeros((1, ANCHOR_COUNT, 4));
        confidences[[0, 0, 0]] = confidence;
        for (c, v) in [0.5, 0.5, 0.2, 0.2].into_iter().enumerate() {
            boxes[[0, 0, c]] = v;
        }
        InferenceOutput { confidences, boxes }
    }

    pub(crate) struct FixedEngine {
        pub output: InferenceOutput,
    }

    impl InferenceEngine for FixedEngine {
        fn input_mode(&self) -> InputMode {
            InputMode::Float
        }

        fn run(&mut self, _input: &InputTensor) -> Result<InferenceOutput, InferenceError> {
            Ok(self.output.clone())
        }
    }

    /// Fails every other call, starting with the first.
    struct FlakyEngine {
        calls: usize,
    }

    impl InferenceEngine for FlakyEngine {
        fn input_mode(&self) -> InputMode {
            InputMode::Float
        }

        fn run(&mut self, _input: &InputTensor) -> Result<InferenceOutput, InferenceError> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                Err(InferenceError::Execution("device lost".into()))
            } else {
                Ok(single_face_output(0.9))
            }
        }
    }

    struct RecordingEngine {
        seen: Arc<Mutex<Vec<(InputMode, Vec<usize>)>>>,
    }

    impl InferenceEngine for RecordingEngine {
        fn input_mode(&self) -> InputMode {
            InputMode::Quantized
        }

        fn run(&mut self, input: &InputTensor) -> Result<InferenceOutput, InferenceError> {
            self.seen
                .lock()
                .unwrap()
                .push((input.mode(), input.shape().to_vec()));
            Ok(single_face_output(0.0))
        }
    }

    fn portrait_frame() -> Vec<u8> {
        vec![0u8; 270 * 480 * 4]
    }

    fn full_display(w: f32, h: f32) -> Rect {
        Rect::new(0.0, 0.0, w, h)
    }

    #[test]
    fn test_single_face_end_to_end() {
        let engine = FixedEngine {
            output: single_face_output(0.9),
        };
        let mut pipeline = FacePipeline::new(PipelineConfig::default(), Box::new(engine)).unwrap();
        let data = portrait_frame();
        let frame = VideoFrame::packed(&data, 270, 480, PixelFormat::Bgra).unwrap();

        let result = pipeline.process(&frame, &full_display(270.0, 480.0));

        assert!(result.failure.is_none());
        assert!(result.debug_image.is_none());
        assert!(result.fps > 0.0);
        let faces = result.detections.faces();
        assert_eq!(faces.len(), 1);
        // crop 270x270 at y=105, scale 270/128
        assert_relative_eq!(faces[0].rect.x, 108.0, epsilon = 1e-2);
        assert_relative_eq!(faces[0].rect.y, 213.0, epsilon = 1e-2);
        assert_relative_eq!(faces[0].rect.width, 54.0, epsilon = 1e-2);
        assert_relative_eq!(faces[0].rect.height, 54.0, epsilon = 1e-2);
        assert_relative_eq!(faces[0].confidence, 0.9);
    }

    #[test]
    fn test_below_threshold_is_not_a_failure() {
        let engine = FixedEngine {
            output: single_face_output(0.5),
        };
        let mut pipeline = FacePipeline::new(PipelineConfig::default(), Box::new(engine)).unwrap();
        let data = portrait_frame();
        let frame = VideoFrame::packed(&data, 270, 480, PixelFormat::Rgba).unwrap();

        let result = pipeline.process(&frame, &full_display(270.0, 480.0));
        assert_eq!(result.detections, FrameDetections::NoDetection);
        assert!(result.failure.is_none());
    }

    struct MessageLogger {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl PipelineLogger for MessageLogger {
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn frame_completed(&mut self, _frame_number: usize, _fps: f64) {}
        fn info(&mut self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_attached_logger_receives_settings() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let engine = FixedEngine {
            output: single_face_output(0.9),
        };
        let _pipeline = FacePipeline::new(PipelineConfig::default(), Box::new(engine))
            .unwrap()
            .with_logger(Box::new(MessageLogger {
                messages: messages.clone(),
            }));

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Face pipeline ready: input 128px, Float input"));
        assert!(messages[0].contains("confidence >= 0.75"));
    }

    #[test]
    fn test_engine_failure_recovers_next_frame() {
        let config = PipelineConfig {
            debug_image: true,
            ..PipelineConfig::default()
        };
        let mut pipeline = FacePipeline::new(config, Box::new(FlakyEngine { calls: 0 })).unwrap();
        let data = portrait_frame();
        let frame = VideoFrame::packed(&data, 270, 480, PixelFormat::Bgra).unwrap();
        let display = full_display(270.0, 480.0);

        let failed = pipeline.process(&frame, &display);
        assert_eq!(failed.detections, FrameDetections::NoDetection);
        assert!(matches!(
            failed.failure,
            Some(PipelineError::Inference(InferenceError::Execution(_)))
        ));
        let placeholder = failed.debug_image.unwrap();
        assert_eq!(placeholder.dimensions(), (128, 128));
        assert!(placeholder.pixels().all(|p| p.0 == [0, 0, 0]));

        let recovered = pipeline.process(&frame, &display);
        assert!(recovered.failure.is_none());
        assert_eq!(recovered.detections.len(), 1);
        assert_eq!(recovered.debug_image.unwrap().dimensions(), (128, 128));
    }

    #[test]
    fn test_wrong_anchor_count_is_decode_failure() {
        let engine = FixedEngine {
            output: InferenceOutput {
                confidences: Array3::zeros((1, 10, 1)),
                boxes: Array3::zeros((1, 10, 4)),
            },
        };
        let mut pipeline = FacePipeline::new(PipelineConfig::default(), Box::new(engine)).unwrap();
        let data = portrait_frame();
        let frame = VideoFrame::packed(&data, 270, 480, PixelFormat::Bgra).unwrap();

        let result = pipeline.process(&frame, &full_display(270.0, 480.0));
        assert_eq!(result.detections, FrameDetections::NoDetection);
        assert!(matches!(result.failure, Some(PipelineError::Decode(_))));
    }

    #[test]
    fn test_quantized_engine_gets_byte_tensor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine { seen: seen.clone() };
        let config = PipelineConfig {
            input_size: 64,
            ..PipelineConfig::default()
        };
        let mut pipeline = FacePipeline::new(config, Box::new(engine)).unwrap();
        let data = portrait_frame();
        let frame = VideoFrame::packed(&data, 270, 480, PixelFormat::Bgra).unwrap();
        pipeline.process(&frame, &full_display(270.0, 480.0));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, InputMode::Quantized);
        assert_eq!(seen[0].1, vec![1, 64, 64, 3]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            confidence_threshold: 2.0,
            ..PipelineConfig::default()
        };
        let engine = FixedEngine {
            output: single_face_output(0.9),
        };
        let err = FacePipeline::new(config, Box::new(engine)).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_invalid_decode_scale_rejected() {
        let config = PipelineConfig {
            decode: DecodeFormula::AnchorOffset { scale: 0.0 },
            ..PipelineConfig::default()
        };
        let engine = FixedEngine {
            output: single_face_output(0.9),
        };
        let err = FacePipeline::new(config, Box::new(engine)).err().unwrap();
        assert!(matches!(err, PipelineError::Decode(DecodeError::InvalidScale)));
    }
}

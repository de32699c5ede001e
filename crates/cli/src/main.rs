use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Receiver;
use serde_json::json;

use facestream_core::inference::infrastructure::onnx_inference_engine::OnnxInferenceEngine;
use facestream_core::pipeline::face_pipeline::{FacePipeline, FrameResult};
use facestream_core::pipeline::infrastructure::live_detection_loop::{
    Admission, LiveDetectionLoop,
};
use facestream_core::pipeline::pipeline_config::PipelineConfig;
use facestream_core::pipeline::pipeline_logger::StatsPipelineLogger;
use facestream_core::shared::constants::{FACE_MODEL_NAME, IMAGE_EXTENSIONS};
use facestream_core::shared::frame::OwnedVideoFrame;
use facestream_core::shared::model_resolver;
use facestream_core::shared::rect::Rect;

/// Real-time face detection over captured frames.
#[derive(Parser)]
#[command(name = "facestream")]
struct Cli {
    /// Image files, each treated as one captured frame, in capture order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// ONNX face model (resolved from the cache when omitted).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Where to download the model from if it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Pipeline config JSON; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum confidence for a detection to survive (0.0-1.0).
    #[arg(long)]
    confidence: Option<f32>,

    /// Overlap at which detections are merged (0.0-1.0).
    #[arg(long)]
    iou: Option<f32>,

    /// Display viewport as WIDTHxHEIGHT (defaults to the frame size).
    #[arg(long, value_parser = parse_display)]
    display: Option<DisplaySize>,

    /// Replay frames through the live loop at this rate, dropping frames
    /// that arrive while detection is busy.
    #[arg(long)]
    stream_fps: Option<f64>,

    /// Save each frame's model input here as PNG.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Intra-op threads for the inference runtime.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    threads: u16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct DisplaySize {
    width: f32,
    height: f32,
}

impl DisplaySize {
    fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    let model_path = resolve_model(&cli)?;
    log::info!("Loading model {}", model_path.display());
    let engine = OnnxInferenceEngine::new(&model_path, usize::from(cli.threads))?;
    let pipeline = FacePipeline::new(config, Box::new(engine))?
        .with_logger(Box::new(StatsPipelineLogger::default()));

    if let Some(dir) = &cli.debug_dir {
        std::fs::create_dir_all(dir)?;
    }

    match cli.stream_fps {
        Some(fps) => run_stream(&cli, pipeline, fps),
        None => run_direct(&cli, pipeline),
    }
}

/// One frame at a time on the calling thread; nothing is dropped.
fn run_direct(cli: &Cli, mut pipeline: FacePipeline) -> Result<(), Box<dyn std::error::Error>> {
    for (index, path) in cli.inputs.iter().enumerate() {
        let frame = load_frame(path, index)?;
        let view = frame.view();
        let display = cli
            .display
            .map(DisplaySize::rect)
            .unwrap_or_else(|| Rect::new(0.0, 0.0, view.width() as f32, view.height() as f32));

        let mut result = pipeline.process(&view, &display);
        result.frame_index = Some(index);
        emit(cli, &result)?;
    }
    pipeline.log_summary();
    Ok(())
}

/// Frames are pre-loaded, then submitted on a fixed clock as a camera would.
fn run_stream(
    cli: &Cli,
    pipeline: FacePipeline,
    fps: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let frames = cli
        .inputs
        .iter()
        .enumerate()
        .map(|(index, path)| load_frame(path, index))
        .collect::<Result<Vec<_>, _>>()?;

    let display = match (cli.display, frames.first()) {
        (Some(size), _) => size.rect(),
        (None, Some(first)) => {
            let view = first.view();
            Rect::new(0.0, 0.0, view.width() as f32, view.height() as f32)
        }
        (None, None) => return Ok(()),
    };

    let (live, results) = LiveDetectionLoop::spawn(pipeline, display);
    let interval = Duration::from_secs_f64(1.0 / fps);
    let start = Instant::now();

    for (tick, frame) in frames.into_iter().enumerate() {
        let due = start + interval.mul_f64(tick as f64);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        match live.submit(frame) {
            Admission::Accepted => {}
            Admission::Dropped => log::debug!("Frame {tick} arrived while busy"),
            Admission::Closed => {
                log::warn!("Detection stopped at frame {tick}");
                break;
            }
        }
        drain(cli, &results)?;
    }

    let dropped = live.dropped_frames();
    let pipeline = live.shutdown()?;
    for result in results.iter() {
        emit(cli, &result)?;
    }

    log::info!(
        "Streamed {} frames at {fps} fps, {dropped} dropped",
        cli.inputs.len()
    );
    pipeline.log_summary();
    Ok(())
}

fn drain(cli: &Cli, results: &Receiver<FrameResult>) -> Result<(), Box<dyn std::error::Error>> {
    for result in results.try_iter() {
        emit(cli, &result)?;
    }
    Ok(())
}

/// Prints one JSON line per frame and saves the debug image if requested.
fn emit(cli: &Cli, result: &FrameResult) -> Result<(), Box<dyn std::error::Error>> {
    let index = result.frame_index.unwrap_or_default();
    let line = json!({
        "frame": index,
        "source": cli.inputs.get(index).map(|p| p.display().to_string()),
        "elapsed_ms": result.elapsed.as_secs_f64() * 1000.0,
        "fps": result.fps,
        "detections": result.detections,
        "failure": result.failure.as_ref().map(|e| e.to_string()),
    });
    println!("{line}");

    if let (Some(dir), Some(image)) = (&cli.debug_dir, &result.debug_image) {
        image.save(dir.join(format!("frame_{index:05}.png")))?;
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(confidence) = cli.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(iou) = cli.iou {
        config.iou_threshold = iou;
    }
    if cli.debug_dir.is_some() {
        config.debug_image = true;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_model(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.model {
        return Ok(path.clone());
    }
    let bundled = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")));
    let path = model_resolver::resolve(
        FACE_MODEL_NAME,
        cli.model_url.as_deref(),
        bundled.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    Ok(path)
}

fn load_frame(path: &Path, index: usize) -> Result<OwnedVideoFrame, Box<dyn std::error::Error>> {
    let image = image::open(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?
        .to_rgba8();
    Ok(OwnedVideoFrame::from_rgba_image(image, index)?)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
        if !is_image(input) {
            return Err(format!("Not a supported image file: {}", input.display()).into());
        }
    }
    if let Some(model) = &cli.model {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if let Some(fps) = cli.stream_fps {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(format!("Stream fps must be positive, got {fps}").into());
        }
    }
    Ok(())
}

fn parse_display(value: &str) -> Result<DisplaySize, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let parse = |s: &str| -> Result<f32, String> {
        match s.trim().parse::<f32>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
            _ => Err(format!("invalid display dimension '{s}'")),
        }
    };
    Ok(DisplaySize {
        width: parse(w)?,
        height: parse(h)?,
    })
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

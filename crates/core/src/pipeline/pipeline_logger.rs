use std::collections::HashMap;
use std::time::Instant;

/// Sink for per-frame pipeline events.
///
/// Lets callers observe stage timings and throughput without the pipeline
/// knowing where the numbers end up.
pub trait PipelineLogger: Send {
    /// How long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A point-in-time value, e.g. raw or merged detection counts.
    fn metric(&mut self, name: &str, value: f64);

    /// One frame finished end to end.
    fn frame_completed(&mut self, frame_number: usize, fps: f64);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used when the caller has no interest in stats.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn frame_completed(&mut self, _frame_number: usize, _fps: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Accumulates stage timings and metrics and reports through `log`.
///
/// A running fps line is emitted every `report_every` frames.
pub struct StatsPipelineLogger {
    report_every: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames: usize,
    last_fps: f64,
}

impl StatsPipelineLogger {
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
            last_fps: 0.0,
        }
    }

    /// Formatted report, or `None` before anything was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let mut lines = vec![format!(
            "Pipeline summary ({} frames, {:.1}s wall):",
            self.frames,
            self.start_time.elapsed().as_secs_f64()
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let worst = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: avg {:6.2}ms  max {worst:6.2}ms",
                mean(durations)
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: avg {:.1}", mean(&self.metrics[name])));
        }

        if self.frames > 0 {
            lines.push(format!("  Last frame: {:.1} fps", self.last_fps));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Default for StatsPipelineLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl PipelineLogger for StatsPipelineLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn frame_completed(&mut self, frame_number: usize, fps: f64) {
        self.frames += 1;
        self.last_fps = fps;
        if self.frames % self.report_every == 0 {
            log::info!("Frame {frame_number}: {fps:.1} fps");
        }
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

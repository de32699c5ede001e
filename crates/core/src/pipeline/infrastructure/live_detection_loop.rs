use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::pipeline::face_pipeline::{FacePipeline, FrameResult, PipelineError};
use crate::shared::frame::OwnedVideoFrame;
use crate::shared::rect::Rect;

/// Results the presentation layer may fall behind by before new ones are
/// discarded.
const RESULT_CHANNEL_CAPACITY: usize = 4;

/// What happened to a submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Another frame was in flight; this one is gone for good.
    Dropped,
    /// The worker has stopped, after a panic or because results are no
    /// longer consumed. Nothing submitted from now on will be processed.
    Closed,
}

/// Feeds captured frames to a [`FacePipeline`] on a dedicated worker thread.
///
/// Layout: `capture → [admission] → worker (process) → results`
///
/// At most one frame is in flight. A frame arriving while the worker is busy
/// is dropped and counted, never queued, so latency stays bounded by one
/// frame's processing time.
pub struct LiveDetectionLoop {
    frame_tx: Sender<OwnedVideoFrame>,
    in_flight: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
    worker: JoinHandle<FacePipeline>,
}

impl LiveDetectionLoop {
    pub fn spawn(pipeline: FacePipeline, display: Rect) -> (Self, Receiver<FrameResult>) {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<OwnedVideoFrame>(1);
        let (result_tx, result_rx) = crossbeam_channel::bounded(RESULT_CHANNEL_CAPACITY);
        let in_flight = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let guard = WorkerGuard {
            in_flight: in_flight.clone(),
            closed: closed.clone(),
        };
        let worker = spawn_worker(pipeline, display, frame_rx, result_tx, guard);

        let live = Self {
            frame_tx,
            in_flight,
            closed,
            dropped: Arc::new(AtomicUsize::new(0)),
            worker,
        };
        (live, result_rx)
    }

    /// Hands `frame` to the worker unless one is already being processed.
    pub fn submit(&self, frame: OwnedVideoFrame) -> Admission {
        if self.is_closed() {
            return Admission::Closed;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.drop_frame(frame.index());
        }

        match self.frame_tx.try_send(frame) {
            Ok(()) => Admission::Accepted,
            Err(TrySendError::Full(f)) => {
                self.in_flight.store(false, Ordering::Release);
                self.drop_frame(f.index())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.in_flight.store(false, Ordering::Release);
                Admission::Closed
            }
        }
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops accepting frames, waits for the in-flight one to finish, and
    /// hands the pipeline back.
    pub fn shutdown(self) -> Result<FacePipeline, PipelineError> {
        let Self {
            frame_tx, worker, ..
        } = self;
        drop(frame_tx);
        worker.join().map_err(|_| PipelineError::WorkerPanicked)
    }

    fn drop_frame(&self, index: usize) -> Admission {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Dropped frame {index} ({total} dropped so far)");
        Admission::Dropped
    }
}

/// Marks the loop closed when the worker exits, including by unwinding.
struct WorkerGuard {
    in_flight: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl WorkerGuard {
    fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.release();
        if std::thread::panicking() {
            log::error!("Detection worker panicked, no further frames will be processed");
        }
    }
}

fn spawn_worker(
    mut pipeline: FacePipeline,
    display: Rect,
    frame_rx: Receiver<OwnedVideoFrame>,
    result_tx: Sender<FrameResult>,
    guard: WorkerGuard,
) -> JoinHandle<FacePipeline> {
    std::thread::spawn(move || {
        for frame in frame_rx {
            let mut result = pipeline.process(&frame.view(), &display);
            result.frame_index = Some(frame.index());

            // release before publishing so a consumer that has seen this
            // result can always submit the next frame
            guard.release();

            match result_tx.try_send(result) {
                Ok(()) => {}
                Err(TrySendError::Full(r)) => {
                    log::warn!(
                        "Result for frame {:?} discarded, consumer is lagging",
                        r.frame_index
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("Result receiver closed, stopping detection worker");
                    break;
                }
            }
        }
        pipeline
    })
}

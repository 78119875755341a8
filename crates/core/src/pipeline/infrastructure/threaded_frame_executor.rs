use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::pipeline::attendance_engine::{AttendanceEngine, FrameInput, PipelineError};
use crate::pipeline::frame_executor::{
    ExecutionSummary, ExecutorConfig, FrameExecutor, FrameResult,
};
use crate::pipeline::pipeline_logger::PipelineLogger;

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Runs frames on a fixed pool of workers sharing one engine.
///
/// Layout: `feeder → [worker × N] → caller`
///
/// The feeder pulls from the frame source into a bounded queue, so a fast
/// source is throttled to the pool's pace. Results arrive on the calling
/// thread in completion order, tagged with their submission index.
pub struct ThreadedFrameExecutor {
    workers: usize,
    channel_capacity: usize,
}

impl ThreadedFrameExecutor {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY.max(workers * 2),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for ThreadedFrameExecutor {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self::new(workers)
    }
}

impl FrameExecutor for ThreadedFrameExecutor {
    fn execute(
        &self,
        engine: Arc<AttendanceEngine>,
        frames: Box<dyn Iterator<Item = FrameInput> + Send>,
        logger: &mut dyn PipelineLogger,
        mut config: ExecutorConfig,
    ) -> Result<ExecutionSummary, Box<dyn std::error::Error>> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<(usize, FrameInput)>(self.channel_capacity);
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(usize, FrameResult)>(self.channel_capacity);

        let feeder = spawn_feeder(frames, job_tx, Arc::clone(&config.cancelled));
        let workers: Vec<_> = (0..self.workers)
            .map(|_| {
                spawn_worker(
                    Arc::clone(&engine),
                    job_rx.clone(),
                    result_tx.clone(),
                    Arc::clone(&config.cancelled),
                )
            })
            .collect();
        drop(job_rx);
        drop(result_tx);

        logger.info(&format!("Processing frames on {} workers", self.workers));
        let summary = collect_results(result_rx, logger, &mut config);
        join_threads(feeder, workers)?;
        logger.summary();
        Ok(summary)
    }
}

fn spawn_feeder(
    frames: Box<dyn Iterator<Item = FrameInput> + Send>,
    job_tx: Sender<(usize, FrameInput)>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<usize> {
    std::thread::spawn(move || {
        let mut submitted = 0;
        for (index, frame) in frames.enumerate() {
            if cancelled.load(Ordering::Relaxed) || job_tx.send((index, frame)).is_err() {
                break;
            }
            submitted += 1;
        }
        submitted
    })
}

fn spawn_worker(
    engine: Arc<AttendanceEngine>,
    job_rx: Receiver<(usize, FrameInput)>,
    result_tx: Sender<(usize, FrameResult)>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for (index, frame) in job_rx {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let result = engine.process_frame(frame);
            if matches!(result, Err(PipelineError::ShutDown)) {
                cancelled.store(true, Ordering::Relaxed);
            }
            if result_tx.send((index, result)).is_err() {
                break;
            }
        }
    })
}

fn collect_results(
    result_rx: Receiver<(usize, FrameResult)>,
    logger: &mut dyn PipelineLogger,
    config: &mut ExecutorConfig,
) -> ExecutionSummary {
    let mut summary = ExecutionSummary::default();
    let mut done = 0;
    for (index, result) in result_rx {
        done += 1;
        match &result {
            Ok(report) => {
                summary.frames_processed += 1;
                summary.faces_detected += report.faces_detected;
                summary.detections_recorded += report.recorded_count();
                logger.frame(report);
            }
            Err(e) => {
                summary.frames_failed += 1;
                log::warn!("Frame {index} failed: {e}");
            }
        }
        logger.progress(done, config.total_frames);

        if let Some(callback) = config.on_report.as_mut() {
            if !callback(index, &result) {
                config.cancelled.store(true, Ordering::Relaxed);
            }
        }
    }
    summary.cancelled = config.cancelled.load(Ordering::Relaxed);
    summary
}

fn join_threads(
    feeder: JoinHandle<usize>,
    workers: Vec<JoinHandle<()>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut first_error: Option<Box<dyn std::error::Error>> = None;
    match feeder.join() {
        Ok(submitted) => log::debug!("Feeder submitted {submitted} frames"),
        Err(_) => first_error = Some("Frame feeder thread panicked".into()),
    }
    for worker in workers {
        if worker.join().is_err() && first_error.is_none() {
            first_error = Some("Frame worker thread panicked".into());
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

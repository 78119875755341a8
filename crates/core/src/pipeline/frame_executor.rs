use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::pipeline::attendance_engine::{AttendanceEngine, FrameInput, PipelineError};
use crate::pipeline::frame_report::FrameReport;
use crate::pipeline::pipeline_logger::PipelineLogger;

pub type FrameResult = Result<FrameReport, PipelineError>;

/// Called on the submitting thread with each frame's index and result.
/// Returning `false` cancels the rest of the run.
pub type ReportCallback = Box<dyn FnMut(usize, &FrameResult) -> bool>;

pub struct ExecutorConfig {
    /// Frame count for progress reporting; 0 when unknown.
    pub total_frames: usize,
    pub on_report: Option<ReportCallback>,
    pub cancelled: Arc<AtomicBool>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            total_frames: 0,
            on_report: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub frames_processed: usize,
    pub frames_failed: usize,
    pub faces_detected: usize,
    pub detections_recorded: usize,
    pub cancelled: bool,
}

/// Drives a stream of frames through an engine.
///
/// A failing frame is counted and reported; it never stops the run.
pub trait FrameExecutor: Send {
    fn execute(
        &self,
        engine: Arc<AttendanceEngine>,
        frames: Box<dyn Iterator<Item = FrameInput> + Send>,
        logger: &mut dyn PipelineLogger,
        config: ExecutorConfig,
    ) -> Result<ExecutionSummary, Box<dyn std::error::Error>>;
}

use std::collections::HashMap;
use std::time::Instant;

use crate::pipeline::frame_report::FrameReport;

/// Observer for frame-batch runs.
///
/// The executor reports progress and per-stage timings here so the CLI and
/// tests can watch a run without the engine knowing where output goes.
pub trait PipelineLogger: Send {
    /// `total` is 0 when the frame source has no known length.
    fn progress(&mut self, current: usize, total: usize);

    fn timing(&mut self, stage: &str, duration_ms: f64);

    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Feeds one frame's stage timings and face counts.
    fn frame(&mut self, report: &FrameReport) {
        for (stage, ms) in report.timings.stages() {
            self.timing(stage, ms);
        }
        self.metric("faces_per_frame", report.faces_detected as f64);
        self.metric("recorded_per_frame", report.recorded_count() as f64);
        self.metric("unmatched_per_frame", report.unmatched_count as f64);
    }

    fn summary(&self) {}
}

pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Collects timings and metrics through the `log` facade and prints an
/// end-of-run table.
///
/// Progress lines are throttled to one every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames_seen: usize,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames_seen: 0,
            messages: Vec::new(),
        }
    }

    /// `None` until something has been recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames_seen;
        let mut lines = vec![format!(
            "Attendance run ({frames} frames, {:.1}s wall clock):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let sum: f64 = values.iter().sum();
            lines.push(format!("  {name}: avg {:.1}, sum {sum:.0}", mean(values)));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(25)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = self.frames_seen.max(current);
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Processed {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Processed {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame_report::{MatchReport, StageTimings};
    use crate::shared::face_box::{DistanceBand, FaceBox};
    use crate::shared::ids::StudentId;
    use approx::assert_relative_eq;
    use chrono::DateTime;

    fn report(faces: usize, recorded: usize) -> FrameReport {
        let face = FaceBox::new(0, 0, 80, 80);
        FrameReport {
            captured_at: DateTime::from_timestamp(1_741_600_800, 0).unwrap(),
            session_id: None,
            faces_detected: faces,
            matches: (0..recorded)
                .map(|i| MatchReport {
                    student_id: StudentId::new(format!("s{i}")),
                    confidence: 0.9,
                    bounding_box: face,
                    distance_band: DistanceBand::from_box(&face),
                    recorded: true,
                })
                .collect(),
            unmatched_count: faces - recorded,
            unmatched: Vec::new(),
            diagnostics: Vec::new(),
            processing_time_ms: 12.0,
            timings: StageTimings {
                decode_ms: 1.0,
                preprocess_ms: 2.0,
                detect_ms: 6.0,
                match_ms: 3.0,
                record_ms: 0.5,
            },
        }
    }

    // ── NullPipelineLogger ──────────────────────────────────────────

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.progress(1, 10);
        logger.timing("detect", 5.0);
        logger.metric("faces_per_frame", 3.0);
        logger.info("hello");
        logger.frame(&report(2, 1));
        logger.summary();
    }

    // ── StdoutPipelineLogger ────────────────────────────────────────

    #[test]
    fn test_frame_feeds_every_stage_and_counts() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.frame(&report(3, 2));
        logger.frame(&report(1, 1));

        for stage in ["decode", "preprocess", "detect", "match", "record"] {
            assert_eq!(logger.timings_for(stage).unwrap().len(), 2, "{stage}");
        }
        assert_eq!(logger.metrics_for("faces_per_frame").unwrap(), &[3.0, 1.0]);
        assert_eq!(logger.metrics_for("recorded_per_frame").unwrap(), &[2.0, 1.0]);
        assert_eq!(logger.metrics_for("unmatched_per_frame").unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_summary_lists_stages_and_metrics() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(4, 4);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.metric("faces_per_frame", 3.0);
        logger.metric("faces_per_frame", 4.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Attendance run (4 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("max   30.0ms"));
        assert!(summary.contains("faces_per_frame: avg 3.5, sum 7"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_is_none() {
        assert!(StdoutPipelineLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_progress_tracks_highest_frame_with_unknown_total() {
        let mut logger = StdoutPipelineLogger::new(10);
        for i in [1, 3, 2, 5] {
            logger.progress(i, 0);
        }
        assert_eq!(logger.frames_seen(), 5);
    }

    #[test]
    fn test_info_keeps_messages() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.info("gallery version 3 loaded");
        assert_eq!(logger.messages, vec!["gallery version 3 loaded".to_string()]);
    }

    #[test]
    fn test_stage_average() {
        let mut logger = StdoutPipelineLogger::default();
        for ms in [10.0, 20.0, 30.0] {
            logger.timing("match", ms);
        }
        assert_relative_eq!(mean(logger.timings_for("match").unwrap()), 20.0);
        assert_eq!(logger.throttle_frames, 25);
    }
}

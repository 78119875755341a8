use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::window_classifier::WindowClassifier;
use crate::detection::infrastructure::haar_cascade::CascadeError;
use crate::detection::infrastructure::multi_pass_detector::MultiPassDetector;
use crate::pipeline::frame_report::{
    FrameDiagnostic, FrameReport, MatchReport, StageTimings, UnmatchedFace,
};
use crate::preprocessing::infrastructure::frame_preprocessor::FramePreprocessor;
use crate::preprocessing::infrastructure::image_decoder::decode_frame;
use crate::presence::domain::detection_event::DetectionEvent;
use crate::recognition::domain::embedder::Embedder;
use crate::recognition::domain::gallery_handle::GalleryHandle;
use crate::recognition::domain::identity_gallery::{GalleryError, IdentityGallery};
use crate::recognition::domain::match_outcome::{MatchOutcome, UnmatchedReason};
use crate::recognition::face_matcher::{FaceMatcher, MatcherSettings};
use crate::recognition::gallery_trainer::{EnrollmentImage, GalleryTrainer};
use crate::recognition::infrastructure::gallery_file::load_gallery;
use crate::session::domain::session::SessionState;
use crate::session::domain::session_resolver::{CameraContext, SessionResolver};
use crate::session::session_manager::{
    FinalizeOutcome, RecordOutcome, SessionError, SessionManager,
};
use crate::shared::config::{ConfigError, EngineConfig};
use crate::shared::frame::{Frame, FrameError};
use crate::shared::ids::SessionId;

type PortError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("face detection failed: {0}")]
    Detection(#[source] PortError),
    #[error("face embedding failed: {0}")]
    Embedding(#[source] PortError),
    #[error("engine has been shut down")]
    ShutDown,
}

pub enum FramePayload {
    /// Encoded image bytes, bare base64 or a data URL.
    Encoded(Vec<u8>),
    Decoded(Frame),
}

/// One inbound frame. Without a session id the session is resolved from
/// the camera context, if a resolver is configured.
pub struct FrameInput {
    pub payload: FramePayload,
    pub captured_at: DateTime<Utc>,
    pub session_id: Option<SessionId>,
    pub camera: Option<CameraContext>,
}

impl FrameInput {
    pub fn encoded(bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            payload: FramePayload::Encoded(bytes),
            captured_at,
            session_id: None,
            camera: None,
        }
    }

    pub fn decoded(frame: Frame) -> Self {
        Self {
            captured_at: frame.captured_at(),
            payload: FramePayload::Decoded(frame),
            session_id: None,
            camera: None,
        }
    }

    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn from_camera(mut self, camera: CameraContext) -> Self {
        self.camera = Some(camera);
        self
    }
}

/// The presence engine: preprocess, detect, match, record.
///
/// Constructed explicitly and shared by reference (usually behind an `Arc`)
/// with every frame worker. `process_frame` takes `&self`; the only shared
/// mutable state is the gallery handle and the session manager, both of
/// which synchronize internally.
pub struct AttendanceEngine {
    config: EngineConfig,
    preprocessor: FramePreprocessor,
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn Embedder>,
    matcher: FaceMatcher,
    gallery: Arc<GalleryHandle>,
    sessions: Arc<SessionManager>,
    resolver: Option<Arc<dyn SessionResolver>>,
    shut_down: AtomicBool,
}

impl AttendanceEngine {
    /// Validates `config` and assembles an engine with an empty gallery and
    /// its own session manager.
    pub fn new(
        config: EngineConfig,
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let gallery = Arc::new(GalleryHandle::new());
        let sessions = Arc::new(SessionManager::from_config(&config)?);
        let matcher = FaceMatcher::new(
            Arc::clone(&embedder),
            Arc::clone(&gallery),
            MatcherSettings::from_config(&config),
        );
        log::info!(
            "Attendance engine ready (thresholds {}/{}/{}, max {} faces per frame)",
            config.present_threshold,
            config.partial_threshold,
            config.late_threshold,
            config.max_faces_per_frame
        );
        Ok(Self {
            preprocessor: FramePreprocessor::new(config.preprocessing.clone()),
            config,
            detector,
            embedder,
            matcher,
            gallery,
            sessions,
            resolver: None,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Builds the multi-pass cascade detector from `config.detection`.
    pub fn with_cascades(
        config: EngineConfig,
        frontal: Arc<dyn WindowClassifier>,
        profile: Option<Arc<dyn WindowClassifier>>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let detector =
            MultiPassDetector::new(frontal, profile, &config.detection, config.max_faces_per_frame);
        Self::new(config, Arc::new(detector), embedder)
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SessionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_gallery(mut self, gallery: Arc<GalleryHandle>) -> Self {
        self.matcher = FaceMatcher::new(
            Arc::clone(&self.embedder),
            Arc::clone(&gallery),
            *self.matcher.settings(),
        );
        self.gallery = gallery;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn gallery(&self) -> &Arc<GalleryHandle> {
        &self.gallery
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn detector(&self) -> &Arc<dyn FaceDetector> {
        &self.detector
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Runs one frame end to end and records every accepted match.
    ///
    /// Routine outcomes (no faces, unmatched faces, no session) are part of
    /// the report. Errors are per-frame: an undecodable frame or a failing
    /// detector/embedder affects only this call.
    pub fn process_frame(&self, input: FrameInput) -> Result<FrameReport, PipelineError> {
        if self.is_shut_down() {
            return Err(PipelineError::ShutDown);
        }
        let started = Instant::now();
        let mut timings = StageTimings::default();
        let captured_at = input.captured_at;
        let session_id = self.resolve_session(&input);
        if let Some(id) = session_id {
            if self.sessions.state(id)? == SessionState::Ended {
                log::info!("Dropping frame captured at {captured_at}: session {id} has ended");
                let mut report = FrameReport {
                    captured_at,
                    session_id,
                    faces_detected: 0,
                    matches: Vec::new(),
                    unmatched_count: 0,
                    unmatched: Vec::new(),
                    diagnostics: Vec::new(),
                    processing_time_ms: 0.0,
                    timings,
                };
                report.push_diagnostic(FrameDiagnostic::SessionClosed { session_id: id });
                report.processing_time_ms = elapsed_ms(started);
                return Ok(report);
            }
        }

        let t = Instant::now();
        let frame = match input.payload {
            FramePayload::Decoded(frame) => frame,
            FramePayload::Encoded(bytes) => decode_frame(&bytes, captured_at).map_err(|e| {
                log::warn!("Dropping invalid frame captured at {captured_at}: {e}");
                e
            })?,
        };
        timings.decode_ms = elapsed_ms(t);

        let t = Instant::now();
        let pre = self.preprocessor.preprocess(&frame).map_err(|e| {
            log::warn!("Dropping invalid frame captured at {captured_at}: {e}");
            e
        })?;
        timings.preprocess_ms = elapsed_ms(t);

        let t = Instant::now();
        let faces = self.detector.detect(&pre).map_err(PipelineError::Detection)?;
        timings.detect_ms = elapsed_ms(t);

        let t = Instant::now();
        let face_matches = self
            .matcher
            .match_faces(pre.gray(), &faces)
            .map_err(PipelineError::Embedding)?;
        timings.match_ms = elapsed_ms(t);

        let mut report = FrameReport {
            captured_at,
            session_id,
            faces_detected: faces.len(),
            matches: Vec::new(),
            unmatched_count: 0,
            unmatched: Vec::new(),
            diagnostics: Vec::new(),
            processing_time_ms: 0.0,
            timings,
        };
        if session_id.is_none() {
            report.push_diagnostic(FrameDiagnostic::NoActiveSession);
        }

        let t = Instant::now();
        for m in face_matches {
            match m.outcome {
                MatchOutcome::Matched {
                    student_id,
                    confidence,
                    ..
                } => {
                    let recorded = match session_id {
                        Some(id) => {
                            let event = DetectionEvent::new(
                                student_id.clone(),
                                captured_at,
                                confidence,
                                m.face,
                                m.quality,
                            );
                            match self.sessions.record_detection(id, event)? {
                                RecordOutcome::Recorded(_) => true,
                                RecordOutcome::NotEnrolled => {
                                    report.push_diagnostic(FrameDiagnostic::NotEnrolled {
                                        student_id: student_id.clone(),
                                    });
                                    false
                                }
                                RecordOutcome::NotActive => {
                                    report.push_diagnostic(FrameDiagnostic::SessionNotStarted {
                                        session_id: id,
                                    });
                                    false
                                }
                                RecordOutcome::SessionClosed => {
                                    report.push_diagnostic(FrameDiagnostic::SessionClosed {
                                        session_id: id,
                                    });
                                    false
                                }
                            }
                        }
                        None => false,
                    };
                    report.matches.push(MatchReport {
                        student_id,
                        confidence,
                        bounding_box: m.face,
                        distance_band: m.distance_band,
                        recorded,
                    });
                }
                MatchOutcome::Unmatched { reason } => {
                    if reason == UnmatchedReason::NoGallery {
                        report.push_diagnostic(FrameDiagnostic::NoGalleryLoaded);
                    }
                    report.unmatched.push(UnmatchedFace {
                        bounding_box: m.face,
                        reason,
                        quality: m.quality,
                    });
                }
            }
        }
        report.timings.record_ms = elapsed_ms(t);
        report.unmatched_count = report.unmatched.len();
        report.processing_time_ms = elapsed_ms(started);

        log::debug!(
            "Frame {captured_at}: {} faces, {} matched, {} recorded, {} unmatched in {:.1}ms",
            report.faces_detected,
            report.matches.len(),
            report.recorded_count(),
            report.unmatched_count,
            report.processing_time_ms
        );
        Ok(report)
    }

    fn resolve_session(&self, input: &FrameInput) -> Option<SessionId> {
        if input.session_id.is_some() {
            return input.session_id;
        }
        let resolver = self.resolver.as_ref()?;
        let camera = input.camera.as_ref()?;
        resolver.resolve_active_session(camera).map(|s| s.id())
    }

    /// Swaps in a new gallery snapshot. In-flight matches finish against the
    /// snapshot they started with.
    pub fn publish_gallery(&self, gallery: IdentityGallery) -> Result<u64, PipelineError> {
        Ok(self.gallery.publish(gallery)?.version())
    }

    pub fn load_gallery(&self, path: &Path) -> Result<u64, PipelineError> {
        self.publish_gallery(load_gallery(path)?)
    }

    /// Trains a new snapshot on a dedicated thread and publishes it.
    ///
    /// Frame processing continues against the current snapshot meanwhile.
    pub fn retrain_in_background(
        &self,
        trainer: Arc<GalleryTrainer>,
        images: Vec<EnrollmentImage>,
    ) -> JoinHandle<Result<u64, PipelineError>> {
        let gallery = Arc::clone(&self.gallery);
        std::thread::spawn(move || {
            log::info!("Retraining gallery from {} enrollment images", images.len());
            let next = trainer.train(&images, gallery.version())?;
            Ok(gallery.publish(next)?.version())
        })
    }

    /// Closes every open session and stops accepting frames.
    pub fn shutdown(&self, now: DateTime<Utc>) -> Vec<FinalizeOutcome> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        let outcomes = self.sessions.end_all(now);
        log::info!("Attendance engine shut down, {} sessions finalized", outcomes.len());
        outcomes
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::preprocessing::domain::preprocessed_frame::PreprocessedFrame;
    use crate::presence::domain::attendance_status::AttendanceStatus;
    use crate::recognition::domain::identity_gallery::GalleryEntry;
    use crate::session::domain::session::{Session, SessionSpec};
    use crate::shared::face_box::FaceBox;
    use crate::shared::frame::GrayImage;
    use crate::shared::ids::{CourseRegistrationId, StudentId};
    use chrono::Duration;
    use rstest::rstest;
    use std::sync::atomic::AtomicUsize;

    pub(crate) const FACE_A: FaceBox = FaceBox {
        x: 20,
        y: 40,
        width: 90,
        height: 90,
    };
    pub(crate) const FACE_B: FaceBox = FaceBox {
        x: 180,
        y: 40,
        width: 90,
        height: 90,
    };
    /// Flat patch: far below the quality floor.
    pub(crate) const FACE_BLURRY: FaceBox = FaceBox {
        x: 140,
        y: 180,
        width: 24,
        height: 24,
    };

    /// Reports a fixed set of boxes on every frame.
    pub(crate) struct FixedDetector(pub Vec<FaceBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _frame: &PreprocessedFrame) -> Result<Vec<FaceBox>, PortError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&self, _frame: &PreprocessedFrame) -> Result<Vec<FaceBox>, PortError> {
            Err("cascade exploded".into())
        }
    }

    /// Embeds a face as its horizontal and vertical gradient energy, so
    /// vertical stripes land near `[1, 0]` and horizontal ones near `[0, 1]`.
    #[derive(Default)]
    pub(crate) struct OrientationEmbedder {
        pub calls: AtomicUsize,
    }

    impl Embedder for OrientationEmbedder {
        fn dimension(&self) -> usize {
            2
        }

        fn embed(&self, face: &GrayImage) -> Result<Vec<f32>, PortError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let (mut gx, mut gy) = (0f32, 0f32);
            for y in 0..face.height() - 1 {
                for x in 0..face.width() - 1 {
                    let c = face.get(x, y) as f32;
                    gx += (face.get(x + 1, y) as f32 - c).abs();
                    gy += (face.get(x, y + 1) as f32 - c).abs();
                }
            }
            Ok(vec![gx, gy])
        }
    }

    /// 320x240 gray frame: vertical stripes in `FACE_A`, horizontal stripes
    /// in `FACE_B`, flat elsewhere.
    pub(crate) fn classroom_frame(captured_at: DateTime<Utc>) -> Frame {
        let (w, h) = (320usize, 240usize);
        let mut data = vec![128u8; w * h];
        for (face, vertical) in [(FACE_A, true), (FACE_B, false)] {
            for y in face.y as usize..(face.y + face.height) as usize {
                for x in face.x as usize..(face.x + face.width) as usize {
                    let phase = if vertical { x } else { y };
                    data[y * w + x] = if (phase / 2) % 2 == 0 { 40 } else { 210 };
                }
            }
        }
        Frame::new(data, w as u32, h as u32, 1, captured_at).unwrap()
    }

    pub(crate) fn gallery(version: u64) -> IdentityGallery {
        IdentityGallery::new(
            version,
            vec![
                GalleryEntry {
                    student_id: StudentId::new("alice"),
                    embedding: vec![1.0, 0.0],
                },
                GalleryEntry {
                    student_id: StudentId::new("bob"),
                    embedding: vec![0.0, 1.0],
                },
            ],
        )
        .unwrap()
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_741_600_800, 0).unwrap()
    }

    pub(crate) fn engine_with(faces: Vec<FaceBox>) -> (AttendanceEngine, Arc<OrientationEmbedder>) {
        let embedder = Arc::new(OrientationEmbedder::default());
        let engine = AttendanceEngine::new(
            EngineConfig::default(),
            Arc::new(FixedDetector(faces)),
            embedder.clone(),
        )
        .unwrap();
        (engine, embedder)
    }

    pub(crate) fn start_session(engine: &AttendanceEngine, roster: &[&str]) -> SessionId {
        let spec = SessionSpec::new(CourseRegistrationId::new("CSC301"), t0(), Duration::minutes(90))
            .with_roster(roster.iter().map(|s| StudentId::new(*s)))
            .with_venue("LT1");
        let id = engine.sessions().schedule(spec).unwrap();
        engine.sessions().start(id, t0()).unwrap();
        id
    }

    fn frame_at(minute: i64, session: SessionId) -> FrameInput {
        FrameInput::decoded(classroom_frame(t0() + Duration::minutes(minute))).for_session(session)
    }

    // ── Matching and recording ───────────────────────────────────────

    #[test]
    fn test_two_students_in_one_frame_are_both_recorded() {
        let (engine, _) = engine_with(vec![FACE_A, FACE_B]);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice", "bob"]);

        let report = engine.process_frame(frame_at(5, id)).unwrap();
        assert_eq!(report.faces_detected, 2);
        assert_eq!(report.recorded_count(), 2);
        let mut ids: Vec<&str> = report.matches.iter().map(|m| m.student_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["alice", "bob"]);

        for student in ["alice", "bob"] {
            let r = engine
                .sessions()
                .record(id, &StudentId::new(student))
                .unwrap()
                .unwrap();
            assert_eq!(r.detection_count(), 1);
        }
    }

    #[test]
    fn test_low_quality_face_never_reaches_matcher_or_ledger() {
        let (engine, embedder) = engine_with(vec![FACE_A, FACE_BLURRY]);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice"]);

        let report = engine.process_frame(frame_at(5, id)).unwrap();
        assert_eq!(report.unmatched_count, 1);
        assert_eq!(report.unmatched[0].reason, UnmatchedReason::LowQuality);
        assert_eq!(report.unmatched[0].bounding_box, FACE_BLURRY);
        // Two attempts for the one good face, none for the blurry one.
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 2);
        assert_eq!(engine.sessions().records(id).unwrap().len(), 1);
    }

    #[test]
    fn test_no_gallery_degrades_to_unmatched() {
        let (engine, embedder) = engine_with(vec![FACE_A, FACE_B]);
        let id = start_session(&engine, &["alice"]);
        let report = engine.process_frame(frame_at(1, id)).unwrap();
        assert_eq!(report.faces_detected, 2);
        assert!(report.matches.is_empty());
        assert!(report
            .unmatched
            .iter()
            .all(|u| u.reason == UnmatchedReason::NoGallery));
        assert!(report.diagnostics.contains(&FrameDiagnostic::NoGalleryLoaded));
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_empty_room_is_an_empty_report() {
        let (engine, _) = engine_with(Vec::new());
        let id = start_session(&engine, &["alice"]);
        let report = engine.process_frame(frame_at(1, id)).unwrap();
        assert_eq!(report.faces_detected, 0);
        assert!(report.matches.is_empty());
        assert_eq!(report.unmatched_count, 0);
    }

    #[test]
    fn test_not_enrolled_is_reported_not_recorded() {
        let (engine, _) = engine_with(vec![FACE_A, FACE_B]);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice"]);
        let report = engine.process_frame(frame_at(1, id)).unwrap();
        assert_eq!(report.recorded_count(), 1);
        assert!(report.diagnostics.contains(&FrameDiagnostic::NotEnrolled {
            student_id: StudentId::new("bob"),
        }));
        assert!(engine
            .sessions()
            .record(id, &StudentId::new("bob"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_frame_without_session_still_reports_matches() {
        let (engine, _) = engine_with(vec![FACE_A]);
        engine.publish_gallery(gallery(1)).unwrap();
        let report = engine
            .process_frame(FrameInput::decoded(classroom_frame(t0())))
            .unwrap();
        assert_eq!(report.matches.len(), 1);
        assert!(!report.matches[0].recorded);
        assert_eq!(report.diagnostics, vec![FrameDiagnostic::NoActiveSession]);
    }

    #[test]
    fn test_session_resolved_from_camera() {
        struct OnlySession(Arc<SessionManager>);
        impl SessionResolver for OnlySession {
            fn resolve_active_session(&self, _camera: &CameraContext) -> Option<Session> {
                self.0
                    .sessions()
                    .into_iter()
                    .find(|s| s.state() == SessionState::Active)
            }
        }

        let (engine, _) = engine_with(vec![FACE_A]);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice"]);
        let engine = {
            let sessions = Arc::clone(engine.sessions());
            engine.with_resolver(Arc::new(OnlySession(sessions)))
        };
        let input = FrameInput::decoded(classroom_frame(t0())).from_camera(CameraContext::new("cam-1"));
        let report = engine.process_frame(input).unwrap();
        assert_eq!(report.session_id, Some(id));
        assert_eq!(report.recorded_count(), 1);
    }

    // ── Failures ─────────────────────────────────────────────────────

    #[test]
    fn test_undecodable_frame_is_invalid_frame_error() {
        let (engine, _) = engine_with(vec![FACE_A]);
        let err = engine
            .process_frame(FrameInput::encoded(b"not an image".to_vec(), t0()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFrame(_)));
    }

    #[test]
    fn test_detector_failure_is_per_frame_error() {
        let engine = AttendanceEngine::new(
            EngineConfig::default(),
            Arc::new(FailingDetector),
            Arc::new(OrientationEmbedder::default()),
        )
        .unwrap();
        let err = engine
            .process_frame(FrameInput::decoded(classroom_frame(t0())))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Detection(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let config = EngineConfig {
            late_threshold: 80.0,
            ..EngineConfig::default()
        };
        let result = AttendanceEngine::new(
            config,
            Arc::new(FixedDetector(Vec::new())),
            Arc::new(OrientationEmbedder::default()),
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    // ── Session end ──────────────────────────────────────────────────

    #[test]
    fn test_unseen_student_finalizes_absent() {
        let (engine, _) = engine_with(vec![FACE_A]);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice", "carol"]);
        for minute in (0..=60).step_by(5) {
            engine.process_frame(frame_at(minute, id)).unwrap();
        }
        let outcome = engine
            .sessions()
            .end_session(id, t0() + Duration::minutes(90))
            .unwrap();
        let carol = outcome
            .records
            .iter()
            .find(|r| r.student_id.as_str() == "carol")
            .unwrap();
        assert_eq!(carol.detection_count, 0);
        assert_eq!(carol.status, AttendanceStatus::Absent);
        assert!(carol.is_locked);
        let alice = outcome
            .records
            .iter()
            .find(|r| r.student_id.as_str() == "alice")
            .unwrap();
        assert_eq!(alice.detection_count, 13);
        assert_eq!(alice.status, AttendanceStatus::Partial);
    }

    #[test]
    fn test_late_frames_after_close_are_dropped() {
        let (engine, _) = engine_with(vec![FACE_A]);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice"]);
        engine.process_frame(frame_at(1, id)).unwrap();
        engine
            .sessions()
            .end_session(id, t0() + Duration::minutes(90))
            .unwrap();
        let report = engine.process_frame(frame_at(91, id)).unwrap();
        assert_eq!(report.recorded_count(), 0);
        assert!(report
            .diagnostics
            .contains(&FrameDiagnostic::SessionClosed { session_id: id }));
        let r = engine
            .sessions()
            .record(id, &StudentId::new("alice"))
            .unwrap()
            .unwrap();
        assert_eq!(r.detection_count(), 1);
    }

    #[rstest]
    #[case::empty_frame(vec![])]
    #[case::known_face(vec![FACE_A])]
    fn test_closed_session_skips_detection(#[case] faces: Vec<FaceBox>) {
        let (engine, embedder) = engine_with(faces);
        engine.publish_gallery(gallery(1)).unwrap();
        let id = start_session(&engine, &["alice"]);
        engine
            .sessions()
            .end_session(id, t0() + Duration::minutes(90))
            .unwrap();

        let report = engine.process_frame(frame_at(91, id)).unwrap();
        assert_eq!(report.faces_detected, 0);
        assert!(report.matches.is_empty());
        assert_eq!(
            report.diagnostics,
            vec![FrameDiagnostic::SessionClosed { session_id: id }]
        );
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_shutdown_closes_sessions_and_refuses_frames() {
        let (engine, _) = engine_with(vec![FACE_A]);
        let id = start_session(&engine, &["alice"]);
        let outcomes = engine.shutdown(t0() + Duration::minutes(30));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            engine.sessions().session(id).unwrap().state(),
            SessionState::Ended
        );
        assert!(engine.shutdown(t0() + Duration::minutes(31)).is_empty());
        assert!(matches!(
            engine.process_frame(frame_at(31, id)),
            Err(PipelineError::ShutDown)
        ));
    }

    // ── Gallery lifecycle ────────────────────────────────────────────

    #[test]
    fn test_publish_rejects_stale_gallery() {
        let (engine, _) = engine_with(vec![FACE_A]);
        assert_eq!(engine.publish_gallery(gallery(2)).unwrap(), 2);
        assert!(matches!(
            engine.publish_gallery(gallery(2)),
            Err(PipelineError::Gallery(GalleryError::StaleVersion { .. }))
        ));
    }

    #[test]
    fn test_retrain_in_background_publishes_next_version() {
        let dir = tempfile::tempdir().unwrap();
        let frame = classroom_frame(t0());
        let img = image::GrayImage::from_raw(320, 240, frame.data().to_vec()).unwrap();
        img.save(dir.path().join("alice_1.png")).unwrap();

        let (engine, embedder) = engine_with(vec![FACE_A]);
        engine.publish_gallery(gallery(3)).unwrap();
        let trainer = Arc::new(GalleryTrainer::new(
            FramePreprocessor::new(engine.config().preprocessing.clone()),
            Arc::clone(engine.detector()),
            embedder,
        ));
        let images = crate::recognition::gallery_trainer::scan_enrollment_dir(dir.path()).unwrap();
        let version = engine
            .retrain_in_background(trainer, images)
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(version, 4);
        let snapshot = engine.gallery().snapshot().unwrap();
        assert_eq!(snapshot.version(), 4);
        assert_eq!(snapshot.students()[0].as_str(), "alice");
    }
}

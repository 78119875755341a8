use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};

use attendance_core::detection::domain::face_detector::FaceDetector;
use attendance_core::detection::domain::window_classifier::WindowClassifier;
use attendance_core::detection::infrastructure::haar_cascade::HaarCascade;
use attendance_core::detection::infrastructure::multi_pass_detector::MultiPassDetector;
use attendance_core::pipeline::attendance_engine::{AttendanceEngine, FrameInput};
use attendance_core::pipeline::frame_executor::{ExecutorConfig, FrameExecutor};
use attendance_core::pipeline::infrastructure::threaded_frame_executor::ThreadedFrameExecutor;
use attendance_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use attendance_core::preprocessing::infrastructure::frame_preprocessor::FramePreprocessor;
use attendance_core::recognition::domain::embedder::Embedder;
use attendance_core::recognition::gallery_trainer::{scan_enrollment_dir, GalleryTrainer};
use attendance_core::recognition::infrastructure::gallery_file::{load_gallery, save_gallery};
use attendance_core::recognition::infrastructure::lbp_embedder::LbpHistogramEmbedder;
use attendance_core::session::domain::session::SessionSpec;
use attendance_core::session::infrastructure::json_attendance_store::JsonAttendanceStore;
use attendance_core::session::session_manager::SessionManager;
use attendance_core::shared::config::EngineConfig;
use attendance_core::shared::constants::IMAGE_EXTENSIONS;
use attendance_core::shared::ids::{CourseRegistrationId, StudentId};

/// Classroom attendance from camera frames.
#[derive(Parser)]
#[command(name = "attendance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the attendance status for a presence percentage.
    Classify {
        percentage: f64,

        /// Engine configuration (JSON). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective values.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },

    /// Enroll labelled images into a gallery snapshot.
    BuildGallery {
        /// `<student_id>/<image>` folders or `<student_id>[_n].<ext>` files.
        #[arg(long)]
        images: PathBuf,

        /// Frontal face cascade (JSON).
        #[arg(long)]
        cascade: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// ArcFace-style ONNX model; the built-in LBP embedder is used otherwise.
        #[arg(long)]
        embedding_model: Option<PathBuf>,

        /// Snapshot version to write. Defaults to one past the existing output file.
        #[arg(long)]
        version: Option<u64>,

        /// Also enroll mirrored and brightness-shifted copies.
        #[arg(long)]
        augment: bool,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run one session over a directory of frames and print the finalized records.
    Run {
        #[arg(long)]
        gallery: PathBuf,

        #[arg(long)]
        cascade: PathBuf,

        /// Optional profile-face cascade for the extra detection passes.
        #[arg(long)]
        profile_cascade: Option<PathBuf>,

        /// Frames in capture order (sorted by file name).
        #[arg(long)]
        frames: PathBuf,

        /// Expected students, comma-separated. Empty accepts every recognized student.
        #[arg(long, value_delimiter = ',')]
        roster: Vec<String>,

        #[arg(long)]
        course: String,

        #[arg(long)]
        duration_minutes: Option<i64>,

        /// Seconds between consecutive frames.
        #[arg(long, default_value = "10")]
        interval_seconds: i64,

        /// Session start (RFC 3339). Defaults to now.
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        embedding_model: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Where finalized sessions are stored. Defaults to the user data directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Classify { percentage, config } => {
            if !(0.0..=100.0).contains(&percentage) {
                return Err(format!("Percentage must be between 0 and 100, got {percentage}").into());
            }
            let thresholds = load_config(config.as_deref())?.thresholds()?;
            println!("{}", thresholds.classify(percentage));
        }
        Command::CheckConfig { config } => {
            let config = EngineConfig::load(&config)?;
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::BuildGallery {
            images,
            cascade,
            output,
            embedding_model,
            version,
            augment,
            config,
        } => build_gallery(
            &images,
            &cascade,
            &output,
            embedding_model.as_deref(),
            version,
            augment,
            load_config(config.as_deref())?,
        )?,
        Command::Run {
            gallery,
            cascade,
            profile_cascade,
            frames,
            roster,
            course,
            duration_minutes,
            interval_seconds,
            start,
            workers,
            embedding_model,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            let duration =
                session_duration(duration_minutes.unwrap_or(config.default_session_minutes))?;
            let interval = frame_interval(interval_seconds)?;
            let output = match output {
                Some(dir) => dir,
                None => default_output_dir()?,
            };
            let engine = AttendanceEngine::with_cascades(
                config,
                load_cascade(&cascade)?,
                profile_cascade.as_deref().map(load_cascade).transpose()?,
                build_embedder(embedding_model.as_deref())?,
            )?;
            let spec = SessionSpec::new(
                CourseRegistrationId::new(course),
                start.unwrap_or_else(Utc::now),
                duration,
            )
            .with_roster(roster.into_iter().filter(|s| !s.is_empty()).map(StudentId::new));
            run_session(
                engine,
                &gallery,
                &frames,
                spec,
                interval,
                workers,
                &output,
            )?;
        }
    }
    Ok(())
}

fn session_duration(minutes: i64) -> Result<Duration, String> {
    if minutes <= 0 {
        return Err(format!("Session duration must be positive, got {minutes} minutes"));
    }
    Duration::try_minutes(minutes)
        .ok_or_else(|| format!("Session duration of {minutes} minutes is out of range"))
}

fn frame_interval(seconds: i64) -> Result<Duration, String> {
    if seconds <= 0 {
        return Err(format!("Interval must be positive, got {seconds}"));
    }
    Duration::try_seconds(seconds)
        .ok_or_else(|| format!("Interval of {seconds} seconds is out of range"))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn load_cascade(path: &Path) -> Result<Arc<dyn WindowClassifier>, Box<dyn std::error::Error>> {
    log::info!("Loading cascade {}", path.display());
    Ok(Arc::new(HaarCascade::load(path)?))
}

#[cfg(feature = "onnx")]
fn build_embedder(model: Option<&Path>) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    use attendance_core::recognition::infrastructure::onnx_embedder::{
        OnnxEmbedder, DEFAULT_DIMENSION,
    };
    match model {
        Some(path) => Ok(Arc::new(
            OnnxEmbedder::new(path, DEFAULT_DIMENSION).map_err(|e| e.to_string())?,
        )),
        None => Ok(Arc::new(LbpHistogramEmbedder::default())),
    }
}

#[cfg(not(feature = "onnx"))]
fn build_embedder(model: Option<&Path>) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    if model.is_some() {
        return Err("--embedding-model requires a build with the `onnx` feature".into());
    }
    Ok(Arc::new(LbpHistogramEmbedder::default()))
}

fn build_gallery(
    images: &Path,
    cascade: &Path,
    output: &Path,
    embedding_model: Option<&Path>,
    version: Option<u64>,
    augment: bool,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let previous = match version {
        Some(0) => return Err("Gallery version must be at least 1".into()),
        Some(v) => Some(v - 1).filter(|p| *p > 0),
        None if output.exists() => Some(load_gallery(output)?.version()),
        None => None,
    };

    let detector: Arc<dyn FaceDetector> = Arc::new(MultiPassDetector::new(
        load_cascade(cascade)?,
        None,
        &config.detection,
        config.max_faces_per_frame,
    ));
    let trainer = GalleryTrainer::new(
        FramePreprocessor::new(config.preprocessing.clone()),
        detector,
        build_embedder(embedding_model)?,
    )
    .with_augmentation(augment);

    let enrollment = scan_enrollment_dir(images)?;
    log::info!("Found {} enrollment images in {}", enrollment.len(), images.display());
    let gallery = trainer.train(&enrollment, previous)?;
    save_gallery(&gallery, output)?;
    println!(
        "Wrote gallery version {} ({} entries, {} students) to {}",
        gallery.version(),
        gallery.len(),
        gallery.students().len(),
        output.display()
    );
    Ok(())
}

fn run_session(
    engine: AttendanceEngine,
    gallery: &Path,
    frames_dir: &Path,
    spec: SessionSpec,
    interval: Duration,
    workers: Option<usize>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = Arc::new(
        SessionManager::from_config(engine.config())?
            .with_store(Arc::new(JsonAttendanceStore::new(output))),
    );
    let engine = engine.with_sessions(Arc::clone(&sessions));
    let version = engine.load_gallery(gallery)?;
    log::info!("Gallery version {version} loaded from {}", gallery.display());

    let start = spec.start;
    let end = spec.start + spec.scheduled_duration;
    let id = sessions.schedule(spec)?;
    sessions.start(id, start)?;

    let paths = list_frames(frames_dir)?;
    let total = paths.len();
    let source = paths.into_iter().enumerate().filter_map(move |(i, path)| {
        let captured_at = start + interval * i as i32;
        match std::fs::read(&path) {
            Ok(bytes) => Some(FrameInput::encoded(bytes, captured_at).for_session(id)),
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                None
            }
        }
    });

    let executor = match workers {
        Some(n) => ThreadedFrameExecutor::new(n),
        None => ThreadedFrameExecutor::default(),
    };
    let engine = Arc::new(engine);
    let mut logger = StdoutPipelineLogger::default();
    let summary = executor.execute(
        Arc::clone(&engine),
        Box::new(source),
        &mut logger,
        ExecutorConfig {
            total_frames: total,
            ..ExecutorConfig::default()
        },
    )?;
    log::info!(
        "{} frames processed, {} failed, {} detections recorded",
        summary.frames_processed,
        summary.frames_failed,
        summary.detections_recorded
    );

    let stats = sessions.session_stats(id, end)?;
    let outcome = sessions.end_session(id, end)?;
    if outcome.stored {
        log::info!("Session {id} stored in {}", output.display());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "session_id": id,
            "summary": stats,
            "status_changes": outcome.status_changes.len(),
            "records": outcome.records,
        }))?
    );
    Ok(())
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image(p))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(format!("No frames found in {}", dir.display()).into());
    }
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn default_output_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    dirs::data_dir()
        .map(|d| d.join("attendance").join("sessions"))
        .ok_or_else(|| "Could not determine a data directory; pass --output".into())
}

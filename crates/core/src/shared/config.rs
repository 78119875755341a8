use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::domain::attendance_status::StatusThresholds;
use crate::shared::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error(
        "status thresholds must be strictly descending (present > partial > late), \
         got present={present}, partial={partial}, late={late}"
    )]
    ThresholdOrder {
        present: f64,
        partial: f64,
        late: f64,
    },
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How a new gallery snapshot replaces the current one.
///
/// Only whole-snapshot swaps exist; the enum keeps unknown policies out of
/// config files at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GalleryVersionPolicy {
    #[default]
    AtomicSwap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub gamma: f64,
    pub clahe_clip_limit: f64,
    pub clahe_tiles: usize,
    pub bilateral_diameter: usize,
    pub bilateral_sigma_color: f64,
    pub bilateral_sigma_space: f64,
    pub sharpen: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            gamma: 1.5,
            clahe_clip_limit: 4.0,
            clahe_tiles: 4,
            bilateral_diameter: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            sharpen: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub min_face_size: usize,
    pub max_face_size: usize,
    pub nms_score_floor: f64,
    pub nms_overlap_threshold: f64,
    pub profile_pass: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            max_face_size: DEFAULT_MAX_FACE_SIZE,
            nms_score_floor: 0.1,
            nms_overlap_threshold: 0.2,
            profile_pass: true,
        }
    }
}

/// Institution-wide engine configuration.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub present_threshold: f64,
    pub partial_threshold: f64,
    pub late_threshold: f64,
    pub match_distance_threshold: f64,
    pub distance_relaxation: f64,
    pub detection_quality_floor: f64,
    pub max_faces_per_frame: usize,
    pub continuity_buffer_seconds: f64,
    pub default_session_minutes: i64,
    pub gallery_version_policy: GalleryVersionPolicy,
    pub preprocessing: PreprocessingConfig,
    pub detection: DetectionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            present_threshold: DEFAULT_PRESENT_THRESHOLD,
            partial_threshold: DEFAULT_PARTIAL_THRESHOLD,
            late_threshold: DEFAULT_LATE_THRESHOLD,
            match_distance_threshold: DEFAULT_MATCH_DISTANCE_THRESHOLD,
            distance_relaxation: DEFAULT_DISTANCE_RELAXATION,
            detection_quality_floor: DEFAULT_QUALITY_FLOOR,
            max_faces_per_frame: DEFAULT_MAX_FACES_PER_FRAME,
            continuity_buffer_seconds: DEFAULT_CONTINUITY_BUFFER_SECS,
            default_session_minutes: DEFAULT_SESSION_MINUTES,
            gallery_version_policy: GalleryVersionPolicy::AtomicSwap,
            preprocessing: PreprocessingConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn thresholds(&self) -> Result<StatusThresholds, ConfigError> {
        StatusThresholds::new(
            self.present_threshold,
            self.partial_threshold,
            self.late_threshold,
        )
    }

    /// Rejects inconsistent settings before anything is built from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()?;

        check_range("match_distance_threshold", self.match_distance_threshold, 0.0, 2.0)?;
        check_range("distance_relaxation", self.distance_relaxation, 0.0, 2.0)?;
        check_range("detection_quality_floor", self.detection_quality_floor, 0.0, 1.0)?;
        if self.match_distance_threshold <= 0.0 {
            return Err(invalid("match_distance_threshold", "must be positive"));
        }
        if self.max_faces_per_frame == 0 {
            return Err(invalid("max_faces_per_frame", "must be at least 1"));
        }
        if self.continuity_buffer_seconds <= 0.0 {
            return Err(invalid("continuity_buffer_seconds", "must be positive"));
        }
        check_range(
            "continuity_buffer_seconds",
            self.continuity_buffer_seconds,
            0.0,
            MAX_CONTINUITY_BUFFER_SECS,
        )?;
        if self.default_session_minutes <= 0 {
            return Err(invalid("default_session_minutes", "must be positive"));
        }

        let p = &self.preprocessing;
        if !(p.gamma.is_finite() && p.gamma > 0.0) {
            return Err(invalid("preprocessing.gamma", "must be positive"));
        }
        if p.clahe_tiles == 0 {
            return Err(invalid("preprocessing.clahe_tiles", "must be at least 1"));
        }
        if p.clahe_clip_limit < 1.0 {
            return Err(invalid("preprocessing.clahe_clip_limit", "must be >= 1.0"));
        }
        if p.bilateral_diameter == 0 || p.bilateral_diameter % 2 == 0 {
            return Err(invalid("preprocessing.bilateral_diameter", "must be odd"));
        }

        let d = &self.detection;
        if d.min_face_size == 0 || d.min_face_size > d.max_face_size {
            return Err(invalid(
                "detection.min_face_size",
                format!(
                    "must be in 1..={} (max_face_size), got {}",
                    d.max_face_size, d.min_face_size
                ),
            ));
        }
        check_range("detection.nms_score_floor", d.nms_score_floor, 0.0, 1.0)?;
        check_range(
            "detection.nms_overlap_threshold",
            d.nms_overlap_threshold,
            0.0,
            1.0,
        )?;
        Ok(())
    }
}

pub(crate) fn check_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= min && value <= max) {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

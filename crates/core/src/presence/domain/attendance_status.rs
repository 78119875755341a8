use serde::{Deserialize, Serialize};

use crate::shared::config::{check_range, ConfigError};
use crate::shared::constants::{
    DEFAULT_LATE_THRESHOLD, DEFAULT_PARTIAL_THRESHOLD, DEFAULT_PRESENT_THRESHOLD,
};

/// Ordinal attendance status. Variant order is rank order: `Absent < Late < Partial < Present`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Absent,
    Late,
    Partial,
    Present,
}

impl AttendanceStatus {
    pub const ALL: &[AttendanceStatus] = &[
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Partial,
        AttendanceStatus::Present,
    ];

    /// Counts toward the attendance rate (anything but absent).
    pub fn is_attending(&self) -> bool {
        !matches!(self, AttendanceStatus::Absent)
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Absent => write!(f, "absent"),
            AttendanceStatus::Late => write!(f, "late"),
            AttendanceStatus::Partial => write!(f, "partial"),
            AttendanceStatus::Present => write!(f, "present"),
        }
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "partial" => Ok(AttendanceStatus::Partial),
            "present" => Ok(AttendanceStatus::Present),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

/// The canonical percentage → status table.
///
/// Construction validates that all three cut-offs lie in `[0, 100]` and are
/// strictly descending, so a `StatusThresholds` value is always usable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds", into = "RawThresholds")]
pub struct StatusThresholds {
    present: f64,
    partial: f64,
    late: f64,
}

#[derive(Serialize, Deserialize)]
struct RawThresholds {
    present: f64,
    partial: f64,
    late: f64,
}

impl TryFrom<RawThresholds> for StatusThresholds {
    type Error = ConfigError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        StatusThresholds::new(raw.present, raw.partial, raw.late)
    }
}

impl From<StatusThresholds> for RawThresholds {
    fn from(t: StatusThresholds) -> Self {
        RawThresholds {
            present: t.present,
            partial: t.partial,
            late: t.late,
        }
    }
}

impl StatusThresholds {
    pub fn new(present: f64, partial: f64, late: f64) -> Result<Self, ConfigError> {
        check_range("present_threshold", present, 0.0, 100.0)?;
        check_range("partial_threshold", partial, 0.0, 100.0)?;
        check_range("late_threshold", late, 0.0, 100.0)?;
        if !(present > partial && partial > late) {
            return Err(ConfigError::ThresholdOrder {
                present,
                partial,
                late,
            });
        }
        Ok(Self {
            present,
            partial,
            late,
        })
    }

    pub fn present(&self) -> f64 {
        self.present
    }

    pub fn partial(&self) -> f64 {
        self.partial
    }

    pub fn late(&self) -> f64 {
        self.late
    }

    /// Maps a presence percentage to a status. Lower bounds are inclusive.
    pub fn classify(&self, percentage: f64) -> AttendanceStatus {
        if percentage >= self.present {
            AttendanceStatus::Present
        } else if percentage >= self.partial {
            AttendanceStatus::Partial
        } else if percentage >= self.late {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Absent
        }
    }
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            present: DEFAULT_PRESENT_THRESHOLD,
            partial: DEFAULT_PARTIAL_THRESHOLD,
            late: DEFAULT_LATE_THRESHOLD,
        }
    }
}

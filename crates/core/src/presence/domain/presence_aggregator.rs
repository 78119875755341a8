use chrono::{DateTime, Duration, Utc};

use crate::presence::domain::presence_record::{PresenceRecord, RecordError};
use crate::shared::constants::MAX_CONTINUITY_BUFFER_SECS;

/// Converts a sparse detection history into a presence duration and percentage.
///
/// Presence is estimated as the span between the first and last sighting plus
/// a continuity buffer per sighting, capped at the session length. The buffer
/// bridges the gaps left by missed angles and occlusion.
///
/// The buffer grows with `detection_count` before the cap applies, so a
/// student seen very often early in a session is credited quickly; see the
/// open question recorded in DESIGN.md.
#[derive(Clone, Copy, Debug)]
pub struct PresenceAggregator {
    continuity_buffer: Duration,
}

impl PresenceAggregator {
    pub fn new(continuity_buffer: Duration) -> Self {
        Self {
            continuity_buffer: continuity_buffer.max(Duration::zero()),
        }
    }

    /// Non-finite input means no buffer; anything above a day is clamped to a day.
    pub fn from_seconds(seconds: f64) -> Self {
        let seconds = if seconds.is_finite() {
            seconds.clamp(0.0, MAX_CONTINUITY_BUFFER_SECS)
        } else {
            0.0
        };
        Self::new(Duration::milliseconds((seconds * 1000.0).round() as i64))
    }

    pub fn continuity_buffer(&self) -> Duration {
        self.continuity_buffer
    }

    pub fn presence_duration(
        &self,
        first: Option<DateTime<Utc>>,
        last: Option<DateTime<Utc>>,
        detection_count: u32,
        total: Duration,
    ) -> Duration {
        let (Some(first), Some(last)) = (first, last) else {
            return Duration::zero();
        };
        let total = total.max(Duration::zero());
        let span = (last - first).max(Duration::zero());
        let count = i32::try_from(detection_count).unwrap_or(i32::MAX);
        self.continuity_buffer
            .checked_mul(count)
            .and_then(|buffer| span.checked_add(&buffer))
            .map_or(total, |presence| presence.min(total))
    }

    /// Recomputes duration and percentage in place. Fails only on locked records.
    pub fn aggregate(&self, record: &mut PresenceRecord) -> Result<(), RecordError> {
        let total = record.total_session_duration();
        let duration = self.presence_duration(
            record.first_detected_at(),
            record.last_detected_at(),
            record.detection_count(),
            total,
        );
        record.set_presence(duration, presence_percentage(duration, total))
    }
}

/// `presence / total * 100`, clamped into `[0, 100]`. A zero-length session yields 0.
pub fn presence_percentage(presence: Duration, total: Duration) -> f64 {
    let total_ms = total.num_milliseconds();
    if total_ms <= 0 {
        return 0.0;
    }
    let pct = presence.num_milliseconds() as f64 / total_ms as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}

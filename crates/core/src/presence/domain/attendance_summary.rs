use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::presence::domain::attendance_status::AttendanceStatus;
use crate::presence::domain::presence_record::PresenceRecord;
use crate::shared::constants::RECENT_DETECTION_WINDOW_SECS;

/// Live statistics over every record of one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub total_students: usize,
    pub present: usize,
    pub partial: usize,
    pub late: usize,
    pub absent: usize,
    /// `(present + partial + late) / total * 100`.
    pub attendance_rate: f64,
    pub average_presence_percentage: f64,
    pub total_detections: u64,
    /// Students whose latest sighting is within the recent-detection window of `now`.
    pub currently_detected: usize,
}

impl AttendanceSummary {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a PresenceRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let recent = Duration::seconds(RECENT_DETECTION_WINDOW_SECS);
        let mut summary = AttendanceSummary::default();
        let mut percentage_sum = 0.0;

        for record in records {
            summary.total_students += 1;
            match record.status() {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Partial => summary.partial += 1,
                AttendanceStatus::Late => summary.late += 1,
                AttendanceStatus::Absent => summary.absent += 1,
            }
            percentage_sum += record.presence_percentage();
            summary.total_detections += record.detection_count() as u64;
            if record
                .last_detected_at()
                .is_some_and(|last| now - last <= recent)
            {
                summary.currently_detected += 1;
            }
        }

        if summary.total_students > 0 {
            let total = summary.total_students as f64;
            let attending = (summary.present + summary.partial + summary.late) as f64;
            summary.attendance_rate = attending / total * 100.0;
            summary.average_presence_percentage = percentage_sum / total;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::domain::attendance_status::StatusThresholds;
    use crate::presence::domain::detection_event::DetectionEvent;
    use crate::presence::domain::presence_aggregator::PresenceAggregator;
    use crate::presence::domain::presence_record::RecordKey;
    use crate::shared::face_box::FaceBox;
    use crate::shared::ids::{CourseRegistrationId, SessionId, StudentId};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_741_600_800, 0).unwrap()
    }

    fn record_with(student: &str, sightings_min: &[i64]) -> PresenceRecord {
        let mut r = PresenceRecord::new(
            StudentId::new(student),
            RecordKey {
                session_id: SessionId::generate(),
                course_registration_id: CourseRegistrationId::new("PHY110"),
                session_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            },
            Duration::minutes(60),
        );
        for m in sightings_min {
            r.append(DetectionEvent::new(
                StudentId::new(student),
                t0() + Duration::minutes(*m),
                0.7,
                FaceBox::new(0, 0, 60, 60),
                0.5,
            ))
            .unwrap();
        }
        PresenceAggregator::from_seconds(30.0).aggregate(&mut r).unwrap();
        r.classify(&StatusThresholds::default()).unwrap();
        r
    }

    #[test]
    fn test_empty_session() {
        let s = AttendanceSummary::from_records(&[], t0());
        assert_eq!(s.total_students, 0);
        assert_eq!(s.attendance_rate, 0.0);
    }

    #[test]
    fn test_counts_and_rates() {
        let records = [
            record_with("present", &[0, 59]),
            record_with("partial", &[0, 35]),
            record_with("absent", &[]),
            record_with("late", &[40, 58]),
        ];
        let now = t0() + Duration::minutes(59) + Duration::seconds(30);
        let s = AttendanceSummary::from_records(&records, now);
        assert_eq!(s.total_students, 4);
        assert_eq!(s.present, 1);
        assert_eq!(s.partial, 1);
        assert_eq!(s.late, 1);
        assert_eq!(s.absent, 1);
        assert_relative_eq!(s.attendance_rate, 75.0);
        assert_eq!(s.total_detections, 6);
        assert_eq!(s.currently_detected, 2);
    }
}

use crate::shared::config::DetectionConfig;
use crate::shared::face_box::FaceBox;

/// De-duplicates the union of all pass outputs.
///
/// Each box is scored by its area relative to the largest allowed face
/// (`min(area / max_area * 2, 1)`), so bigger boxes win suppression ties.
/// Boxes scoring at or below `score_floor` are dropped, greedy NMS removes
/// any box overlapping a kept one by more than `overlap_threshold`, and the
/// survivors come back largest first, truncated to `max_faces`.
#[derive(Clone, Copy, Debug)]
pub struct DetectionMerger {
    max_face_size: usize,
    score_floor: f64,
    overlap_threshold: f64,
    max_faces: usize,
}

impl DetectionMerger {
    pub fn new(
        max_face_size: usize,
        score_floor: f64,
        overlap_threshold: f64,
        max_faces: usize,
    ) -> Self {
        Self {
            max_face_size,
            score_floor,
            overlap_threshold,
            max_faces,
        }
    }

    pub fn from_config(config: &DetectionConfig, max_faces: usize) -> Self {
        Self::new(
            config.max_face_size,
            config.nms_score_floor,
            config.nms_overlap_threshold,
            max_faces,
        )
    }

    pub fn score(&self, face: &FaceBox) -> f64 {
        let max_area = (self.max_face_size * self.max_face_size).max(1) as f64;
        (face.area() as f64 / max_area * 2.0).min(1.0)
    }

    pub fn merge(&self, raw: &[FaceBox]) -> Vec<FaceBox> {
        let mut scored: Vec<(FaceBox, f64)> = raw
            .iter()
            .map(|b| (*b, self.score(b)))
            .filter(|(_, s)| *s > self.score_floor)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (a.0.y, a.0.x).cmp(&(b.0.y, b.0.x)))
        });

        let mut keep: Vec<FaceBox> = Vec::new();
        let mut suppressed = vec![false; scored.len()];
        for i in 0..scored.len() {
            if suppressed[i] {
                continue;
            }
            keep.push(scored[i].0);
            for j in (i + 1)..scored.len() {
                if !suppressed[j] && scored[i].0.iou(&scored[j].0) > self.overlap_threshold {
                    suppressed[j] = true;
                }
            }
        }

        keep.sort_by(|a, b| b.area().cmp(&a.area()).then_with(|| (a.y, a.x).cmp(&(b.y, b.x))));
        keep.truncate(self.max_faces);
        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fb(x: i32, y: i32, w: i32, h: i32) -> FaceBox {
        FaceBox::new(x, y, w, h)
    }

    fn merger(max_faces: usize) -> DetectionMerger {
        DetectionMerger::new(250, 0.1, 0.2, max_faces)
    }

    #[test]
    fn test_score_is_area_based_and_capped() {
        let m = merger(35);
        assert_relative_eq!(m.score(&fb(0, 0, 125, 125)), 0.5);
        assert_relative_eq!(m.score(&fb(0, 0, 250, 250)), 1.0);
    }

    #[test]
    fn test_duplicate_across_passes_collapses_to_larger() {
        let raw = [fb(100, 100, 80, 80), fb(104, 102, 76, 78), fb(98, 99, 84, 84)];
        let out = merger(35).merge(&raw);
        assert_eq!(out, vec![fb(98, 99, 84, 84)]);
    }

    #[test]
    fn test_distinct_faces_survive() {
        let raw = [fb(0, 0, 90, 90), fb(300, 0, 90, 90), fb(0, 300, 100, 100)];
        let out = merger(35).merge(&raw);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], fb(0, 300, 100, 100));
    }

    #[test]
    fn test_tiny_boxes_fall_below_score_floor() {
        // 50x50 scores 0.08 against a 250 px maximum
        let out = merger(35).merge(&[fb(0, 0, 50, 50), fb(200, 200, 70, 70)]);
        assert_eq!(out, vec![fb(200, 200, 70, 70)]);
    }

    #[test]
    fn test_cap_keeps_largest() {
        let raw: Vec<FaceBox> = (0..10)
            .map(|i| fb(i * 200, 0, 60 + i * 5, 60 + i * 5))
            .collect();
        let out = merger(3).merge(&raw);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].width, 105);
        assert_eq!(out[2].width, 95);
    }

    #[test]
    fn test_empty_input() {
        assert!(merger(35).merge(&[]).is_empty());
    }

    #[test]
    fn test_from_config_uses_detection_settings() {
        let m = DetectionMerger::from_config(&DetectionConfig::default(), 5);
        assert_relative_eq!(m.score(&fb(0, 0, 250, 250)), 1.0);
        assert_eq!(m.max_faces, 5);
    }
}

use serde::{Deserialize, Serialize};

/// Axis-aligned face rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates `[x1, y1, x2, y2]`, rounding to pixels.
    pub fn from_corners(c: [f64; 4]) -> Self {
        let x1 = c[0].round() as i32;
        let y1 = c[1].round() as i32;
        let x2 = c[2].round() as i32;
        let y2 = c[3].round() as i32;
        Self::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    pub fn corners(&self) -> [f64; 4] {
        [
            self.x as f64,
            self.y as f64,
            (self.x + self.width) as f64,
            (self.y + self.height) as f64,
        ]
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn iou(&self, other: &FaceBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.area() as f64 + other.area() as f64 - inter;
        inter / union
    }

    /// Grows the box by `pad` on every side, clipped to a `frame_w` x `frame_h` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn padded_within(&self, pad: i32, frame_w: usize, frame_h: usize) -> Option<FaceBox> {
        let x1 = (self.x - pad).max(0);
        let y1 = (self.y - pad).max(0);
        let x2 = (self.x + self.width + pad).min(frame_w as i32);
        let y2 = (self.y + self.height + pad).min(frame_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(FaceBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Coarse camera-distance estimate derived from face area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    Close,
    Medium,
    Far,
    VeryFar,
}

impl DistanceBand {
    pub fn from_box(face: &FaceBox) -> Self {
        match face.area() {
            a if a > 8000 => DistanceBand::Close,
            a if a > 3000 => DistanceBand::Medium,
            a if a > 1000 => DistanceBand::Far,
            _ => DistanceBand::VeryFar,
        }
    }
}

impl std::fmt::Display for DistanceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceBand::Close => write!(f, "close (1-2m)"),
            DistanceBand::Medium => write!(f, "medium (2-4m)"),
            DistanceBand::Far => write!(f, "far (4-6m)"),
            DistanceBand::VeryFar => write!(f, "very far (6m+)"),
        }
    }
}

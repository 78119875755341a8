use crate::detection::domain::integral_image::IntegralImage;
use crate::detection::domain::window_classifier::WindowClassifier;
use crate::detection::infrastructure::math;
use crate::shared::face_box::FaceBox;
use crate::shared::frame::GrayImage;

/// Relative tolerance for treating two hits as the same face.
const GROUP_EPS: f64 = 0.2;

/// Multi-scale sliding-window scan with neighbour voting.
#[derive(Clone, Copy, Debug)]
pub struct CascadeScanner {
    pub min_face_size: usize,
    pub max_face_size: usize,
}

impl CascadeScanner {
    pub fn new(min_face_size: usize, max_face_size: usize) -> Self {
        Self {
            min_face_size,
            max_face_size,
        }
    }

    /// Scans `img` with windows growing by `scale_step` from `min_face_size`
    /// up to `max_face_size`, then groups overlapping hits and keeps groups
    /// with more than `min_neighbors` members.
    pub fn scan(
        &self,
        classifier: &dyn WindowClassifier,
        img: &GrayImage,
        scale_step: f64,
        min_neighbors: usize,
    ) -> Vec<FaceBox> {
        let hits = self.raw_hits(classifier, img, scale_step);
        group_hits(&hits, min_neighbors)
    }

    fn raw_hits(
        &self,
        classifier: &dyn WindowClassifier,
        img: &GrayImage,
        scale_step: f64,
    ) -> Vec<FaceBox> {
        let (bw, bh) = classifier.base_size();
        if img.is_empty() || bw == 0 || bh == 0 || scale_step <= 1.0 {
            return Vec::new();
        }
        let integral = IntegralImage::new(img);
        let (w, h) = (img.width(), img.height());

        let mut hits = Vec::new();
        let mut scale = (self.min_face_size as f64 / bw.min(bh) as f64).max(1.0);
        loop {
            let win_w = (bw as f64 * scale).round() as usize;
            let win_h = (bh as f64 * scale).round() as usize;
            if win_w > self.max_face_size || win_h > self.max_face_size || win_w > w || win_h > h
            {
                break;
            }
            // Stride grows with the window so large scales stay cheap.
            let step = ((scale * 1.5).round() as usize).max(1);
            for y in (0..=h - win_h).step_by(step) {
                for x in (0..=w - win_w).step_by(step) {
                    if classifier.evaluate(&integral, x, y, scale) {
                        hits.push(FaceBox::new(x as i32, y as i32, win_w as i32, win_h as i32));
                    }
                }
            }
            scale *= scale_step;
        }
        hits
    }
}

/// Clusters similar rectangles and averages each cluster with more than
/// `min_neighbors` members. With `min_neighbors == 0` every hit survives as-is.
pub fn group_hits(hits: &[FaceBox], min_neighbors: usize) -> Vec<FaceBox> {
    if min_neighbors == 0 {
        return hits.to_vec();
    }
    math::cluster_indices(hits.len(), |i, j| similar(&hits[i], &hits[j]))
        .into_iter()
        .filter(|g| g.len() > min_neighbors)
        .map(|g| average(hits, &g))
        .collect()
}

fn similar(a: &FaceBox, b: &FaceBox) -> bool {
    let delta = GROUP_EPS * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && ((a.x + a.width) - (b.x + b.width)).abs() as f64 <= delta
        && ((a.y + a.height) - (b.y + b.height)).abs() as f64 <= delta
}

fn average(hits: &[FaceBox], group: &[usize]) -> FaceBox {
    let n = group.len() as f64;
    let (mut x, mut y, mut w, mut h) = (0.0, 0.0, 0.0, 0.0);
    for &i in group {
        x += hits[i].x as f64;
        y += hits[i].y as f64;
        w += hits[i].width as f64;
        h += hits[i].height as f64;
    }
    FaceBox::new(
        (x / n).round() as i32,
        (y / n).round() as i32,
        (w / n).round() as i32,
        (h / n).round() as i32,
    )
}

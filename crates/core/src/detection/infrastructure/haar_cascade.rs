//! Boosted cascade of rectangle features, the classic Viola-Jones detector.
//!
//! Models are stored as JSON:
//!
//! ```json
//! {
//!   "window_width": 24, "window_height": 24,
//!   "features": [ { "rects": [ { "x": 0, "y": 0, "w": 24, "h": 12, "weight": -1.0 } ] } ],
//!   "stages": [ { "threshold": -1.2,
//!                 "classifiers": [ { "feature": 0, "threshold": 0.004, "left": -0.8, "right": 0.6 } ] } ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::integral_image::IntegralImage;
use crate::detection::domain::window_classifier::WindowClassifier;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cascade: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub rects: Vec<WeightedRect>,
}

/// Decision stump: feature value below `threshold * std_dev` votes `left`, else `right`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeakClassifier {
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub features: Vec<Feature>,
    pub stages: Vec<Stage>,
}

impl HaarCascade {
    pub fn from_json(json: &str) -> Result<Self, CascadeError> {
        let cascade: HaarCascade = serde_json::from_str(json)?;
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let json = std::fs::read_to_string(path).map_err(|e| CascadeError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let cascade = Self::from_json(&json)?;
        log::info!(
            "Loaded cascade {} ({}x{}, {} stages, {} features)",
            path.display(),
            cascade.window_width,
            cascade.window_height,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    /// Every rectangle must fit the window and every stump must name a real feature.
    fn validate(&self) -> Result<(), CascadeError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(CascadeError::Invalid("zero-sized window".into()));
        }
        if self.stages.is_empty() {
            return Err(CascadeError::Invalid("no stages".into()));
        }
        for (i, f) in self.features.iter().enumerate() {
            if f.rects.is_empty() {
                return Err(CascadeError::Invalid(format!("feature {i} has no rectangles")));
            }
            for r in &f.rects {
                if r.w == 0 || r.h == 0 || r.x + r.w > self.window_width || r.y + r.h > self.window_height
                {
                    return Err(CascadeError::Invalid(format!(
                        "feature {i} rectangle {r:?} outside {}x{} window",
                        self.window_width, self.window_height
                    )));
                }
            }
        }
        for (s, stage) in self.stages.iter().enumerate() {
            for c in &stage.classifiers {
                if c.feature >= self.features.len() {
                    return Err(CascadeError::Invalid(format!(
                        "stage {s} references missing feature {}",
                        c.feature
                    )));
                }
            }
        }
        Ok(())
    }

    fn feature_value(
        &self,
        feature: &Feature,
        integral: &IntegralImage,
        x: usize,
        y: usize,
        scale: f64,
    ) -> f64 {
        feature
            .rects
            .iter()
            .map(|r| {
                let rx = x + scaled(r.x, scale);
                let ry = y + scaled(r.y, scale);
                let rw = scaled(r.w, scale).max(1);
                let rh = scaled(r.h, scale).max(1);
                let rw = rw.min(integral.width() - rx);
                let rh = rh.min(integral.height() - ry);
                r.weight * integral.rect_sum(rx, ry, rw, rh) as f64
            })
            .sum()
    }
}

impl WindowClassifier for HaarCascade {
    fn base_size(&self) -> (usize, usize) {
        (self.window_width as usize, self.window_height as usize)
    }

    fn evaluate(&self, integral: &IntegralImage, x: usize, y: usize, scale: f64) -> bool {
        let w = scaled(self.window_width, scale);
        let h = scaled(self.window_height, scale);
        let area = (w * h) as f64;
        let std = integral.rect_std_dev(x, y, w, h);
        let norm = if std > 1.0 { std } else { 1.0 };

        for stage in &self.stages {
            let mut score = 0.0;
            for c in &stage.classifiers {
                let value = self.feature_value(&self.features[c.feature], integral, x, y, scale) / area;
                score += if value < c.threshold * norm {
                    c.left
                } else {
                    c.right
                };
            }
            if score < stage.threshold {
                return false;
            }
        }
        true
    }
}

fn scaled(v: u32, scale: f64) -> usize {
    (v as f64 * scale).round() as usize
}

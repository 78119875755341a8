use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// A captured camera frame: contiguous pixel bytes in row-major order.
///
/// Format conversion happens at the decode boundary; everything past the
/// preprocessor works on [`GrayImage`].
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Wraps a raw pixel buffer. Zero-area frames and buffers whose length
    /// disagrees with the dimensions are rejected.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidFrame(format!(
                "zero-area frame ({width}x{height})"
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(FrameError::InvalidFrame(format!(
                "unsupported channel count {channels}"
            )));
        }
        let expected = (width as usize) * (height as usize) * (channels as usize);
        if data.len() != expected {
            return Err(FrameError::InvalidFrame(format!(
                "buffer holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            captured_at,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// BT.601 luma conversion. Single-channel frames are copied as-is.
    pub fn to_gray(&self) -> GrayImage {
        let w = self.width as usize;
        let h = self.height as usize;
        let c = self.channels as usize;
        if c == 1 {
            return GrayImage::new(self.data.clone(), w, h);
        }
        let data = self
            .data
            .chunks_exact(c)
            .map(|px| {
                let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                luma.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage::new(data, w, h)
    }
}

/// Single-channel 8-bit image used by preprocessing, detection and matching.
#[derive(Clone, Debug, PartialEq)]
pub struct GrayImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl GrayImage {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            width * height,
            "data length must equal width * height"
        );
        Self {
            data,
            width,
            height,
        }
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self::new(vec![value; width * height], width, height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Pixel lookup with edge replication for out-of-range coordinates.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> u8 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Copies a rectangle out of the image. The rectangle must lie inside.
    pub fn crop(&self, x: usize, y: usize, w: usize, h: usize) -> GrayImage {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let mut data = Vec::with_capacity(w * h);
        for row in y..y + h {
            let start = row * self.width + x;
            data.extend_from_slice(&self.data[start..start + w]);
        }
        GrayImage::new(data, w, h)
    }

    /// Bilinear resize to `new_w` x `new_h`.
    pub fn resize(&self, new_w: usize, new_h: usize) -> GrayImage {
        if self.is_empty() || new_w == 0 || new_h == 0 {
            return GrayImage::filled(new_w, new_h, 0);
        }
        let sx = self.width as f32 / new_w as f32;
        let sy = self.height as f32 / new_h as f32;
        let mut data = Vec::with_capacity(new_w * new_h);
        for y in 0..new_h {
            let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
            let y0 = (fy as usize).min(self.height - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let wy = fy - y0 as f32;
            for x in 0..new_w {
                let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
                let x0 = (fx as usize).min(self.width - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let wx = fx - x0 as f32;
                let top = self.get(x0, y0) as f32 * (1.0 - wx) + self.get(x1, y0) as f32 * wx;
                let bottom = self.get(x0, y1) as f32 * (1.0 - wx) + self.get(x1, y1) as f32 * wx;
                let v = top * (1.0 - wy) + bottom * wy;
                data.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
        GrayImage::new(data, new_w, new_h)
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .data
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / self.data.len() as f64;
        var.sqrt()
    }
}

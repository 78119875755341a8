use crate::shared::frame::GrayImage;

/// Summed-area tables of pixel values and squared pixel values.
///
/// Both tables are `(width + 1) x (height + 1)` with a zero first row and
/// column, so any rectangle sum costs four lookups.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width(), img.height());
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = img.get(x, y) as u64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }
        Self {
            width: w,
            height: h,
            sum,
            sq_sum,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum of pixels in the `w` x `h` rectangle at `(x, y)`. The rectangle must lie inside.
    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::lookup(&self.sum, self.width + 1, x, y, w, h)
    }

    #[inline]
    pub fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::lookup(&self.sq_sum, self.width + 1, x, y, w, h)
    }

    /// Standard deviation of the pixels in a rectangle.
    pub fn rect_std_dev(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let area = (w * h) as f64;
        if area == 0.0 {
            return 0.0;
        }
        let mean = self.rect_sum(x, y, w, h) as f64 / area;
        let var = self.rect_sq_sum(x, y, w, h) as f64 / area - mean * mean;
        var.max(0.0).sqrt()
    }

    #[inline]
    fn lookup(table: &[u64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let a = table[y * stride + x];
        let b = table[y * stride + x + w];
        let c = table[(y + h) * stride + x];
        let d = table[(y + h) * stride + x + w];
        d + a - b - c
    }
}

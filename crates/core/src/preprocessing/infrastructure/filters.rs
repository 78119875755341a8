//! Grayscale image filters used by frame preprocessing and face normalization.
//!
//! Every filter takes a borrowed [`GrayImage`] and returns a new one; edges are
//! handled by replicating the border pixel.

use crate::shared::frame::GrayImage;

/// Gamma correction through a 256-entry LUT: `out = 255 * (v / 255)^(1 / gamma)`.
///
/// `gamma > 1` brightens shadows, which is what under-lit lecture rooms need.
pub fn gamma_correct(img: &GrayImage, gamma: f64) -> GrayImage {
    let inv = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = ((i as f64 / 255.0).powf(inv) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    apply_lut(img, &lut)
}

/// Global histogram equalization.
pub fn equalize_hist(img: &GrayImage) -> GrayImage {
    if img.is_empty() {
        return img.clone();
    }
    let mut hist = [0u32; 256];
    for &v in img.data() {
        hist[v as usize] += 1;
    }
    let total = img.data().len() as u32;
    let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return img.clone();
    }
    let scale = 255.0 / (total - cdf_min) as f64;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf.saturating_sub(cdf_min) as f64 * scale)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    apply_lut(img, &lut)
}

/// Contrast-limited adaptive histogram equalization over a `tiles` x `tiles` grid.
///
/// Each tile's histogram is clipped at `clip_limit * tile_area / 256`, the
/// excess redistributed evenly, and per-pixel output bilinearly interpolated
/// between the four nearest tile mappings.
pub fn clahe(img: &GrayImage, clip_limit: f64, tiles: usize) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    if img.is_empty() {
        return img.clone();
    }
    let tiles_x = tiles.clamp(1, w);
    let tiles_y = tiles.clamp(1, h);

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        let y0 = ty * h / tiles_y;
        let y1 = (ty + 1) * h / tiles_y;
        for tx in 0..tiles_x {
            let x0 = tx * w / tiles_x;
            let x1 = (tx + 1) * w / tiles_x;
            luts[ty * tiles_x + tx] = tile_lut(img, x0, y0, x1, y1, clip_limit);
        }
    }

    let tile_w = w as f64 / tiles_x as f64;
    let tile_h = h as f64 / tiles_y as f64;
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let gy = (y as f64 + 0.5) / tile_h - 0.5;
        let (ty0, ty1, wy) = neighbours(gy, tiles_y);
        for x in 0..w {
            let gx = (x as f64 + 0.5) / tile_w - 0.5;
            let (tx0, tx1, wx) = neighbours(gx, tiles_x);
            let v = img.get(x, y) as usize;
            let top = luts[ty0 * tiles_x + tx0][v] as f64 * (1.0 - wx)
                + luts[ty0 * tiles_x + tx1][v] as f64 * wx;
            let bottom = luts[ty1 * tiles_x + tx0][v] as f64 * (1.0 - wx)
                + luts[ty1 * tiles_x + tx1][v] as f64 * wx;
            out.push((top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8);
        }
    }
    GrayImage::new(out, w, h)
}

fn tile_lut(
    img: &GrayImage,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    clip_limit: f64,
) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[img.get(x, y) as usize] += 1;
        }
    }
    let area = ((x1 - x0) * (y1 - y0)).max(1);

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f64 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let bonus = excess / 256;
        let residual = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += bonus;
            if i < residual {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area as f64;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Two neighbouring tile indices around grid coordinate `g` and the weight of the second.
fn neighbours(g: f64, count: usize) -> (usize, usize, f64) {
    let last = count as isize - 1;
    let lo = g.floor() as isize;
    let weight = g - lo as f64;
    let a = lo.clamp(0, last) as usize;
    let b = (lo + 1).clamp(0, last) as usize;
    (a, b, if a == b { 0.0 } else { weight })
}

/// Edge-preserving bilateral filter over a circular `diameter` neighbourhood.
pub fn bilateral(img: &GrayImage, diameter: usize, sigma_color: f64, sigma_space: f64) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    if img.is_empty() || diameter <= 1 {
        return img.clone();
    }
    let radius = (diameter / 2) as isize;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_lut: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f64 * color_coeff).exp() as f32)
        .collect();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut kernel: Vec<(isize, isize, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f64;
            if r2.sqrt() > radius as f64 {
                continue;
            }
            kernel.push((dx, dy, (r2 * space_coeff).exp() as f32));
        }
    }

    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let center = img.get(x, y);
            let mut sum = 0.0f32;
            let mut norm = 0.0f32;
            for &(dx, dy, ws) in &kernel {
                let v = img.get_clamped(x as isize + dx, y as isize + dy);
                let weight = ws * color_lut[center.abs_diff(v) as usize];
                sum += v as f32 * weight;
                norm += weight;
            }
            out.push((sum / norm).round().clamp(0.0, 255.0) as u8);
        }
    }
    GrayImage::new(out, w, h)
}

/// 3x3 sharpening with kernel `[-1 -1 -1; -1 9 -1; -1 -1 -1]`.
pub fn sharpen(img: &GrayImage) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0i32;
            for dy in -1..=1isize {
                for dx in -1..=1isize {
                    let v = img.get_clamped(x as isize + dx, y as isize + dy) as i32;
                    acc += if dx == 0 && dy == 0 { 9 * v } else { -v };
                }
            }
            out.push(acc.clamp(0, 255) as u8);
        }
    }
    GrayImage::new(out, w, h)
}

/// Linear stretch so the darkest pixel maps to 0 and the brightest to 255.
pub fn normalize_min_max(img: &GrayImage) -> GrayImage {
    let Some((&min, &max)) = img
        .data()
        .iter()
        .min()
        .zip(img.data().iter().max())
    else {
        return img.clone();
    };
    if min == max {
        return img.clone();
    }
    let range = (max - min) as f64;
    let data = img
        .data()
        .iter()
        .map(|&v| ((v - min) as f64 * 255.0 / range).round() as u8)
        .collect();
    GrayImage::new(data, img.width(), img.height())
}

/// `alpha * a + (1 - alpha) * b`, per pixel. Both images must share dimensions.
pub fn blend(a: &GrayImage, b: &GrayImage, alpha: f64) -> GrayImage {
    debug_assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    let data = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(&pa, &pb)| {
            (pa as f64 * alpha + pb as f64 * (1.0 - alpha))
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect();
    GrayImage::new(data, a.width(), a.height())
}

/// Saturating linear transform `alpha * v + beta`.
pub fn scale_contrast(img: &GrayImage, alpha: f64, beta: f64) -> GrayImage {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (alpha * i as f64 + beta).round().clamp(0.0, 255.0) as u8;
    }
    apply_lut(img, &lut)
}

fn apply_lut(img: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let data = img.data().iter().map(|&v| lut[v as usize]).collect();
    GrayImage::new(data, img.width(), img.height())
}

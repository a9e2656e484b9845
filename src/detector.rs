use std::cmp::Ordering;

use crate::image::Image;
use crate::mask::MaskFilter;
use crate::my_types::*;

/// Sobel 3x3 kernel, the vertical one is its transpose
const SOBEL: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];

/// Finds well textured points to track
pub trait FeatureDetector {
    /// Appends at most `max_count` points of `image` to `out`, strongest
    /// first. With a `mask` only pixels it admits are considered. Returns
    /// false when nothing was found.
    fn detect(
        &mut self,
        image: &Image,
        mask: Option<MaskFilter<'_>>,
        max_count: usize,
        out: &mut Vec<Vector2f>,
    ) -> bool;
}

#[derive(Clone, Debug)]
pub struct DetectorParams {
    /// fraction of the strongest response a corner must exceed
    pub quality: f32,
    /// minimum distance in pixels between two accepted corners
    pub min_distance: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            quality: 0.01,
            min_distance: 3.,
        }
    }
}

/// Shi-Tomasi corner detector: the smaller eigenvalue of the gradient
/// structure tensor summed over a 3x3 block
/// ref https://docs.opencv.org/4.x/d4/d8c/tutorial_py_shi_tomasi.html
pub struct Detector {
    params: DetectorParams,
    gx: Vec<f32>,
    gy: Vec<f32>,
    response: Vec<f32>,
    /// (response, pixel index)
    candidates: Vec<(f32, usize)>,
    /// pixels too close to an accepted corner
    mask: Vec<bool>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DetectorParams::default())
    }
}

impl Detector {
    pub fn new(params: DetectorParams) -> Self {
        Detector {
            params,
            gx: vec![],
            gy: vec![],
            response: vec![],
            candidates: vec![],
            mask: vec![],
        }
    }

    fn compute_gradients(&mut self, image: &Image) {
        let (w, h) = (image.width as i32, image.height as i32);
        self.gx.clear();
        self.gy.clear();
        for y in 0..h {
            for x in 0..w {
                let mut dx = 0;
                let mut dy = 0;
                for (j, row) in SOBEL.iter().enumerate() {
                    for (i, &k) in row.iter().enumerate() {
                        let vx = image.value_clamped(x + i as i32 - 1, y + j as i32 - 1) as i32;
                        let vy = image.value_clamped(x + j as i32 - 1, y + i as i32 - 1) as i32;
                        dx += k * vx;
                        dy += k * vy;
                    }
                }
                self.gx.push(dx as f32);
                self.gy.push(dy as f32);
            }
        }
    }

    /// Minimum eigenvalue per pixel, zero on the one pixel border
    fn compute_response(&mut self, w: usize, h: usize) -> f32 {
        self.response.clear();
        self.response.resize(w * h, 0.);
        let mut max_response = 0f32;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let (mut xx, mut xy, mut yy) = (0f32, 0f32, 0f32);
                for v in y - 1..=y + 1 {
                    for u in x - 1..=x + 1 {
                        let (dx, dy) = (self.gx[v * w + u], self.gy[v * w + u]);
                        xx += dx * dx;
                        xy += dx * dy;
                        yy += dy * dy;
                    }
                }
                let half_trace = 0.5 * (xx + yy);
                let d = 0.5 * (xx - yy);
                let min_eig = half_trace - (d * d + xy * xy).sqrt();
                self.response[y * w + x] = min_eig;
                max_response = max_response.max(min_eig);
            }
        }
        max_response
    }

    fn is_local_max(&self, x: usize, y: usize, w: usize) -> bool {
        let r = self.response[y * w + x];
        for v in y - 1..=y + 1 {
            for u in x - 1..=x + 1 {
                if self.response[v * w + u] > r {
                    return false;
                }
            }
        }
        true
    }

    /// Peak of the parabola through the response at `i - 1`, `i`, `i + 1`
    fn refine(&self, index: usize, stride: usize) -> f32 {
        let r0 = self.response[index - stride];
        let r1 = self.response[index];
        let r2 = self.response[index + stride];
        let denominator = r0 - 2. * r1 + r2;
        if denominator >= 0. {
            return 0.;
        }
        (0.5 * (r0 - r2) / denominator).clamp(-0.5, 0.5)
    }

    fn occupy(&mut self, x: usize, y: usize, w: usize, h: usize) {
        let d = self.params.min_distance;
        let r = d.ceil() as i32;
        for v in -r..=r {
            for u in -r..=r {
                if ((u * u + v * v) as f32) >= d * d {
                    continue;
                }
                let (px, py) = (x as i32 + u, y as i32 + v);
                if px >= 0 && py >= 0 && (px as usize) < w && (py as usize) < h {
                    self.mask[py as usize * w + px as usize] = true;
                }
            }
        }
    }
}

impl FeatureDetector for Detector {
    fn detect(
        &mut self,
        image: &Image,
        mask: Option<MaskFilter<'_>>,
        max_count: usize,
        out: &mut Vec<Vector2f>,
    ) -> bool {
        let (w, h) = (image.width, image.height);
        if w < 5 || h < 5 || max_count == 0 {
            return false;
        }

        self.compute_gradients(image);
        let max_response = self.compute_response(w, h);
        if max_response <= 0. {
            return false;
        }
        let threshold = self.params.quality * max_response;

        // corners need both neighbours of the response for refinement
        self.candidates.clear();
        for y in 2..h - 2 {
            for x in 2..w - 2 {
                let r = self.response[y * w + x];
                if r <= threshold || !self.is_local_max(x, y, w) {
                    continue;
                }
                if let Some(filter) = &mask {
                    if !filter.admits(x, y) {
                        continue;
                    }
                }
                self.candidates.push((r, y * w + x));
            }
        }
        // strongest first, scan order among equals
        self.candidates
            .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)));

        self.mask.clear();
        self.mask.resize(w * h, false);
        let mut found = 0;
        for i in 0..self.candidates.len() {
            if found >= max_count {
                break;
            }
            let index = self.candidates[i].1;
            if self.mask[index] {
                continue;
            }
            let (x, y) = (index % w, index / w);
            self.occupy(x, y, w, h);
            let p = Vector2f::new(
                x as f32 + self.refine(index, 1),
                y as f32 + self.refine(index, w),
            );
            out.push(p);
            found += 1;
        }
        found > 0
    }
}

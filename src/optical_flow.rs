use nalgebra as na;

use crate::frame::PyramidFrame;
use crate::image::*;
use crate::my_types::*;

type Range = [[i16; 2]; 2];

/// Sparse optical flow between two pyramid frames.
///
/// For every input point the tracker reports the tracked position, a status
/// flag and an error magnitude. `points1`, `status` and `errors` are resized to
/// the length of `points0` and stay index aligned with it. A point whose status
/// is false has an unspecified position.
pub trait PointTracker {
    /// Number of downscaled levels the frames handed to [`PointTracker::track`] must carry
    fn levels(&self) -> usize;

    fn track(
        &mut self,
        frame0: &PyramidFrame,
        frame1: &PyramidFrame,
        points0: &[Vector2f],
        points1: &mut Vec<Vector2f>,
        status: &mut Vec<bool>,
        errors: &mut Vec<f32>,
    );
}

#[derive(Clone, Debug)]
pub struct FlowParams {
    pub levels: usize,
    pub iterations: usize,
    /// full window edge length, odd
    pub window_size: usize,
    pub epsilon: f64,
    pub min_eigenvalue: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            levels: 3,
            iterations: 40,
            window_size: 11,
            epsilon: 0.03,
            min_eigenvalue: 1e-4,
        }
    }
}

/// Pyramidal Lucas-Kanade
pub struct OpticalFlow {
    lk_iters: usize,
    lk_levels: usize,
    lk_win_size: usize,
    lk_term: f64,
    lk_min_eig: f64,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl OpticalFlow {
    pub fn new(params: FlowParams) -> OpticalFlow {
        let lk_win_size = params.window_size.max(3) | 1;
        OpticalFlow {
            lk_iters: params.iterations.max(1),
            lk_levels: params.levels,
            lk_win_size,
            lk_term: params.epsilon,
            lk_min_eig: params.min_eigenvalue,
            ix: na::DMatrix::zeros(lk_win_size, lk_win_size),
            iy: na::DMatrix::zeros(lk_win_size, lk_win_size),
            it: na::DMatrix::zeros(lk_win_size, lk_win_size),
            grid: na::DMatrix::zeros(lk_win_size, lk_win_size),
        }
    }

    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    fn process_feature(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
        point1_in: Option<Vector2d>,
    ) -> Option<(Vector2d, f64)> {
        let levels = self
            .lk_levels
            .min(pyramid_frame0.level_count() - 1)
            .min(pyramid_frame1.level_count() - 1);

        // initial guess
        let mut g_init = point1_in
            .map(|p| p - point0)
            .unwrap_or(Vector2d::zeros())
            / u32::pow(2, levels as u32) as f64;
        let mut d = Vector2d::zeros();
        for level in (0..levels + 1).rev() {
            let refined = self.process_level(pyramid_frame0, pyramid_frame1, point0, g_init, level);
            d = match refined {
                Some((nu, converged)) if level > 0 || converged => nu,
                // coarse levels only seed the next level, a failure there is not fatal
                _ if level > 0 => Vector2d::zeros(),
                _ => return None,
            };
            if level > 0 {
                g_init = 2. * (g_init + d)
            }
        }

        let error = self.it.iter().map(|v| v.abs()).sum::<f64>() / self.it.len().max(1) as f64;
        Some((point0 + g_init + d, error))
    }

    /// Iterative refinement on one pyramid level. Returns the residual
    /// displacement and whether the iteration converged.
    fn process_level(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
        g_init: Vector2d,
        level: usize,
    ) -> Option<(Vector2d, bool)> {
        let lk_term2 = self.lk_term.powi(2);
        let r = (self.lk_win_size - 1) / 2;
        let level0 = pyramid_frame0.get_image_at_level(level);
        let level1 = pyramid_frame1.get_image_at_level(level);
        let u = point0 / u32::pow(2, level as u32) as f64;
        let range = integration_range(level0, u, r, 1)?;
        // compute the derivative
        scharr(
            level0,
            u,
            range,
            &mut self.ix,
            &mut self.iy,
            &mut self.grid,
        );
        let gradient = spatial_gradient(&self.ix, &self.iy);
        if min_eigenvalue(&gradient) < self.lk_min_eig {
            return None;
        }
        let mut nu = Vector2d::zeros();
        for _ in 0..self.lk_iters {
            image_difference(range, r, &self.grid, &mut self.it, level1, u + g_init + nu)?;
            let eta = flow_vector(&gradient, &self.ix, &self.iy, &self.it)?;
            nu += eta;
            if eta.norm_squared() < lk_term2 {
                return Some((nu, true));
            }
        }
        Some((nu, false))
    }
}

impl PointTracker for OpticalFlow {
    fn levels(&self) -> usize {
        self.lk_levels
    }

    fn track(
        &mut self,
        frame0: &PyramidFrame,
        frame1: &PyramidFrame,
        points0: &[Vector2f],
        points1: &mut Vec<Vector2f>,
        status: &mut Vec<bool>,
        errors: &mut Vec<f32>,
    ) {
        points1.clear();
        status.clear();
        errors.clear();

        for point0 in points0 {
            let point0d = point0.cast::<f64>();
            match self.process_feature(frame0, frame1, point0d, None) {
                Some((point1, error)) => {
                    points1.push(point1.cast::<f32>());
                    status.push(true);
                    errors.push(error as f32);
                }
                None => {
                    points1.push(*point0);
                    status.push(false);
                    errors.push(f32::MAX);
                }
            }
        }
    }
}

fn min_eigenvalue(m: &Matrix2d) -> f64 {
    let half_trace = 0.5 * (m[(0, 0)] + m[(1, 1)]);
    let half_diff = 0.5 * (m[(0, 0)] - m[(1, 1)]);
    half_trace - (half_diff * half_diff + m[(0, 1)] * m[(1, 0)]).sqrt()
}

fn flow_vector(gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Option<Vector2d> {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    gradient.try_inverse().map(|inv_g| inv_g * b)
}

fn image_difference(
    prev_range: Range,
    r: usize,
    i0: &Matrixd,
    it: &mut Matrixd,
    level: &Image,
    center: Vector2d,
) -> Option<()> {
    let range = integration_range(level, center, r, 0)?;
    if range != prev_range {
        return None;
    }
    fill_grid(level, range, center, it);
    let shape = (it.nrows(), it.ncols());
    *it *= -1.;
    *it += i0.view((1, 1), shape);
    Some(())
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    debug_assert_eq!(ix.nrows(), iy.nrows());
    debug_assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    range: Range,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    grid: &mut Matrixd,
) {
    let grange = [
        [range[0][0] - 1, range[0][1] + 1],
        [range[1][0] - 1, range[1][1] + 1],
    ];
    fill_grid(level, grange, center, grid);

    *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
    *grid = na::DMatrix::zeros(
        (range[1][1] - range[1][0] + 1) as usize,
        (range[0][1] - range[0][0] + 1) as usize,
    );

    for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
        for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Returns closed range of integer steps that can be taken without going outside
/// the image borders. Returns None if the center point is outside the level
/// boundaries.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i16) -> Option<Range> {
    let r = r as i16;
    let mut range = [[0, 0], [0, 0]];
    for i in 0..2 {
        let s = if i == 0 { level.width } else { level.height };
        if s == 0 || !(center[i] >= 0.) || center[i] > (s - 1) as f64 {
            return None;
        }
        let n = center[i] as i16;
        let fract = if center[i].fract() > 0. { 1 } else { 0 };
        range[i] = [
            i16::max(-r, -n + padding),
            i16::min(r, s as i16 - n - padding - 1 - fract),
        ];
        if range[i][0] > range[i][1] {
            return None;
        }
    }
    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::Pyramid;

    fn make_pyramid_frame(image: Image, lk_levels: usize) -> PyramidFrame {
        let mut pyramid = Pyramid::empty();
        Pyramid::compute(&mut pyramid, &image, lk_levels).unwrap();
        PyramidFrame { image, pyramid }
    }

    fn blob_image(size: usize, cx: f64, cy: f64) -> Image {
        let mut image = Image::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let d2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
                let v = 40. + 180. * (-d2 / (2. * 6f64.powi(2))).exp();
                image.set_value(x, y, v.round() as u8);
            }
        }
        image
    }

    #[test]
    fn test_flow() {
        let (dx, dy) = (3., -2.);
        let image0 = blob_image(128, 60., 60.);
        let image1 = blob_image(128, 60. + dx, 60. + dy);

        let lk_levels = 3;
        let pyramid_frame0 = make_pyramid_frame(image0, lk_levels);
        let pyramid_frame1 = make_pyramid_frame(image1, lk_levels);

        let mut flow = OpticalFlow::new(FlowParams::default());
        let points0 = vec![Vector2f::new(60., 60.), Vector2f::new(-1., -1.)];
        let mut points1 = vec![];
        let mut status = vec![];
        let mut errors = vec![];
        flow.track(&pyramid_frame0, &pyramid_frame1, &points0, &mut points1, &mut status, &mut errors);

        assert_eq!(points1.len(), 2);
        assert!(status[0]);
        let err = (points1[0] - points0[0]) - Vector2f::new(dx as f32, dy as f32);
        assert!(err.norm() < 0.5, "optical flow err {}", err.norm());
        // sentinel points never track
        assert!(!status[1]);
    }

    #[test]
    fn test_flat_region_is_rejected() {
        let image = Image {
            data: vec![77; 64 * 64],
            width: 64,
            height: 64,
        };
        let frame0 = make_pyramid_frame(image.clone(), 2);
        let frame1 = make_pyramid_frame(image, 2);
        let mut flow = OpticalFlow::new(FlowParams::default());
        let mut points1 = vec![];
        let mut status = vec![];
        let mut errors = vec![];
        flow.track(&frame0, &frame1, &[Vector2f::new(32., 32.)], &mut points1, &mut status, &mut errors);
        assert_eq!(status, vec![false]);
    }

    #[test]
    fn test_scharr() {
        let mut image = Image {
            data: vec![
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            ],
            width: 5,
            height: 5,
        };

        let mut out_x = Matrixd::zeros(0, 0);
        let mut out_y = Matrixd::zeros(0, 0);
        let mut grid = Matrixd::zeros(0, 0);

        let center = Vector2d::new(2.0, 2.0);
        let range = integration_range(&image, center, 1, 1).unwrap();
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::zeros(3, 3));
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));

        image.data = vec![
            0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::repeat(3, 3, 1.));
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));

        image.data = vec![
            0, 1, 2, 3, 4, 1, 2, 3, 4, 5, 2, 3, 4, 5, 6, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::repeat(3, 3, 1.));
        assert_eq!(out_y, na::DMatrix::repeat(3, 3, 1.));

        image.data = vec![
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        let answer_x = na::dmatrix!(
            2.5, 0., -2.5;
            2.5, 0., -2.5;
            2.5, 0., -2.5
        );
        assert_eq!(out_x, answer_x);
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));
    }

    #[test]
    fn test_integration_range() {
        // Width and height are pixels. Coordinate (0, 0) means center of top-left
        // pixel. Thus (9, 9) is the center of the bottom-right pixel for 10x10
        // image.
        let image = Image {
            data: vec![],
            width: 10,
            height: 10,
        };
        assert_eq!(integration_range(&image, Vector2d::new(4.5, 4.5), 3, 0).unwrap(), [[-3, 3], [-3, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(1.5, 2.5), 3, 0).unwrap(), [[-1, 3], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(1.0, 2.0), 3, 0).unwrap(), [[-1, 3], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(0.9, 1.9), 3, 0).unwrap(), [[0, 3], [-1, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(0.9, 1.9), 3, 1).unwrap(), [[1, 3], [0, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(8.5, 2.0), 3, 0).unwrap(), [[-3, 0], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(9.5, 2.0), 3, 0), None);
        assert_eq!(integration_range(&image, Vector2d::new(-1.0, -1.0), 3, 0), None);
    }
}

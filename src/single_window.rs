use log::debug;

use crate::estimator::{CorrespondenceSource, Strategy, TrackContext};
use crate::feature::Correspondence;
use crate::mask::Selection;
use crate::my_types::*;

/// One feature set tracked from frame to frame, detected again only when it
/// is lost
#[derive(Debug, Default)]
pub struct SingleWindow {
    previous: Vec<Vector2f>,
    current: Vec<Vector2f>,
    need_features: bool,
    has_pairs: bool,
}

impl SingleWindow {
    pub fn new() -> Self {
        Self {
            need_features: true,
            ..Default::default()
        }
    }

    fn start_over(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.need_features = true;
        self.has_pairs = false;
    }
}

impl CorrespondenceSource for SingleWindow {
    fn history_len(&self) -> usize {
        1
    }

    fn correspondences(&self, offset: usize, out: &mut Vec<Correspondence>) {
        if offset != 0 || !self.has_pairs {
            return;
        }
        out.extend(
            self.previous
                .iter()
                .zip(self.current.iter())
                .map(|(a, b)| Correspondence::new(*a, *b)),
        );
    }
}

impl Strategy for SingleWindow {
    fn init(&mut self, _width: usize, _height: usize) {
        self.start_over();
    }

    fn reset(&mut self) {
        self.start_over();
    }

    fn invalidate(&mut self) {
        self.need_features = true;
        self.has_pairs = false;
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> bool {
        if self.need_features {
            self.has_pairs = false;
            let max_count = ctx.feature_count;
            if ctx.find_features(Selection::Box, max_count, &mut self.current) {
                debug!("found {} features", self.current.len());
                self.need_features = false;
                return true;
            }
            debug!("no features found");
            return false;
        }

        std::mem::swap(&mut self.previous, &mut self.current);
        let tracked = ctx.track_features(&self.previous, &mut self.current);
        self.has_pairs = true;
        debug!("tracked {tracked} of {} features", self.previous.len());
        if tracked == 0 {
            self.need_features = true;
        }
        tracked > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::fakes::*;
    use crate::estimator::MotionEstimator;
    use crate::image::Image;
    use crate::rigid_box::RigidBox;
    use crate::synthetic::{SceneParams, SyntheticVideo};

    fn estimator(dx: f32, dy: f32) -> MotionEstimator<SingleWindow> {
        MotionEstimator::with_primitives(SingleWindow::new(), grid_detector(), shift_flow(dx, dy))
    }

    #[test]
    fn test_first_frame_only_detects() {
        let mut estimator = estimator(2., 1.);
        let frame = Image::new(120, 100);
        assert!(estimator.init(&frame));
        let mut bb = RigidBox::new(50., 50., 20., 10., 0.);
        assert!(!estimator.advance(&frame, &mut bb));
        assert_eq!(bb.center(), Vector2f::new(50., 50.));

        assert!(estimator.advance(&frame, &mut bb));
        assert!((bb.center() - Vector2f::new(52., 51.)).norm() < 1e-4, "{bb}");
        assert!(estimator.advance(&frame, &mut bb));
        assert!((bb.center() - Vector2f::new(54., 52.)).norm() < 1e-4, "{bb}");
    }

    #[test]
    fn test_seeded_by_box() {
        let mut estimator = estimator(-1.5, 0.5);
        let frame = Image::new(120, 100);
        let mut bb = RigidBox::new(50., 50., 20., 10., 0.);
        assert!(estimator.init_with_box(&frame, &bb));
        assert!(estimator.advance(&frame, &mut bb));
        assert!((bb.center() - Vector2f::new(48.5, 50.5)).norm() < 1e-4, "{bb}");
    }

    #[test]
    fn test_features_stay_index_aligned() {
        let mut window = SingleWindow::new();
        window.previous = vec![Vector2f::new(1., 1.), Vector2f::new(2., 2.)];
        window.current = vec![Vector2f::new(-1., -1.), Vector2f::new(3., 2.)];
        window.has_pairs = true;
        let mut out = vec![];
        window.correspondences(0, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Correspondence::new(Vector2f::new(2., 2.), Vector2f::new(3., 2.)));

        window.invalidate();
        out.clear();
        window.correspondences(0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_lost_features_are_found_again() {
        // everything leaves the frame after one step
        let mut estimator = estimator(500., 0.);
        let frame = Image::new(120, 100);
        let mut bb = RigidBox::new(50., 50., 20., 10., 0.);
        estimator.init_with_box(&frame, &bb);
        assert!(!estimator.advance(&frame, &mut bb));
        assert!(estimator.strategy().need_features);
        // detection again, no movement
        assert!(!estimator.advance(&frame, &mut bb));
        assert!(!estimator.strategy().need_features);
        assert_eq!(bb.center(), Vector2f::new(50., 50.));
    }

    #[test]
    fn test_feature_count_change_invalidates() {
        let mut estimator = estimator(1., 0.);
        let frame = Image::new(120, 100);
        let mut bb = RigidBox::new(50., 50., 20., 10., 0.);
        estimator.init_with_box(&frame, &bb);
        estimator.configure(5, false, 10);
        assert!(estimator.strategy().need_features);
        assert!(!estimator.advance(&frame, &mut bb));
        assert_eq!(estimator.strategy().current.len(), 5);
        assert!(estimator.advance(&frame, &mut bb));
    }

    #[test]
    fn test_shuffled_frames_keep_box_valid() {
        let params = SceneParams {
            frame_count: 8,
            ..Default::default()
        };
        let frames: Vec<_> = SyntheticVideo::new(params).unwrap().collect();
        let mut estimator = MotionEstimator::new(SingleWindow::new());
        let mut bb = frames[0].truth;
        assert!(estimator.init_with_box(&frames[0].image, &bb));

        // no reset between frames that do not follow each other
        for n in [5, 1, 7, 0, 3, 3, 6, 2] {
            estimator.advance(&frames[n].image, &mut bb);
            assert!(bb.cx.is_finite() && bb.cy.is_finite(), "{bb}");
            assert!(bb.phi >= 0. && bb.phi < 360., "{bb}");
            assert_eq!((bb.w, bb.h), (frames[0].truth.w, frames[0].truth.h));
        }
        assert!(estimator.is_initialized());
    }
}

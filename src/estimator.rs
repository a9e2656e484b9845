use log::{debug, warn};

use crate::detector::{Detector, FeatureDetector};
use crate::feature::*;
use crate::frame::PyramidFrame;
use crate::image::GrayscaleSource;
use crate::mask::{MaskFilter, Region, RegionMask, Selection};
use crate::my_types::*;
use crate::optical_flow::{FlowParams, OpticalFlow, PointTracker};
use crate::rigid_box::RigidBox;
use crate::transform_hash::{HashParams, TransformHash};

/// Correspondences over the trailing frame steps of a strategy
pub trait CorrespondenceSource {
    /// Number of frame steps with correspondences. Offset 0 is the oldest,
    /// `history_len() - 1` the step ending at the current frame.
    fn history_len(&self) -> usize;

    /// Appends the correspondences of the step at `offset` to `out`
    fn correspondences(&self, offset: usize, out: &mut Vec<Correspondence>);
}

/// How feature sets are found, propagated and corrected over time
pub trait Strategy: CorrespondenceSource {
    /// Start over on a frame of the given size
    fn init(&mut self, width: usize, height: usize);

    fn reset(&mut self);

    /// Feature sets no longer match the configuration
    fn invalidate(&mut self) {}

    /// Find and propagate features for the frame pair of `ctx`. Returns
    /// whether any feature is being tracked.
    fn track(&mut self, ctx: &mut TrackContext<'_>) -> bool;

    /// Drift correction of `bb`, a no-op unless the strategy keeps history
    fn correct(&mut self, _bb: &mut RigidBox, _hash: &mut TransformHash) {}
}

/// The frame pair and primitives a strategy works with during one step
pub struct TrackContext<'a> {
    pub previous: &'a PyramidFrame,
    pub current: &'a PyramidFrame,
    pub mask: &'a RegionMask,
    pub detector: &'a mut dyn FeatureDetector,
    pub flow: &'a mut dyn PointTracker,
    pub feature_count: usize,
    status: &'a mut Vec<bool>,
    errors: &'a mut Vec<f32>,
}

impl<'a> TrackContext<'a> {
    /// Detect at most `max_count` features in the current frame where the
    /// mask admits them. `out` is replaced.
    pub fn find_features(&mut self, selection: Selection, max_count: usize, out: &mut Vec<Vector2f>) -> bool {
        out.clear();
        let filter = MaskFilter::new(self.mask, selection);
        self.detector.detect(&self.current.image, Some(filter), max_count, out)
    }

    /// Track `old` from the previous into the current frame. Lost points and
    /// points outside the frame become the invalid point so indices stay
    /// aligned. Returns the number of points still tracked.
    pub fn track_features(&mut self, old: &[Vector2f], new: &mut Vec<Vector2f>) -> usize {
        self.flow.track(self.previous, self.current, old, new, self.status, self.errors);

        let (cols, rows) = (self.current.image.width as f32, self.current.image.height as f32);
        let mut tracked = 0;
        for (p, ok) in new.iter_mut().zip(self.status.iter()) {
            let inside = p.x >= 0. && p.y >= 0. && p.x < cols && p.y < rows;
            if *ok && inside {
                tracked += 1;
            } else {
                *p = invalid_point();
            }
        }
        tracked
    }
}

/// Estimates the rigid motion of a box between consecutive frames from
/// sparse optical flow, voting correspondences into a [`TransformHash`].
pub struct MotionEstimator<S: Strategy> {
    strategy: S,
    detector: Box<dyn FeatureDetector + Send>,
    flow: Box<dyn PointTracker + Send>,
    hash: TransformHash,
    mask: RegionMask,
    previous: PyramidFrame,
    current: PyramidFrame,
    frame_size: (usize, usize),
    feature_count: usize,
    use_correction: bool,
    non_correction_interval: usize,
    /// frames until the next correction
    correct_in: usize,
    initialized: bool,
    correspondences: Vec<Correspondence>,
    status: Vec<bool>,
    errors: Vec<f32>,
}

impl<S: Strategy> MotionEstimator<S> {
    pub fn new(strategy: S) -> Self {
        Self::with_primitives(
            strategy,
            Box::new(Detector::default()),
            Box::new(OpticalFlow::new(FlowParams::default())),
        )
    }

    pub fn with_primitives(
        strategy: S,
        detector: Box<dyn FeatureDetector + Send>,
        flow: Box<dyn PointTracker + Send>,
    ) -> Self {
        Self {
            strategy,
            detector,
            flow,
            hash: TransformHash::new(HashParams::default()),
            mask: RegionMask::empty(),
            previous: PyramidFrame::empty(),
            current: PyramidFrame::empty(),
            frame_size: (0, 0),
            feature_count: 1000,
            use_correction: false,
            non_correction_interval: 10,
            correct_in: 10,
            initialized: false,
            correspondences: vec![],
            status: vec![],
            errors: vec![],
        }
    }

    pub fn configure(&mut self, feature_count: usize, use_correction: bool, non_correction_interval: usize) {
        if feature_count != self.feature_count {
            self.strategy.invalidate();
        }
        self.feature_count = feature_count;
        self.use_correction = use_correction;
        if use_correction {
            self.non_correction_interval = non_correction_interval.max(1);
            self.correct_in = self.non_correction_interval;
        }
    }

    pub fn init<F: GrayscaleSource + ?Sized>(&mut self, frame: &F) -> bool {
        if self.initialized {
            self.reset();
        }
        if let Err(err) = self.current.refresh(frame, self.flow.levels()) {
            warn!("cannot initialize: {err}");
            return false;
        }
        if let Err(err) = self.previous.clone_from_frame(&self.current) {
            warn!("cannot initialize: {err}");
            self.current.clear();
            return false;
        }
        let (width, height) = (frame.width(), frame.height());
        self.frame_size = (width, height);
        self.mask.init(width, height);
        self.hash.reset();
        self.correct_in = self.non_correction_interval;
        self.strategy.init(width, height);
        self.initialized = true;
        debug!("initialized on a {width} x {height} frame");
        true
    }

    /// Initializes on `frame` and seeds features inside `bb`, so that the
    /// next [`MotionEstimator::advance`] already moves the box
    pub fn init_with_box<F: GrayscaleSource + ?Sized>(&mut self, frame: &F, bb: &RigidBox) -> bool {
        if !self.init(frame) {
            return false;
        }
        self.mask.set(bb);
        let mut ctx = TrackContext {
            previous: &self.previous,
            current: &self.current,
            mask: &self.mask,
            detector: &mut *self.detector,
            flow: &mut *self.flow,
            feature_count: self.feature_count,
            status: &mut self.status,
            errors: &mut self.errors,
        };
        self.strategy.track(&mut ctx);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Moves `bb` by the rigid motion between the previous frame and `frame`.
    /// Returns whether a transform was applied.
    pub fn advance<F: GrayscaleSource + ?Sized>(&mut self, frame: &F, bb: &mut RigidBox) -> bool {
        if !self.initialized {
            debug!("not initialized");
            return false;
        }
        if (frame.width(), frame.height()) != self.frame_size {
            warn!(
                "frame size {} x {} differs from {} x {}",
                frame.width(),
                frame.height(),
                self.frame_size.0,
                self.frame_size.1
            );
            return false;
        }

        self.mask.set(bb);
        std::mem::swap(&mut self.previous, &mut self.current);
        if let Err(err) = self.current.refresh(frame, self.flow.levels()) {
            warn!("cannot convert frame: {err}");
            std::mem::swap(&mut self.previous, &mut self.current);
            return false;
        }

        let mut ctx = TrackContext {
            previous: &self.previous,
            current: &self.current,
            mask: &self.mask,
            detector: &mut *self.detector,
            flow: &mut *self.flow,
            feature_count: self.feature_count,
            status: &mut self.status,
            errors: &mut self.errors,
        };
        self.strategy.track(&mut ctx);

        self.hash.reset();
        self.correspondences.clear();
        if let Some(latest) = self.strategy.history_len().checked_sub(1) {
            self.strategy.correspondences(latest, &mut self.correspondences);
        }

        let center = bb.rotation_center();
        let mut votes = 0;
        for c in &self.correspondences {
            // the source must lie in the box, the destination anywhere but outside
            if self.mask.classify(c.from) == Region::InsideBox && self.mask.classify(c.to).is_inside() {
                self.hash.vote(c.from - center, c.to - center, 1);
                votes += 1;
            }
        }

        let moved = votes > 0;
        if moved {
            let (t, score, _) = self.hash.best();
            debug!("{votes} votes, best {t:?} with score {score}");
            bb.apply_transform(t);
        } else {
            debug!("no votes this frame");
        }

        if self.use_correction {
            self.correct_in = self.correct_in.saturating_sub(1);
            if self.correct_in == 0 {
                self.strategy.correct(bb, &mut self.hash);
                self.correct_in = self.non_correction_interval;
            }
        }

        moved
    }

    /// Releases the frames and the mask. [`MotionEstimator::advance`] is a
    /// no-op until the next init.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.mask.release();
        self.hash.reset();
        self.strategy.reset();
        self.frame_size = (0, 0);
        self.initialized = false;
    }

    pub fn mask(&self) -> &RegionMask {
        &self.mask
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn frame_size(&self) -> (usize, usize) {
        self.frame_size
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::image::Image;

    /// Regular grid of points wherever the mask admits them
    pub struct GridDetector {
        pub step: usize,
    }

    impl FeatureDetector for GridDetector {
        fn detect(
            &mut self,
            image: &Image,
            mask: Option<MaskFilter<'_>>,
            max_count: usize,
            out: &mut Vec<Vector2f>,
        ) -> bool {
            let start = out.len();
            for y in (0..image.height).step_by(self.step) {
                for x in (0..image.width).step_by(self.step) {
                    if out.len() - start >= max_count {
                        break;
                    }
                    if mask.as_ref().map_or(true, |m| m.admits(x, y)) {
                        out.push(Vector2f::new(x as f32, y as f32));
                    }
                }
            }
            out.len() > start
        }
    }

    /// Moves every valid point by a constant shift
    pub struct ShiftFlow {
        pub shift: Vector2f,
    }

    impl PointTracker for ShiftFlow {
        fn levels(&self) -> usize {
            0
        }

        fn track(
            &mut self,
            _frame0: &PyramidFrame,
            _frame1: &PyramidFrame,
            points0: &[Vector2f],
            points1: &mut Vec<Vector2f>,
            status: &mut Vec<bool>,
            errors: &mut Vec<f32>,
        ) {
            points1.clear();
            status.clear();
            errors.clear();
            for p in points0 {
                let valid = is_valid_point(p);
                points1.push(if valid { p + self.shift } else { *p });
                status.push(valid);
                errors.push(if valid { 0. } else { f32::MAX });
            }
        }
    }

    pub fn grid_detector() -> Box<dyn FeatureDetector + Send> {
        Box::new(GridDetector { step: 2 })
    }

    pub fn shift_flow(dx: f32, dy: f32) -> Box<dyn PointTracker + Send> {
        Box::new(ShiftFlow {
            shift: Vector2f::new(dx, dy),
        })
    }
}

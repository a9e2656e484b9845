use log::debug;

use crate::estimator::MotionEstimator;
use crate::image::{GrayscaleSource, Image};
use crate::overlapping_window::{CorrectionReport, OverlappingWindow};
use crate::rigid_box::RigidBox;
use crate::single_window::SingleWindow;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TrackingMode {
    Single,
    Overlapping,
}

/// Everything needed to build and configure an estimator
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    pub mode: TrackingMode,
    pub feature_count: usize,
    /// staggered feature sets of the overlapping window
    pub future_steps: usize,
    pub use_correction: bool,
    /// frames between two drift corrections
    pub non_correction_interval: usize,
    pub seed: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Overlapping,
            feature_count: 1000,
            future_steps: 10,
            use_correction: false,
            non_correction_interval: 10,
            seed: 0,
        }
    }
}

/// An estimator in either mode
pub enum Estimator {
    Single(MotionEstimator<SingleWindow>),
    Overlapping(MotionEstimator<OverlappingWindow>),
}

impl Estimator {
    pub fn new(config: &EstimatorConfig) -> Self {
        let mut estimator = match config.mode {
            TrackingMode::Single => Estimator::Single(MotionEstimator::new(SingleWindow::new())),
            TrackingMode::Overlapping => Estimator::Overlapping(MotionEstimator::new(
                OverlappingWindow::new(config.future_steps, config.seed),
            )),
        };
        estimator.configure(config);
        estimator
    }

    pub fn mode(&self) -> TrackingMode {
        match self {
            Estimator::Single(_) => TrackingMode::Single,
            Estimator::Overlapping(_) => TrackingMode::Overlapping,
        }
    }

    /// The single window never corrects
    pub fn configure(&mut self, config: &EstimatorConfig) {
        match self {
            Estimator::Single(e) => e.configure(config.feature_count, false, config.non_correction_interval),
            Estimator::Overlapping(e) => e.configure(
                config.feature_count,
                config.use_correction,
                config.non_correction_interval,
            ),
        }
    }

    pub fn init_with_box<F: GrayscaleSource + ?Sized>(&mut self, frame: &F, bb: &RigidBox) -> bool {
        match self {
            Estimator::Single(e) => e.init_with_box(frame, bb),
            Estimator::Overlapping(e) => e.init_with_box(frame, bb),
        }
    }

    pub fn advance<F: GrayscaleSource + ?Sized>(&mut self, frame: &F, bb: &mut RigidBox) -> bool {
        match self {
            Estimator::Single(e) => e.advance(frame, bb),
            Estimator::Overlapping(e) => e.advance(frame, bb),
        }
    }

    pub fn is_initialized(&self) -> bool {
        match self {
            Estimator::Single(e) => e.is_initialized(),
            Estimator::Overlapping(e) => e.is_initialized(),
        }
    }

    pub fn frame_size(&self) -> (usize, usize) {
        match self {
            Estimator::Single(e) => e.frame_size(),
            Estimator::Overlapping(e) => e.frame_size(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Estimator::Single(e) => e.reset(),
            Estimator::Overlapping(e) => e.reset(),
        }
    }

    pub fn last_correction(&self) -> Option<CorrectionReport> {
        match self {
            Estimator::Single(_) => None,
            Estimator::Overlapping(e) => e.strategy().last_report(),
        }
    }
}

/// Drives an estimator over a stream of numbered frames. Any frame that
/// does not directly follow the previous one starts tracking over.
pub struct TrackingSession {
    config: EstimatorConfig,
    estimator: Estimator,
    last_frame: Image,
    last_frame_number: Option<usize>,
}

impl TrackingSession {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            estimator: Estimator::new(&config),
            config,
            last_frame: Image::empty(),
            last_frame_number: None,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Moves `bb` into frame `frame_number`. Returns whether the box moved.
    pub fn track<F: GrayscaleSource + ?Sized>(
        &mut self,
        frame_number: usize,
        frame: &F,
        bb: &mut RigidBox,
    ) -> bool {
        let size = (frame.width(), frame.height());
        let same_size = size == (self.last_frame.width, self.last_frame.height);
        let sequential = self.last_frame_number.map_or(false, |n| n + 1 == frame_number);
        if !sequential && self.estimator.is_initialized() {
            debug!("frame {frame_number} does not follow {:?}, starting over", self.last_frame_number);
            self.estimator.reset();
        }
        if self.estimator.is_initialized() && self.estimator.frame_size() != size {
            debug!("frame size changed from {:?} to {size:?}, starting over", self.estimator.frame_size());
            self.estimator.reset();
        }

        let moved = if self.estimator.is_initialized() {
            self.estimator.advance(frame, bb)
        } else {
            self.estimator.configure(&self.config);
            if sequential && same_size && !self.last_frame.is_empty() {
                self.estimator.init_with_box(&self.last_frame, bb) && self.estimator.advance(frame, bb)
            } else {
                self.estimator.init_with_box(frame, bb);
                false
            }
        };

        frame.write_grayscale(&mut self.last_frame);
        self.last_frame_number = Some(frame_number);
        moved
    }

    /// Rebuilds the estimator in `mode`
    pub fn set_mode(&mut self, mode: TrackingMode) {
        self.config.mode = mode;
        self.estimator = Estimator::new(&self.config);
    }

    pub fn set_config(&mut self, config: EstimatorConfig) {
        self.config = config;
        self.estimator = Estimator::new(&self.config);
    }

    /// The box was moved by hand, the next frame anchors on it
    pub fn box_edited(&mut self) {
        self.estimator.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: TrackingMode) -> EstimatorConfig {
        EstimatorConfig {
            mode,
            feature_count: 200,
            future_steps: 3,
            ..Default::default()
        }
    }

    fn checkerboard(width: usize, height: usize, shift: usize) -> Image {
        let mut image = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let v = if ((x + shift) / 8 + y / 8) % 2 == 0 { 60 } else { 190 };
                image.set_value(x, y, v);
            }
        }
        image
    }

    #[test]
    fn test_out_of_order_frames() {
        for mode in [TrackingMode::Single, TrackingMode::Overlapping] {
            let mut session = TrackingSession::new(config(mode));
            let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
            for n in [5, 3, 4, 4, 9, 0, 1, 2, 100] {
                let frame = checkerboard(96, 80, n % 4);
                session.track(n, &frame, &mut bb);
                assert!(bb.cx.is_finite() && bb.cy.is_finite());
                assert!(bb.phi >= 0. && bb.phi < 360.);
            }
        }
    }

    #[test]
    fn test_frame_size_change_reanchors() {
        let mut session = TrackingSession::new(config(TrackingMode::Single));
        let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
        session.track(0, &checkerboard(100, 100, 0), &mut bb);
        assert_eq!(session.estimator().frame_size(), (100, 100));

        // the first frame of the new size only anchors
        assert!(!session.track(1, &checkerboard(120, 100, 0), &mut bb));
        assert!(session.estimator().is_initialized());
        assert_eq!(session.estimator().frame_size(), (120, 100));

        // tracking continues on the new size
        let mut moved = 0;
        for n in 2..6 {
            if session.track(n, &checkerboard(120, 100, 0), &mut bb) {
                moved += 1;
            }
        }
        assert_eq!(session.estimator().frame_size(), (120, 100));
        assert!(moved > 0);
    }

    #[test]
    fn test_first_frame_only_initializes() {
        let mut session = TrackingSession::new(config(TrackingMode::Single));
        let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
        assert!(!session.track(0, &checkerboard(96, 80, 0), &mut bb));
        assert!(session.estimator().is_initialized());
        assert_eq!(bb, RigidBox::new(48., 40., 30., 20., 0.));
    }

    #[test]
    fn test_jump_resets() {
        let mut session = TrackingSession::new(config(TrackingMode::Single));
        let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
        session.track(0, &checkerboard(96, 80, 0), &mut bb);
        let before = bb;
        // a jump only re-anchors
        assert!(!session.track(7, &checkerboard(96, 80, 3), &mut bb));
        assert_eq!(bb, before);
    }

    #[test]
    fn test_mode_switch_rebuilds() {
        let mut session = TrackingSession::new(config(TrackingMode::Single));
        let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
        session.track(0, &checkerboard(96, 80, 0), &mut bb);
        session.set_mode(TrackingMode::Overlapping);
        assert_eq!(session.estimator().mode(), TrackingMode::Overlapping);
        assert!(!session.estimator().is_initialized());
        assert_eq!(session.config().mode, TrackingMode::Overlapping);

        // the next sequential frame anchors on the stored frame
        session.track(1, &checkerboard(96, 80, 0), &mut bb);
        assert!(session.estimator().is_initialized());
    }

    #[test]
    fn test_box_edited() {
        let mut session = TrackingSession::new(config(TrackingMode::Overlapping));
        let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
        session.track(0, &checkerboard(96, 80, 0), &mut bb);
        session.box_edited();
        assert!(!session.estimator().is_initialized());
        session.track(1, &checkerboard(96, 80, 0), &mut bb);
        assert!(session.estimator().is_initialized());
    }

    #[test]
    fn test_single_never_corrects() {
        let mut session = TrackingSession::new(EstimatorConfig {
            use_correction: true,
            non_correction_interval: 1,
            ..config(TrackingMode::Single)
        });
        let mut bb = RigidBox::new(48., 40., 30., 20., 0.);
        for n in 0..3 {
            session.track(n, &checkerboard(96, 80, 0), &mut bb);
        }
        assert_eq!(session.estimator().last_correction(), None);
    }
}

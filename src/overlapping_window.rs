use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::estimator::{CorrespondenceSource, Strategy, TrackContext};
use crate::feature::{Correspondence, FeatureSet};
use crate::mask::{Region, RegionMask, Selection};
use crate::rigid_box::RigidBox;
use crate::transform_hash::TransformHash;

/// Candidate boxes per correction pass, the unperturbed box included
pub const NUM_MODELS: usize = 40;
pub const MODEL_VARIANCE_XY: f32 = 10.;
pub const MODEL_VARIANCE_PHI: f32 = 10.;
pub const MAX_CORRECTION_PASSES: usize = 100;

/// Staggered feature sets: one set is detected afresh every frame and each
/// set lives for `S` frames, so the last `S - 1` frame steps are always
/// covered by correspondences.
#[derive(Debug)]
pub struct StaggeredSets {
    sets: Vec<FeatureSet>,
    /// frames tracked since init
    counter: usize,
}

impl StaggeredSets {
    pub fn new(future_steps: usize) -> Self {
        let s = future_steps.max(2);
        Self {
            sets: (0..s).map(|_| FeatureSet::new(s)).collect(),
            counter: 0,
        }
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn clear(&mut self) {
        for set in self.sets.iter_mut() {
            set.clear();
        }
        self.counter = 0;
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> bool {
        let s = self.sets.len();
        let n = self.counter;
        let slot = n % s;
        let previous_slot = (slot + s - 1) % s;
        let per_set = (ctx.feature_count / s).max(1);

        let fresh = &mut self.sets[slot];
        fresh.restart(n);
        let found = ctx.find_features(Selection::BoxAndRim, per_set, &mut fresh.slots[slot]);
        debug!("frame {n}: {} fresh features in set {slot}", fresh.slots[slot].len());

        let mut tracked = 0;
        for (i, set) in self.sets.iter_mut().enumerate() {
            if i == slot || !set.covers_step(n) {
                continue;
            }
            let (old, new) = set.step_slots(previous_slot, slot);
            tracked += ctx.track_features(old, new);
        }
        trace!("frame {n}: {tracked} features propagated");

        self.counter += 1;
        found || tracked > 0
    }
}

impl CorrespondenceSource for StaggeredSets {
    fn history_len(&self) -> usize {
        self.sets.len() - 1
    }

    fn correspondences(&self, offset: usize, out: &mut Vec<Correspondence>) {
        let s = self.sets.len();
        if self.counter == 0 || offset > s - 2 {
            return;
        }
        let last = self.counter - 1;
        let back = s - 2 - offset;
        if back >= last {
            return;
        }
        // the step (f - 1) -> f
        let f = last - back;
        for set in &self.sets {
            if set.covers_step(f) {
                set.push_correspondences((f - 1) % s, f % s, out);
            }
        }
    }
}

/// Outcome of one drift correction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrectionReport {
    pub passes: usize,
    pub score: f32,
}

/// Randomized search around the box for the pose most consistent with the
/// recorded correspondences
pub struct DriftCorrector {
    mask: RegionMask,
    rng: Xoshiro256PlusPlus,
    models: Vec<RigidBox>,
    correspondences: Vec<Correspondence>,
}

impl DriftCorrector {
    pub fn new(seed: u64) -> Self {
        Self {
            mask: RegionMask::empty(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            models: Vec::with_capacity(NUM_MODELS),
            correspondences: vec![],
        }
    }

    pub fn init(&mut self, width: usize, height: usize) {
        self.mask.init(width, height);
    }

    pub fn release(&mut self) {
        self.mask.release();
    }

    /// Replaces `bb` by the best scoring candidate, searching again around
    /// each adopted candidate until the score stops improving
    pub fn correct<C: CorrespondenceSource + ?Sized>(
        &mut self,
        bb: &mut RigidBox,
        hash: &mut TransformHash,
        source: &C,
    ) -> CorrectionReport {
        let mut passes = 0;
        let mut max_score = 0.;
        loop {
            let last_max_score = max_score;
            self.distribute_models(bb);

            let mut max_index = 0;
            max_score = f32::MIN;
            for m in 0..self.models.len() {
                let mut candidate = self.models[m];
                let score = self.score_model(&mut candidate, hash, source);
                if score > max_score {
                    max_score = score;
                    max_index = m;
                }
            }
            *bb = self.models[max_index];
            passes += 1;
            trace!("correction pass {passes}: model {max_index} scores {max_score}, {bb}");

            if max_score == last_max_score || passes >= MAX_CORRECTION_PASSES {
                break;
            }
        }
        debug!("correction adopted {bb} after {passes} passes");
        CorrectionReport {
            passes,
            score: max_score,
        }
    }

    /// The seed box followed by Gaussian perturbations of its center and angle
    fn distribute_models(&mut self, seed: &RigidBox) {
        let sigma_xy = MODEL_VARIANCE_XY.sqrt();
        let sigma_phi = MODEL_VARIANCE_PHI.sqrt();
        self.models.clear();
        self.models.push(*seed);
        for _ in 1..NUM_MODELS {
            let cx = seed.cx + sigma_xy * self.rng.sample::<f32, _>(StandardNormal);
            let cy = seed.cy + sigma_xy * self.rng.sample::<f32, _>(StandardNormal);
            let phi = seed.phi + sigma_phi * self.rng.sample::<f32, _>(StandardNormal);
            self.models.push(RigidBox::new(cx, cy, seed.w, seed.h, phi));
        }
    }

    /// Walks `candidate` through the history, rewarding votes from inside
    /// the box and penalizing votes from the rim
    fn score_model<C: CorrespondenceSource + ?Sized>(
        &mut self,
        candidate: &mut RigidBox,
        hash: &mut TransformHash,
        source: &C,
    ) -> f32 {
        let mut score = 0.;
        for offset in 0..source.history_len() {
            self.mask.set(candidate);
            let center = candidate.rotation_center();
            hash.reset();
            self.correspondences.clear();
            source.correspondences(offset, &mut self.correspondences);

            let mut votes = 0;
            for c in &self.correspondences {
                let weight = match self.mask.classify(c.from) {
                    Region::InsideBox => 1,
                    Region::InsideRim => -1,
                    Region::Outside => continue,
                };
                // relative to the walked candidate, not the box the search started from
                hash.vote(c.from - center, c.to - center, weight);
                votes += 1;
            }

            if votes > 0 {
                let (t, best, _) = hash.best();
                candidate.apply_transform(t);
                let best = best.max(0) as f32;
                score += best * best / votes as f32;
            }
        }
        score
    }
}

/// `future_steps` staggered feature sets with optional drift correction
pub struct OverlappingWindow {
    window: StaggeredSets,
    corrector: DriftCorrector,
    last_report: Option<CorrectionReport>,
}

impl OverlappingWindow {
    pub fn new(future_steps: usize, seed: u64) -> Self {
        Self {
            window: StaggeredSets::new(future_steps),
            corrector: DriftCorrector::new(seed),
            last_report: None,
        }
    }

    pub fn future_steps(&self) -> usize {
        self.window.set_count()
    }

    pub fn last_report(&self) -> Option<CorrectionReport> {
        self.last_report
    }
}

impl CorrespondenceSource for OverlappingWindow {
    fn history_len(&self) -> usize {
        self.window.history_len()
    }

    fn correspondences(&self, offset: usize, out: &mut Vec<Correspondence>) {
        self.window.correspondences(offset, out)
    }
}

impl Strategy for OverlappingWindow {
    fn init(&mut self, width: usize, height: usize) {
        self.window.clear();
        self.corrector.init(width, height);
        self.last_report = None;
    }

    fn reset(&mut self) {
        self.window.clear();
        self.corrector.release();
        self.last_report = None;
    }

    fn invalidate(&mut self) {
        self.window.clear();
    }

    fn track(&mut self, ctx: &mut TrackContext<'_>) -> bool {
        self.window.track(ctx)
    }

    fn correct(&mut self, bb: &mut RigidBox, hash: &mut TransformHash) {
        self.last_report = Some(self.corrector.correct(bb, hash, &self.window));
    }
}

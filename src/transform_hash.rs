use crate::math::rotation_matrix;
use crate::my_types::*;
use crate::rigid_box::RigidTransform;

pub const HASH_SIZE: usize = 131072;
const HASH_MASK: u64 = HASH_SIZE as u64 - 1;

/// 19 bit magnitude and one sign bit per packed axis
const KEY_MAGNITUDE_MASK: u64 = 0x7FFFF;
const KEY_SIGN_BIT: u64 = 0x80000;
const KEY_AXIS_BITS: u32 = 20;

/// Integers keep one decimal of the rounded values
const QUANTIZATION_SCALE: f32 = 10.;

#[derive(Clone, Debug)]
pub struct HashParams {
    /// rotation hypotheses span [-max_angle, max_angle] degrees
    pub max_angle: i32,
    pub angle_step: i32,
    /// grid cells per unit, values are rounded to the nearest 1 / steps_per_unit
    pub steps_per_unit: f32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            max_angle: 20,
            angle_step: 1,
            steps_per_unit: 2.,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VoteBucket {
    /// rewards minus penalties
    pub net: i32,
    pub positive: f32,
    pub negative: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantizedTransform {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Hough voting accumulator over quantized rigid transforms.
///
/// Each vote is a correspondence `from -> to` (both relative to the rotation
/// center). For every rotation hypothesis `a` the translation that maps
/// `R(a) * from` onto `to` is quantized and hashed into a fixed-size table.
/// Colliding keys share a bucket.
pub struct TransformHash {
    params: HashParams,
    buckets: Vec<VoteBucket>,
    /// (angle in degrees, rotation) per hypothesis
    rotations: Vec<(f32, Matrix2f)>,
    best_score: i32,
    best_scores: (f32, f32),
    best_transform: RigidTransform,
    /// number of transforms averaged into `best_transform`
    tie_count: u32,
}

impl TransformHash {
    pub fn new(params: HashParams) -> Self {
        let step = params.angle_step.max(1);
        let steps = (2 * params.max_angle + 1) / step;
        let rotations = (0..steps)
            .map(|i| {
                let angle = (step * i - params.max_angle) as f32;
                (angle, rotation_matrix(angle))
            })
            .collect();

        Self {
            params,
            buckets: vec![VoteBucket::default(); HASH_SIZE],
            rotations,
            best_score: 0,
            best_scores: (0., 0.),
            best_transform: RigidTransform::default(),
            tie_count: 0,
        }
    }

    pub fn hypothesis_count(&self) -> usize {
        self.rotations.len()
    }

    pub fn reset(&mut self) {
        self.buckets.fill(VoteBucket::default());
        self.best_score = 0;
        self.best_scores = (0., 0.);
        self.best_transform = RigidTransform::default();
        self.tie_count = 0;
    }

    /// Casts `weight` for every rotation hypothesis of the correspondence.
    /// Positive weights reward, negative weights penalize.
    pub fn vote(&mut self, from: Vector2f, to: Vector2f, weight: i32) {
        for i in 0..self.rotations.len() {
            let (angle, rotation) = self.rotations[i];

            // R * from + t = to
            let t = to - rotation * from;
            let candidate = RigidTransform::new(t.x, t.y, angle);

            let key = make_key(self.quantize(candidate));
            let hash = (sdbm(&key.to_le_bytes()) & HASH_MASK) as usize;

            let bucket = &mut self.buckets[hash];
            bucket.net += weight;
            if weight > 0 {
                bucket.positive += weight as f32;
            } else {
                bucket.negative += -weight as f32;
            }
            let scores = (bucket.positive, bucket.negative);

            // ignore penalties
            let count = scores.0 as i32;
            if count > self.best_score {
                self.best_score = count;
                self.best_scores = scores;
                self.best_transform = candidate;
                self.tie_count = 1;
            } else if count == self.best_score {
                // running average of every transform sharing the best score
                let n = self.tie_count as f32;
                let b = &mut self.best_transform;
                b.dx = (b.dx * n + candidate.dx) / (n + 1.);
                b.dy = (b.dy * n + candidate.dy) / (n + 1.);
                b.dphi = (b.dphi * n + candidate.dphi) / (n + 1.);
                self.tie_count += 1;
            }
        }
    }

    /// Best supported transform, snapped to the voting grid, with its score
    /// and (positive, negative) totals
    pub fn best(&self) -> (RigidTransform, i32, (f32, f32)) {
        (
            self.unquantize(self.quantize(self.best_transform)),
            self.best_score,
            self.best_scores,
        )
    }

    /// Shifts the decade up so one decimal of the value rounded to the nearest
    /// `1 / steps_per_unit` survives as an integer. Halves round away from
    /// zero.
    pub fn quantize(&self, t: RigidTransform) -> QuantizedTransform {
        let steps = self.params.steps_per_unit;
        let q = |v: f32| (QUANTIZATION_SCALE * ((steps * v).round() / steps)) as i32;
        QuantizedTransform {
            x: q(t.dx),
            y: q(t.dy),
            z: q(t.dphi),
        }
    }

    pub fn unquantize(&self, q: QuantizedTransform) -> RigidTransform {
        RigidTransform::new(
            q.x as f32 / QUANTIZATION_SCALE,
            q.y as f32 / QUANTIZATION_SCALE,
            q.z as f32 / QUANTIZATION_SCALE,
        )
    }
}

fn pack_axis(v: i32) -> u64 {
    let magnitude = v.unsigned_abs() as u64 & KEY_MAGNITUDE_MASK;
    if v < 0 {
        magnitude | KEY_SIGN_BIT
    } else {
        magnitude
    }
}

pub fn make_key(q: QuantizedTransform) -> u64 {
    pack_axis(q.x) | (pack_axis(q.y) << KEY_AXIS_BITS) | (pack_axis(q.z) << (2 * KEY_AXIS_BITS))
}

/// ref http://www.cse.yorku.ca/~oz/hash.html
pub fn sdbm(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |hash, &b| {
        (b as u64)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash)
    })
}

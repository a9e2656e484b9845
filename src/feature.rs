use crate::my_types::*;

/// Placeholder for a feature that is no longer tracked. Keeping it in place
/// preserves index alignment between the buffers of a feature set.
pub fn invalid_point() -> Vector2f {
    Vector2f::new(-1., -1.)
}

pub fn is_valid_point(p: &Vector2f) -> bool {
    p.x >= 0. && p.y >= 0.
}

/// The same physical feature observed in two consecutive frames
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub from: Vector2f,
    pub to: Vector2f,
}

impl Correspondence {
    pub fn new(from: Vector2f, to: Vector2f) -> Self {
        Self { from, to }
    }
}

/// Feature positions over a window of consecutive frames. Slot `k` holds
/// the positions in frames `n` with `n % slots.len() == k`.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    pub slots: Vec<Vec<Vector2f>>,
    /// frame number at which the features were found
    pub started_at: Option<usize>,
}

impl FeatureSet {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![vec![]; slot_count],
            started_at: None,
        }
    }

    pub fn restart(&mut self, frame_number: usize) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.started_at = Some(frame_number);
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.started_at = None;
    }

    /// Whether positions exist for both ends of the step `frame_number - 1 -> frame_number`
    pub fn covers_step(&self, frame_number: usize) -> bool {
        match self.started_at {
            Some(start) => frame_number > start,
            None => false,
        }
    }

    /// Source and destination slots for one propagation step
    pub fn step_slots(&mut self, from: usize, to: usize) -> (&[Vector2f], &mut Vec<Vector2f>) {
        assert_ne!(from, to);
        if from < to {
            let (head, tail) = self.slots.split_at_mut(to);
            (&head[from], &mut tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(from);
            (&tail[0], &mut head[to])
        }
    }

    pub fn push_correspondences(&self, from: usize, to: usize, out: &mut Vec<Correspondence>) {
        out.extend(
            self.slots[from]
                .iter()
                .zip(self.slots[to].iter())
                .map(|(a, b)| Correspondence::new(*a, *b)),
        );
    }
}

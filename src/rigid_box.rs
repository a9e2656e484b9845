use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{rotate_vector, rotation_matrix, wrap_degrees};
use crate::my_types::*;

/// Distance of the rotation center in front of the box center, as
/// `offset² / 2` along the box's forward axis. Zero rotates about the center.
pub const ROTATION_OFFSET: f32 = 0.;

/// A 2-D rigid motion: translation plus rotation in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub dx: f32,
    pub dy: f32,
    pub dphi: f32,
}

impl RigidTransform {
    pub fn new(dx: f32, dy: f32, dphi: f32) -> Self {
        Self { dx, dy, dphi }
    }

    /// Maps `p` (relative to the rotation center) the way the transform hash
    /// models a correspondence: `R(dphi) * p + (dx, dy)`
    pub fn apply_to_point(&self, p: Vector2f) -> Vector2f {
        rotate_vector(p, self.dphi) + Vector2f::new(self.dx, self.dy)
    }
}

/// The tracked object's pose: center, size and orientation in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    /// degrees in [0, 360)
    pub phi: f32,
}

impl RigidBox {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32, phi: f32) -> Self {
        Self {
            cx,
            cy,
            w: w.max(0.),
            h: h.max(0.),
            phi: wrap_degrees(phi),
        }
    }

    pub fn center(&self) -> Vector2f {
        Vector2f::new(self.cx, self.cy)
    }

    pub fn is_degenerate(&self) -> bool {
        self.w == 0. || self.h == 0.
    }

    /// Same center and orientation, scaled extents
    pub fn scaled(&self, sw: f32, sh: f32) -> Self {
        Self {
            w: self.w * sw,
            h: self.h * sh,
            ..*self
        }
    }

    pub fn rotation_center(&self) -> Vector2f {
        self.rotation_center_with_offset(ROTATION_OFFSET)
    }

    pub fn rotation_center_with_offset(&self, offset: f32) -> Vector2f {
        rotate_vector(Vector2f::new(offset * offset / 2., 0.), self.phi) + self.center()
    }

    pub fn apply_transform(&mut self, t: RigidTransform) {
        self.apply_transform_with_offset(t, ROTATION_OFFSET);
    }

    pub fn apply_transform_with_offset(&mut self, t: RigidTransform, offset: f32) {
        self.cx += t.dx;
        self.cy += t.dy;
        self.rotate(t.dphi, offset);
    }

    fn rotate(&mut self, dphi: f32, offset: f32) {
        if offset != 0. {
            let cor = self.rotation_center_with_offset(offset);
            let center = rotate_vector(self.center() - cor, dphi) + cor;
            self.cx = center.x;
            self.cy = center.y;
        }
        self.phi = wrap_degrees(self.phi + dphi);
    }

    /// Corners in a fixed winding order: the local corners
    /// (-w/2, h/2), (w/2, h/2), (w/2, -h/2), (-w/2, -h/2) rotated by `phi`
    pub fn corner_points(&self) -> [Point2i; 4] {
        let w2 = (self.w / 2.).trunc();
        let h2 = (self.h / 2.).trunc();
        let m = rotation_matrix(self.phi);
        let center = self.center();
        [
            Vector2f::new(-w2, h2),
            Vector2f::new(w2, h2),
            Vector2f::new(w2, -h2),
            Vector2f::new(-w2, -h2),
        ]
        .map(|corner| {
            let p = m * corner + center;
            Point2i::new(p.x as i32, p.y as i32)
        })
    }
}

impl fmt::Display for RigidBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB({}, {} ; {})", self.cx, self.cy, self.phi)
    }
}

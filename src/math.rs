use crate::my_types::*; 

/// Rotation by `degrees` in image coordinates (y pointing down).
/// Boxes, corner points and the transform hash all share this convention.
pub fn rotation_matrix(degrees: f32) -> Matrix2f {
    let (s, c) = degrees.to_radians().sin_cos();
    Matrix2f::new(
        c, s,
        -s, c,
    )
}

pub fn rotate_vector(p: Vector2f, degrees: f32) -> Vector2f {
    rotation_matrix(degrees) * p
}

/// Wraps an angle in degrees into [0, 360).
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 720.) % 360.;
    let wrapped = if wrapped < 0. { wrapped.rem_euclid(360.) } else { wrapped };
    // rem_euclid may round up to exactly 360 for tiny negative inputs
    if wrapped >= 360. {
        0.
    } else {
        // normalizes -0.0
        wrapped + 0.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_composes() {
        let p = Vector2f::new(3., -4.);
        let a = rotate_vector(rotate_vector(p, 12.), 7.);
        let b = rotate_vector(p, 19.);
        assert!((a - b).norm() < 1e-4);
        assert!((rotate_vector(p, 0.) - p).norm() < 1e-6);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(0.), 0.);
        assert_eq!(wrap_degrees(360.), 0.);
        assert!((wrap_degrees(-10.) - 350.).abs() < 1e-4);
        assert!((wrap_degrees(725.) - 5.).abs() < 1e-3);
        for phi in [-1e-7_f32, -359.9, -5000.5, 1e6, 359.99997] {
            let w = wrap_degrees(phi);
            assert!(w >= 0. && w < 360., "{phi} wrapped to {w}");
        }
    }
}

//! Soft speed limiting.
//!
//! The bicubic limiter is `y = x − 4x³/(27L²)` for `|x| < 1.5L` and `±L`
//! beyond. It has unit slope at the origin, zero slope where it meets the
//! ceiling, and is monotonic in between.

use crate::vector::PhysicsVector;

/// Soft-clamp `x` to `[-limit, +limit]`.
#[inline]
pub fn bicubic_limiter(x: f64, limit: f64) -> f64 {
    let knee = 1.5 * limit;
    if x >= knee {
        limit
    } else if x <= -knee {
        -limit
    } else {
        x - (4.0 / 27.0) * x * x * x / (limit * limit)
    }
}

/// `vel` rescaled so its magnitude passes through [`bicubic_limiter`].
///
/// Speeds below `speed_limit / 1e6` are returned unchanged.
#[inline]
pub fn effective_velocity(vel: PhysicsVector, speed_limit: f64) -> PhysicsVector {
    let raw_speed = vel.magnitude();
    if raw_speed < speed_limit / 1.0e6 {
        return vel;
    }
    let eff_speed = bicubic_limiter(raw_speed, speed_limit);
    (eff_speed / raw_speed) * vel
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn limiter_is_identity_near_zero() {
        assert_relative_eq!(bicubic_limiter(1.0e-3, 10.0), 1.0e-3, max_relative = 1e-6);
    }

    #[test]
    fn limiter_meets_ceiling_smoothly() {
        let limit = 2.0;
        let knee = 1.5 * limit;
        assert_abs_diff_eq!(bicubic_limiter(knee, limit), limit, epsilon = 1e-12);
        let h = 1.0e-6;
        let slope = (bicubic_limiter(knee, limit) - bicubic_limiter(knee - h, limit)) / h;
        assert!(slope.abs() < 1e-5, "slope at knee = {slope}");
        assert_eq!(bicubic_limiter(1.0e9, limit), limit);
        assert_eq!(bicubic_limiter(-1.0e9, limit), -limit);
    }

    #[test]
    fn limiter_is_monotonic_and_bounded() {
        let limit = 1000.0;
        let mut prev = bicubic_limiter(-3000.0, limit);
        for k in -3000..=3000 {
            let y = bicubic_limiter(f64::from(k), limit);
            assert!(y >= prev, "not monotonic at {k}");
            assert!(y.abs() <= limit);
            prev = y;
        }
    }

    #[test]
    fn effective_velocity_keeps_direction() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..200 {
            let v = PhysicsVector::new(
                rng.gen_range(-5000.0..5000.0),
                rng.gen_range(-5000.0..5000.0),
                rng.gen_range(-5000.0..5000.0),
            );
            let e = effective_velocity(v, 1000.0);
            assert!(e.magnitude() <= 1000.0 + 1e-9);
            assert_abs_diff_eq!(e.cross(v).magnitude() / (e.magnitude() * v.magnitude()), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn tiny_velocity_passes_through() {
        let v = PhysicsVector::new(1.0e-9, 0.0, 0.0);
        assert_eq!(effective_velocity(v, 1000.0), v);
    }
}

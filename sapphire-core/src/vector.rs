//! `PhysicsVector`: the 3D state vector for positions, velocities and forces.
//!
//! Mesh displacements are on the order of micrometres around millimetre
//! rest positions, so components are `f64`.

use core::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PhysicsVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PhysicsVector {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Squared length.
    #[inline]
    pub fn quadrature(self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn magnitude(self) -> f64 {
        self.quadrature().sqrt()
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Blend `a` toward `b` by `slider` in [0, 1], then rescale the result to
    /// the length of `a`.
    ///
    /// Returns `a` unchanged when the blend collapses to zero length.
    pub fn interpolate(slider: f64, a: Self, b: Self) -> Self {
        let c = (1.0 - slider) * a + slider * b;
        let cc = c.quadrature();
        if cc <= 0.0 {
            return a;
        }
        (a.quadrature() / cc).sqrt() * c
    }
}

impl Index<usize> for PhysicsVector {
    type Output = f64;

    /// Axis 0, 1, 2 map to x, y, z; anything else panics like slice indexing.
    fn index(&self, axis: usize) -> &f64 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("PhysicsVector axis out of range: {axis}"),
        }
    }
}

impl IndexMut<usize> for PhysicsVector {
    fn index_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("PhysicsVector axis out of range: {axis}"),
        }
    }
}

impl Add for PhysicsVector {
    type Output = Self;
    #[inline]
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for PhysicsVector {
    type Output = Self;
    #[inline]
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Neg for PhysicsVector {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for PhysicsVector {
    type Output = Self;
    #[inline]
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Mul<PhysicsVector> for f64 {
    type Output = PhysicsVector;
    #[inline]
    fn mul(self, v: PhysicsVector) -> PhysicsVector {
        v * self
    }
}

impl Div<f64> for PhysicsVector {
    type Output = Self;
    #[inline]
    fn div(self, d: f64) -> Self {
        Self::new(self.x / d, self.y / d, self.z / d)
    }
}

impl AddAssign for PhysicsVector {
    #[inline]
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl SubAssign for PhysicsVector {
    #[inline]
    fn sub_assign(&mut self, o: Self) {
        *self = *self - o;
    }
}

impl MulAssign<f64> for PhysicsVector {
    #[inline]
    fn mul_assign(&mut self, s: f64) {
        *self = *self * s;
    }
}

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::fold_deg;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("unit vector is undefined for a zero-magnitude vector")]
    ZeroMagnitude,
}

/// A planar vector with cartesian storage and polar views. `x` is east,
/// `y` is north, so the nav-convention bearing is measured from +y.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TwoVector {
    pub x: f64,
    pub y: f64,
}

impl TwoVector {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// From a math-convention polar pair (radians counterclockwise from +x).
    pub fn from_polar_rad(angle: f64, mag: f64) -> Self {
        Self { x: mag * angle.cos(), y: mag * angle.sin() }
    }

    pub fn from_polar_deg(angle: f64, mag: f64) -> Self {
        Self::from_polar_rad(angle.to_radians(), mag)
    }

    /// From a nav-convention polar pair (degrees clockwise from north).
    pub fn from_bearing_deg(bearing: f64, mag: f64) -> Self {
        let rad = bearing.to_radians();
        Self { x: mag * rad.sin(), y: mag * rad.cos() }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn mag(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Math-convention angle, radians counterclockwise from +x.
    pub fn angle_rad(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle_rad().to_degrees()
    }

    /// Nav-convention bearing, degrees clockwise from north, [0, 360).
    pub fn bearing_deg(&self) -> f64 {
        fold_deg(self.x.atan2(self.y).to_degrees())
    }

    pub fn dot(&self, other: &TwoVector) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Rotate counterclockwise by an angle in radians.
    pub fn rotate_rad(&self, rad: f64) -> TwoVector {
        let (s, c) = rad.sin_cos();
        TwoVector { x: self.x * c - self.y * s, y: self.x * s + self.y * c }
    }

    pub fn rotate_deg(&self, deg: f64) -> TwoVector {
        self.rotate_rad(deg.to_radians())
    }

    pub fn unit(&self) -> Result<TwoVector, VectorError> {
        let mag = self.mag();
        if mag == 0.0 || !mag.is_finite() {
            return Err(VectorError::ZeroMagnitude);
        }
        Ok(*self / mag)
    }
}

impl Add for TwoVector {
    type Output = TwoVector;
    fn add(self, rhs: TwoVector) -> TwoVector {
        TwoVector { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl AddAssign for TwoVector {
    fn add_assign(&mut self, rhs: TwoVector) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for TwoVector {
    type Output = TwoVector;
    fn sub(self, rhs: TwoVector) -> TwoVector {
        TwoVector { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl SubAssign for TwoVector {
    fn sub_assign(&mut self, rhs: TwoVector) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for TwoVector {
    type Output = TwoVector;
    fn mul(self, rhs: f64) -> TwoVector {
        TwoVector { x: self.x * rhs, y: self.y * rhs }
    }
}

impl Div<f64> for TwoVector {
    type Output = TwoVector;
    fn div(self, rhs: f64) -> TwoVector {
        TwoVector { x: self.x / rhs, y: self.y / rhs }
    }
}

impl Neg for TwoVector {
    type Output = TwoVector;
    fn neg(self) -> TwoVector {
        TwoVector { x: -self.x, y: -self.y }
    }
}

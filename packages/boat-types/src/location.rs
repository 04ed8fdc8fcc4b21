use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::twovector::TwoVector;

/// Mean Earth radius in metres (IUGG mean radius).
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeodesyError {
    #[error("invalid inputs: one or both endpoints are not valid locations")]
    InvalidInputs,
}

/// How a course between two points is measured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourseType {
    #[default]
    GreatCircle,
    RhumbLine,
}

// ─── Location ─────────────────────────────────────────────────────────────────

/// A point on the Earth's surface. Degrees north / degrees east.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Initial bearing to `dest` in degrees clockwise from true north, [0, 360).
    pub fn bearing_to(&self, dest: &Location, course: CourseType) -> Result<f64, GeodesyError> {
        if !self.is_valid() || !dest.is_valid() {
            return Err(GeodesyError::InvalidInputs);
        }
        let (phi1, lam1) = (self.lat.to_radians(), self.lon.to_radians());
        let (phi2, lam2) = (dest.lat.to_radians(), dest.lon.to_radians());
        let dlam = wrap_pi(lam2 - lam1);

        let theta = match course {
            CourseType::GreatCircle => {
                let y = dlam.sin() * phi2.cos();
                let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlam.cos();
                y.atan2(x)
            }
            CourseType::RhumbLine => {
                let dpsi = meridian_parts(phi2) - meridian_parts(phi1);
                dlam.atan2(dpsi)
            }
        };
        Ok(fold_deg(theta.to_degrees()))
    }

    /// Distance to `dest` in metres along the given course type.
    pub fn distance_to(&self, dest: &Location, course: CourseType) -> Result<f64, GeodesyError> {
        if !self.is_valid() || !dest.is_valid() {
            return Err(GeodesyError::InvalidInputs);
        }
        let (phi1, lam1) = (self.lat.to_radians(), self.lon.to_radians());
        let (phi2, lam2) = (dest.lat.to_radians(), dest.lon.to_radians());
        let dphi = phi2 - phi1;
        let dlam = wrap_pi(lam2 - lam1);

        let d = match course {
            CourseType::GreatCircle => {
                // Haversine identity on a spherical Earth.
                let a = (dphi / 2.0).sin().powi(2)
                    + phi1.cos() * phi2.cos() * (dlam / 2.0).sin().powi(2);
                2.0 * a.sqrt().min(1.0).asin()
            }
            CourseType::RhumbLine => {
                let dpsi = meridian_parts(phi2) - meridian_parts(phi1);
                // q degenerates to cos(lat) on an east-west course.
                let q = if dpsi.abs() > 1e-12 { dphi / dpsi } else { phi1.cos() };
                (dphi * dphi + q * q * dlam * dlam).sqrt()
            }
        };
        Ok(d * EARTH_RADIUS_M)
    }

    /// Course and distance to `dest` as a vector: polar magnitude is the
    /// distance in metres, polar bearing is degrees clockwise from true north.
    pub fn target(&self, dest: &Location, course: CourseType) -> Result<TwoVector, GeodesyError> {
        let bearing = self.bearing_to(dest, course)?;
        let distance = self.distance_to(dest, course)?;
        Ok(TwoVector::from_bearing_deg(bearing, distance))
    }
}

// ─── Angle helpers ────────────────────────────────────────────────────────────

/// Fold an angle in degrees into [0, 360).
pub fn fold_deg(deg: f64) -> f64 {
    let folded = deg.rem_euclid(360.0);
    if folded == 360.0 { 0.0 } else { folded }
}

/// Fold an angle in degrees into [-180, 180].
pub fn fold_deg_signed(deg: f64) -> f64 {
    let folded = fold_deg(deg);
    if folded > 180.0 { folded - 360.0 } else { folded }
}

/// Wrap a radian longitude difference into (-π, π] so east-west courses take
/// the short way around.
fn wrap_pi(rad: f64) -> f64 {
    let folded = rad.rem_euclid(std::f64::consts::TAU);
    if folded > std::f64::consts::PI { folded - std::f64::consts::TAU } else { folded }
}

/// Mercator meridian parts of a latitude (radians).
fn meridian_parts(phi: f64) -> f64 {
    ((std::f64::consts::FRAC_PI_4 + phi / 2.0).tan()).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEATTLE: Location = Location { lat: 47.560644, lon: -122.338816 };

    #[test]
    fn validity_bounds() {
        assert!(SEATTLE.is_valid());
        assert!(!Location::new(f64::NAN, 0.0).is_valid());
        assert!(!Location::new(90.1, 0.0).is_valid());
        assert!(!Location::new(0.0, -180.1).is_valid());
        assert!(Location::new(-90.0, 180.0).is_valid());
    }

    #[test]
    fn invalid_endpoints_are_rejected() {
        let bad = Location::new(f64::NAN, 0.0);
        assert_eq!(SEATTLE.bearing_to(&bad, CourseType::GreatCircle), Err(GeodesyError::InvalidInputs));
        assert_eq!(bad.distance_to(&SEATTLE, CourseType::RhumbLine), Err(GeodesyError::InvalidInputs));
    }

    #[test]
    fn due_east_on_the_equator() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(0.0, 1.0);
        for course in [CourseType::GreatCircle, CourseType::RhumbLine] {
            let bearing = a.bearing_to(&b, course).unwrap();
            assert!((bearing - 90.0).abs() < 1e-9, "bearing {bearing}");
            let dist = a.distance_to(&b, course).unwrap();
            let expect = EARTH_RADIUS_M * 1.0_f64.to_radians();
            assert!((dist - expect).abs() < 1.0, "dist {dist} vs {expect}");
        }
    }

    #[test]
    fn bearing_range_and_reciprocal() {
        let b = Location::new(47.5, -122.29);
        for course in [CourseType::GreatCircle, CourseType::RhumbLine] {
            let fwd = SEATTLE.bearing_to(&b, course).unwrap();
            let back = b.bearing_to(&SEATTLE, course).unwrap();
            assert!((0.0..360.0).contains(&fwd));
            assert!((0.0..360.0).contains(&back));
            // Short legs: reciprocal within a small residual.
            let diff = fold_deg(back - fwd);
            assert!((diff - 180.0).abs() < 0.1, "diff {diff}");
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let b = Location::new(48.2, -123.0);
        for course in [CourseType::GreatCircle, CourseType::RhumbLine] {
            let ab = SEATTLE.distance_to(&b, course).unwrap();
            let ba = b.distance_to(&SEATTLE, course).unwrap();
            assert!((ab - ba).abs() < 1e-6);
        }
    }

    #[test]
    fn rhumb_crossing_the_antimeridian_takes_the_short_way() {
        let a = Location::new(10.0, 179.5);
        let b = Location::new(10.0, -179.5);
        let d = a.distance_to(&b, CourseType::RhumbLine).unwrap();
        let expect = EARTH_RADIUS_M * 1.0_f64.to_radians() * 10.0_f64.to_radians().cos();
        assert!((d - expect).abs() < 1_000.0, "d {d} expect {expect}");
        let bearing = a.bearing_to(&b, CourseType::RhumbLine).unwrap();
        assert!((bearing - 90.0).abs() < 1e-6);
    }

    #[test]
    fn target_combines_bearing_and_distance() {
        let b = Location::new(47.5, -122.29);
        let v = SEATTLE.target(&b, CourseType::GreatCircle).unwrap();
        assert!((v.mag() - SEATTLE.distance_to(&b, CourseType::GreatCircle).unwrap()).abs() < 1e-6);
        assert!((v.bearing_deg() - SEATTLE.bearing_to(&b, CourseType::GreatCircle).unwrap()).abs() < 1e-6);
    }

    #[test]
    fn antipodal_endpoints_still_answer() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(0.0, 180.0);
        let d = a.distance_to(&b, CourseType::GreatCircle).unwrap();
        assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1.0);
        let bearing = a.bearing_to(&b, CourseType::GreatCircle).unwrap();
        assert!((0.0..360.0).contains(&bearing));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::{fold_deg, fold_deg_signed, Location};
use crate::magvar::{MagModel, MagModelError};

/// A fused attitude sample from the inertial/magnetic sensor.
///
/// `heading` is referenced to magnetic north when `magnetic` is set;
/// `declination` is the cached variation used to convert between magnetic
/// and true headings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub heading: f64,
    pub magnetic: bool,
    pub declination: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self { roll: f64::NAN, pitch: f64::NAN, heading: f64::NAN, magnetic: true, declination: 0.0 }
    }
}

impl Orientation {
    pub fn new(roll: f64, pitch: f64, heading: f64, magnetic: bool) -> Self {
        Self { roll, pitch, heading, magnetic, declination: 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.heading.is_finite()
    }

    /// Fold roll and pitch into [-180, 180] and heading into [0, 360).
    pub fn normalize(mut self) -> Self {
        self.roll = fold_deg_signed(self.roll);
        self.pitch = fold_deg_signed(self.pitch);
        self.heading = fold_deg(self.heading);
        self
    }

    /// Signed error from this heading to `target`, folded into [-180, 180].
    /// Positive means the target lies clockwise of the current heading.
    pub fn heading_error(&self, target: f64) -> f64 {
        fold_deg_signed(target - self.heading)
    }

    /// Convert to a true heading by applying the cached declination.
    pub fn make_true(self) -> Self {
        if !self.magnetic {
            return self;
        }
        Self { heading: self.heading + self.declination, magnetic: false, ..self }.normalize()
    }

    /// Convert to a magnetic heading by removing the cached declination.
    pub fn make_mag(self) -> Self {
        if self.magnetic {
            return self;
        }
        Self { heading: self.heading - self.declination, magnetic: true, ..self }.normalize()
    }

    /// Recompute and cache declination from the model at (location, date).
    /// On failure the cached value is left unchanged.
    pub fn update_declination(
        &mut self,
        model: &MagModel,
        loc: &Location,
        at: DateTime<Utc>,
    ) -> Result<(), MagModelError> {
        self.declination = model.declination(loc, at)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_into_range() {
        let o = Orientation::new(190.0, -200.0, 370.0, true).normalize();
        assert_eq!(o.roll, -170.0);
        assert_eq!(o.pitch, 160.0);
        assert_eq!(o.heading, 10.0);
        assert!((-180.0..=180.0).contains(&o.roll));
        assert!((-180.0..=180.0).contains(&o.pitch));
        assert!((0.0..360.0).contains(&o.heading));
    }

    #[test]
    fn normalize_is_idempotent() {
        let o = Orientation::new(543.0, -361.0, -90.0, true).normalize();
        assert_eq!(o, o.normalize());
    }

    #[test]
    fn heading_error_takes_the_short_way() {
        let o = Orientation::new(0.0, 0.0, 350.0, false);
        assert_eq!(o.heading_error(10.0), 20.0);
        assert_eq!(o.heading_error(170.0), -180.0);
        let east = Orientation::new(0.0, 0.0, 90.0, false);
        assert_eq!(east.heading_error(45.0), -45.0);
    }

    #[test]
    fn mag_true_round_trip() {
        let mut o = Orientation::new(1.0, -2.0, 123.0, true);
        o.declination = 15.6;
        let back = o.make_true().make_mag();
        assert!((back.heading - o.heading).abs() < 1e-9);
        assert!(back.magnetic);
        // Converting in the reference frame we are already in is a no-op.
        assert_eq!(o.make_mag(), o);
    }
}

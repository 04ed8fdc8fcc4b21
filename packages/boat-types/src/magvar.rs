use std::path::Path;

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::location::Location;

#[derive(Debug, Error)]
pub enum MagModelError {
    #[error("failed to read magnetic model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse magnetic model file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("magnetic model evaluated at an invalid location")]
    InvalidLocation,
}

/// Centred-dipole magnetic variation model.
///
/// First-order Gauss coefficients (nT) and their secular variation (nT/yr)
/// around a reference epoch, loaded from a TOML coefficient file. Coarse
/// next to a full spherical-harmonic model, but smooth in both location
/// and date, which is what the helm needs.
#[derive(Debug, Clone, Deserialize)]
pub struct MagModel {
    /// Reference epoch as a decimal year, e.g. 2020.0.
    pub epoch: f64,
    pub g10: f64,
    pub g11: f64,
    pub h11: f64,
    #[serde(default)]
    pub g10_sv: f64,
    #[serde(default)]
    pub g11_sv: f64,
    #[serde(default)]
    pub h11_sv: f64,
}

impl MagModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MagModelError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Declination in degrees (east positive) at the given location and date.
    pub fn declination(&self, loc: &Location, at: DateTime<Utc>) -> Result<f64, MagModelError> {
        if !loc.is_valid() {
            return Err(MagModelError::InvalidLocation);
        }
        let dt = decimal_year(at) - self.epoch;
        let g10 = self.g10 + self.g10_sv * dt;
        let g11 = self.g11 + self.g11_sv * dt;
        let h11 = self.h11 + self.h11_sv * dt;

        let colat = (90.0 - loc.lat).to_radians();
        let lon = loc.lon.to_radians();

        // Surface field of an internal n=1 source.
        let sectoral = g11 * lon.cos() + h11 * lon.sin();
        let north = -g10 * colat.sin() + sectoral * colat.cos();
        let east = g11 * lon.sin() - h11 * lon.cos();

        Ok(east.atan2(north).to_degrees())
    }
}

fn decimal_year(at: DateTime<Utc>) -> f64 {
    at.year() as f64 + (at.ordinal0() as f64) / 365.25
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ais::AisReport;
use crate::location::Location;

/// NMEA fix mode as reported by gpsd.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NmeaMode {
    #[default]
    None,
    NoFix,
    Fix2d,
    Fix3d,
}

impl NmeaMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => NmeaMode::NoFix,
            2 => NmeaMode::Fix2d,
            3 => NmeaMode::Fix3d,
            _ => NmeaMode::None,
        }
    }

    pub fn has_fix(&self) -> bool {
        matches!(self, NmeaMode::Fix2d | NmeaMode::Fix3d)
    }
}

// ─── gpsd stream reports ──────────────────────────────────────────────────────

/// One line of the gpsd NDJSON stream. Only the classes the core consumes
/// deserialize; everything else fails the tag match and is dropped by the
/// reader.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "class")]
pub enum GpsdReport {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "AIS")]
    Ais(AisReport),
}

/// gpsd time-position-velocity report. Every field except `class` is
/// optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TpvReport {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mode: Option<u8>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
    #[serde(default)]
    pub track: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub climb: Option<f64>,
    #[serde(default)]
    pub epx: Option<f64>,
    #[serde(default)]
    pub epy: Option<f64>,
    #[serde(default)]
    pub ept: Option<f64>,
    #[serde(default)]
    pub epd: Option<f64>,
    #[serde(default)]
    pub eps: Option<f64>,
    #[serde(default)]
    pub epv: Option<f64>,
    #[serde(default)]
    pub epc: Option<f64>,
}

// ─── GPS fix ──────────────────────────────────────────────────────────────────

/// A position sample with attached timestamps and error bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsFix {
    /// System time the record was made.
    pub record_time: DateTime<Utc>,
    /// Receiver time of the fix.
    pub gps_time: DateTime<Utc>,
    pub mode: NmeaMode,
    pub fix: Location,
    /// Course over ground, degrees from true north.
    pub track: f64,
    /// Speed over ground, m/s.
    pub speed: f64,
    pub altitude: f64,
    pub climb: f64,
    pub epx: Option<f64>,
    pub epy: Option<f64>,
    pub ept: Option<f64>,
    pub epd: Option<f64>,
    pub eps: Option<f64>,
    pub epv: Option<f64>,
    pub epc: Option<f64>,
    pub device: Option<String>,
    pub fix_valid: bool,
}

impl GpsFix {
    /// Build a fix from a TPV report. `record_time` is the local receipt
    /// time; receiver time falls back to it when the report carries none.
    pub fn from_tpv(tpv: &TpvReport, record_time: DateTime<Utc>) -> Self {
        let mode = NmeaMode::from_code(tpv.mode.unwrap_or(0));
        let fix = Location::new(tpv.lat.unwrap_or(f64::NAN), tpv.lon.unwrap_or(f64::NAN));
        Self {
            record_time,
            gps_time: tpv.time.unwrap_or(record_time),
            mode,
            fix,
            track: tpv.track.unwrap_or(0.0),
            speed: tpv.speed.unwrap_or(0.0),
            altitude: tpv.alt.unwrap_or(0.0),
            climb: tpv.climb.unwrap_or(0.0),
            epx: tpv.epx,
            epy: tpv.epy,
            ept: tpv.ept,
            epd: tpv.epd,
            eps: tpv.eps,
            epv: tpv.epv,
            epc: tpv.epc,
            device: tpv.device.clone(),
            fix_valid: mode.has_fix() && fix.is_valid(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fix_valid
            && self.fix.is_valid()
            && self.speed >= 0.0
            && (-180.0..=360.0).contains(&self.track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TPV_LINE: &str = r#"{"class":"TPV","device":"/dev/ttyS4","time":"2024-05-04T12:00:00.000Z","mode":3,"lat":47.560644,"lon":-122.338816,"alt":2.5,"track":88.2,"speed":1.9,"climb":0.0,"epx":3.2,"epy":4.1,"eps":0.4}"#;

    #[test]
    fn tpv_line_becomes_a_valid_fix() {
        let report: GpsdReport = serde_json::from_str(TPV_LINE).unwrap();
        let GpsdReport::Tpv(tpv) = report else { panic!("expected TPV") };
        let fix = GpsFix::from_tpv(&tpv, Utc::now());
        assert_eq!(fix.mode, NmeaMode::Fix3d);
        assert!(fix.is_valid());
        assert!((fix.fix.lat - 47.560644).abs() < 1e-9);
        assert_eq!(fix.epx, Some(3.2));
        assert_eq!(fix.epc, None);
        assert_eq!(fix.device.as_deref(), Some("/dev/ttyS4"));
    }

    #[test]
    fn tpv_without_position_is_not_a_fix() {
        let tpv: TpvReport = serde_json::from_str(r#"{"mode":1}"#).unwrap();
        let fix = GpsFix::from_tpv(&tpv, Utc::now());
        assert!(!fix.fix_valid);
        assert!(!fix.is_valid());
    }

    #[test]
    fn unknown_classes_fail_the_tag_match() {
        let line = r#"{"class":"SKY","device":"/dev/ttyS4","satellites":[]}"#;
        assert!(serde_json::from_str::<GpsdReport>(line).is_err());
    }

    #[test]
    fn out_of_range_track_invalidates() {
        let tpv: TpvReport =
            serde_json::from_str(r#"{"mode":3,"lat":1.0,"lon":2.0,"track":400.0}"#).unwrap();
        let fix = GpsFix::from_tpv(&tpv, Utc::now());
        assert!(!fix.is_valid());
    }
}

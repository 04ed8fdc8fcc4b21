use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::location::{CourseType, Location};
use crate::twovector::TwoVector;

const KNOT_MPS: f64 = 0.514444;

// ─── Wire enums ───────────────────────────────────────────────────────────────

/// ITU navigational status codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavStatus {
    Engine,
    Anchored,
    NotUnderCommand,
    RestrictedManeuver,
    ConstrainedDraught,
    Moored,
    Aground,
    Fishing,
    Sailing,
    HscNav,
    WigNav,
    AisSart,
    #[default]
    Undefined,
}

impl NavStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => NavStatus::Engine,
            1 => NavStatus::Anchored,
            2 => NavStatus::NotUnderCommand,
            3 => NavStatus::RestrictedManeuver,
            4 => NavStatus::ConstrainedDraught,
            5 => NavStatus::Moored,
            6 => NavStatus::Aground,
            7 => NavStatus::Fishing,
            8 => NavStatus::Sailing,
            9 => NavStatus::HscNav,
            10 => NavStatus::WigNav,
            14 => NavStatus::AisSart,
            _ => NavStatus::Undefined,
        }
    }
}

/// Coarse ship category decoded from the two-digit ITU type code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipType {
    #[default]
    Unavailable,
    Wig,
    Fishing,
    Towing,
    Dredging,
    DivingOps,
    Military,
    Sailing,
    Pleasure,
    HighSpeed,
    Pilot,
    SearchAndRescue,
    Tug,
    PortTender,
    AntiPollution,
    LawEnforcement,
    Medical,
    Passenger,
    Cargo,
    Tanker,
    Other,
}

impl ShipType {
    pub fn from_code(code: u32) -> Self {
        match code {
            20..=24 => ShipType::Wig,
            30 => ShipType::Fishing,
            31 | 32 => ShipType::Towing,
            33 => ShipType::Dredging,
            34 => ShipType::DivingOps,
            35 => ShipType::Military,
            36 => ShipType::Sailing,
            37 => ShipType::Pleasure,
            40..=49 => ShipType::HighSpeed,
            50 => ShipType::Pilot,
            51 => ShipType::SearchAndRescue,
            52 => ShipType::Tug,
            53 => ShipType::PortTender,
            54 => ShipType::AntiPollution,
            55 => ShipType::LawEnforcement,
            58 => ShipType::Medical,
            60..=69 => ShipType::Passenger,
            70..=79 => ShipType::Cargo,
            80..=89 => ShipType::Tanker,
            90..=99 => ShipType::Other,
            _ => ShipType::Unavailable,
        }
    }
}

/// Electronic position-fixing device type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpfdType {
    #[default]
    Undefined,
    Gps,
    Glonass,
    GpsGlonass,
    LoranC,
    Chayka,
    Ins,
    Surveyed,
    Galileo,
}

impl EpfdType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => EpfdType::Gps,
            2 => EpfdType::Glonass,
            3 => EpfdType::GpsGlonass,
            4 => EpfdType::LoranC,
            5 => EpfdType::Chayka,
            6 => EpfdType::Ins,
            7 => EpfdType::Surveyed,
            8 => EpfdType::Galileo,
            _ => EpfdType::Undefined,
        }
    }
}

// ─── gpsd AIS report ──────────────────────────────────────────────────────────

/// gpsd AIS report (scaled mode). Position messages (types 1/2/3/18) carry
/// kinematics; static messages (5/24) carry identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AisReport {
    #[serde(rename = "type", default)]
    pub msg_type: u32,
    pub mmsi: u32,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub status: Option<u32>,
    #[serde(default)]
    pub turn: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub course: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub imo: Option<u32>,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub shipname: Option<String>,
    #[serde(default)]
    pub shiptype: Option<u32>,
    #[serde(default)]
    pub to_bow: Option<u32>,
    #[serde(default)]
    pub to_stern: Option<u32>,
    #[serde(default)]
    pub to_port: Option<u32>,
    #[serde(default)]
    pub to_starboard: Option<u32>,
    #[serde(default)]
    pub epfd: Option<u32>,
}

impl AisReport {
    pub fn is_position_report(&self) -> bool {
        matches!(self.msg_type, 1..=3 | 18)
    }
}

// ─── Contact ──────────────────────────────────────────────────────────────────

/// The tracked picture of one AIS target, keyed by MMSI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AisContact {
    pub mmsi: u32,
    /// When we last heard anything from this target.
    pub last_contact: DateTime<Utc>,
    /// When the position fields were last refreshed.
    pub last_timestamp: DateTime<Utc>,
    pub fix: Location,
    pub device: Option<String>,
    pub ship_type: ShipType,
    pub nav: NavStatus,
    /// Rate of turn, degrees/min.
    pub turn: f64,
    /// Speed over ground, knots.
    pub speed: f64,
    /// Course over ground, degrees true.
    pub course: f64,
    /// True heading, degrees.
    pub heading: f64,
    pub imo: Option<u32>,
    pub callsign: Option<String>,
    pub shipname: Option<String>,
    pub to_bow: u32,
    pub to_stern: u32,
    pub to_port: u32,
    pub to_starboard: u32,
    pub epfd: EpfdType,
}

impl AisContact {
    pub fn new(mmsi: u32, at: DateTime<Utc>) -> Self {
        Self {
            mmsi,
            last_contact: at,
            last_timestamp: at,
            fix: Location::new(f64::NAN, f64::NAN),
            device: None,
            ship_type: ShipType::Unavailable,
            nav: NavStatus::Undefined,
            turn: 0.0,
            speed: 0.0,
            course: 0.0,
            heading: 0.0,
            imo: None,
            callsign: None,
            shipname: None,
            to_bow: 0,
            to_stern: 0,
            to_port: 0,
            to_starboard: 0,
            epfd: EpfdType::Undefined,
        }
    }

    /// Merge one report into the contact. Position reports refresh the
    /// kinematic fields, static reports refresh identity; any report counts
    /// as contact.
    pub fn update_from(&mut self, report: &AisReport, at: DateTime<Utc>) {
        self.last_contact = at;
        if report.device.is_some() {
            self.device = report.device.clone();
        }
        if report.is_position_report() {
            if let (Some(lat), Some(lon)) = (report.lat, report.lon) {
                self.fix = Location::new(lat, lon);
                self.last_timestamp = at;
            }
            if let Some(status) = report.status {
                self.nav = NavStatus::from_code(status);
            }
            if let Some(turn) = report.turn {
                self.turn = turn;
            }
            if let Some(speed) = report.speed {
                self.speed = speed;
            }
            if let Some(course) = report.course {
                self.course = course;
            }
            if let Some(heading) = report.heading {
                self.heading = heading;
            }
        } else {
            if let Some(code) = report.shiptype {
                self.ship_type = ShipType::from_code(code);
            }
            if report.imo.is_some() {
                self.imo = report.imo;
            }
            if report.callsign.is_some() {
                self.callsign = report.callsign.clone();
            }
            if report.shipname.is_some() {
                self.shipname = report.shipname.clone();
            }
            if let Some(v) = report.to_bow {
                self.to_bow = v;
            }
            if let Some(v) = report.to_stern {
                self.to_stern = v;
            }
            if let Some(v) = report.to_port {
                self.to_port = v;
            }
            if let Some(v) = report.to_starboard {
                self.to_starboard = v;
            }
            if let Some(code) = report.epfd {
                self.epfd = EpfdType::from_code(code);
            }
        }
    }

    /// True when the contact is stale or too far from the reference point to
    /// matter. Pure predicate, so a second prune pass at the same (time,
    /// location) removes nothing new.
    pub fn should_prune(
        &self,
        now: DateTime<Utc>,
        reference: Option<&Location>,
        max_age: Duration,
        max_range_m: f64,
    ) -> bool {
        if now - self.last_contact > max_age {
            return true;
        }
        if let Some(here) = reference {
            if let Ok(range) = here.distance_to(&self.fix, CourseType::GreatCircle) {
                return range > max_range_m;
            }
        }
        false
    }

    /// Dead-reckon the contact's position along course/speed to `at`.
    pub fn project(&self, at: DateTime<Utc>) -> Location {
        if !self.fix.is_valid() {
            return self.fix;
        }
        let dt = (at - self.last_timestamp).num_milliseconds() as f64 / 1000.0;
        if dt <= 0.0 || self.speed <= 0.0 {
            return self.fix;
        }
        let run = TwoVector::from_bearing_deg(self.course, self.speed * KNOT_MPS * dt);
        offset(&self.fix, &run)
    }
}

/// Shift a location by a small east/north displacement in metres.
fn offset(from: &Location, by: &TwoVector) -> Location {
    let dlat = (by.y / crate::location::EARTH_RADIUS_M).to_degrees();
    let dlon =
        (by.x / (crate::location::EARTH_RADIUS_M * from.lat.to_radians().cos())).to_degrees();
    Location::new(from.lat + dlat, from.lon + dlon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap()
    }

    fn position_report(mmsi: u32, lat: f64, lon: f64) -> AisReport {
        AisReport {
            msg_type: 1,
            mmsi,
            lat: Some(lat),
            lon: Some(lon),
            status: Some(0),
            speed: Some(8.0),
            course: Some(90.0),
            heading: Some(92.0),
            ..AisReport::default()
        }
    }

    #[test]
    fn position_then_static_builds_a_full_contact() {
        let mut c = AisContact::new(367_123_456, t0());
        c.update_from(&position_report(367_123_456, 47.6, -122.3), t0());
        assert!(c.fix.is_valid());
        assert_eq!(c.nav, NavStatus::Engine);

        let stat = AisReport {
            msg_type: 5,
            mmsi: 367_123_456,
            shipname: Some("WESTERN FLYER".into()),
            shiptype: Some(30),
            epfd: Some(1),
            ..AisReport::default()
        };
        c.update_from(&stat, t0() + Duration::seconds(10));
        assert_eq!(c.shipname.as_deref(), Some("WESTERN FLYER"));
        assert_eq!(c.ship_type, ShipType::Fishing);
        assert_eq!(c.epfd, EpfdType::Gps);
        // Static data must not clobber the position.
        assert!((c.fix.lat - 47.6).abs() < 1e-9);
    }

    #[test]
    fn prune_by_age_and_distance() {
        let here = Location::new(47.6, -122.3);
        let mut near = AisContact::new(1, t0());
        near.update_from(&position_report(1, 47.61, -122.31), t0());
        let mut far = AisContact::new(2, t0());
        far.update_from(&position_report(2, 48.9, -122.3), t0());

        let max_age = Duration::seconds(600);
        let max_range = 18_520.0; // 10 nmi
        let now = t0() + Duration::seconds(30);
        assert!(!near.should_prune(now, Some(&here), max_age, max_range));
        assert!(far.should_prune(now, Some(&here), max_age, max_range));

        let later = t0() + Duration::seconds(700);
        assert!(near.should_prune(later, Some(&here), max_age, max_range));
    }

    #[test]
    fn prune_is_idempotent() {
        let here = Location::new(47.6, -122.3);
        let mut contacts: Vec<AisContact> = (0..4)
            .map(|i| {
                let mut c = AisContact::new(i, t0());
                c.update_from(&position_report(i, 47.6 + i as f64 * 0.5, -122.3), t0());
                c
            })
            .collect();
        let now = t0() + Duration::seconds(30);
        let max_age = Duration::seconds(600);
        let prune =
            |list: &mut Vec<AisContact>| list.retain(|c| !c.should_prune(now, Some(&here), max_age, 18_520.0));
        prune(&mut contacts);
        let after_once = contacts.clone();
        prune(&mut contacts);
        assert_eq!(after_once, contacts);
    }

    #[test]
    fn projection_moves_down_course() {
        let mut c = AisContact::new(9, t0());
        c.update_from(&position_report(9, 0.0, 0.0), t0());
        let p = c.project(t0() + Duration::seconds(60));
        // 8 kn due east for a minute: ~247 m east, no northing.
        assert!(p.lon > 0.0);
        assert!((p.lat).abs() < 1e-9);
        // Stationary contacts stay put.
        c.speed = 0.0;
        assert_eq!(c.project(t0() + Duration::seconds(60)), c.fix);
    }
}

//! Shared domain values for the boat control stack: geodesy primitives,
//! orientation with magnetic variation, GPS fixes and AIS contacts with
//! their gpsd codecs, waypoints, mode identifiers, and the shore command
//! envelope.
//!
//! This crate is pure values and codecs. The only I/O it performs is
//! reading the magnetic-model coefficient file.

pub mod ais;
pub mod command;
pub mod gps;
pub mod location;
pub mod magvar;
pub mod modes;
pub mod orientation;
pub mod twovector;
pub mod waypoint;

pub use ais::{AisContact, EpfdType, NavStatus, ShipType};
pub use command::CommandMsg;
pub use gps::{GpsFix, GpsdReport, NmeaMode, TpvReport};
pub use location::{CourseType, GeodesyError, Location, EARTH_RADIUS_M};
pub use magvar::{MagModel, MagModelError};
pub use modes::{AutoModeId, BoatModeId, NavModeId, RcModeId};
pub use orientation::Orientation;
pub use twovector::TwoVector;
pub use waypoint::{Waypoint, WaypointAction};

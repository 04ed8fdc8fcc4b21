use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use boat_types::{
    AisContact, AutoModeId, BoatModeId, CommandMsg, GpsFix, Location, NavModeId, Orientation,
    RcModeId, Waypoint,
};

use crate::actuators::Actuators;
use crate::config::Config;
use crate::helm::Gains;

// ─── Faults ───────────────────────────────────────────────────────────────────

/// Abnormal-condition markers carried on the boat state. Identifier strings
/// are part of the telemetry surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fault {
    NoGnss,
    NoShore,
    NoTelemetry,
    NoRc,
    LowBattery,
    Imu,
    Disarm,
    Hardware,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::NoGnss => "No GNSS",
            Fault::NoShore => "No Shore",
            Fault::NoTelemetry => "No Telemetry",
            Fault::NoRc => "No RC",
            Fault::LowBattery => "Low Battery",
            Fault::Imu => "IMU",
            Fault::Disarm => "Disarm",
            Fault::Hardware => "Hardware",
        }
    }
}

// ─── Snapshots ────────────────────────────────────────────────────────────────

/// A sensor reading stamped with its publication instant.
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub value: T,
    pub at: Instant,
}

impl<T> Stamped<T> {
    pub fn new(value: T) -> Self {
        Self { value, at: Instant::now() }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.at)
    }
}

/// One sensor's slot in the shared state. The producing input task
/// publishes under a bounded wait; the control task samples with a
/// try-lock and keeps its previous copy when the lock is contended.
pub struct InputCell<T> {
    inner: Arc<RwLock<Option<Stamped<T>>>>,
}

impl<T> Clone for InputCell<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Default for InputCell<T> {
    fn default() -> Self {
        Self { inner: Arc::new(RwLock::new(None)) }
    }
}

impl<T: Clone> InputCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a fresh snapshot. Returns false when the lock could not be
    /// taken within `max_wait`; the beat is dropped, not queued.
    pub async fn publish(&self, value: T, max_wait: Duration) -> bool {
        match tokio::time::timeout(max_wait, self.inner.write()).await {
            Ok(mut slot) => {
                *slot = Some(Stamped::new(value));
                true
            }
            Err(_) => {
                debug!("snapshot publish missed its lock window");
                false
            }
        }
    }

    /// Non-blocking read. None on contention or before the first publish;
    /// the caller falls back to its previous copy.
    pub fn sample(&self) -> Option<Stamped<T>> {
        self.inner.try_read().ok().and_then(|slot| slot.clone())
    }
}

// ─── RC frame & arm edges ─────────────────────────────────────────────────────

/// One frame from the RC receiver, scaled by the driver: sticks in
/// [-1, 1], course target in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RcFrame {
    pub throttle: f64,
    pub rudder: f64,
    pub course: f64,
    pub mode_select: RcModeId,
    pub arm_switch: bool,
    pub disarm_switch: bool,
}

/// Cumulative dwell-qualified button edges published by the RC input. The
/// control task diffs successive samples to recover per-tick edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmCounters {
    pub arm: u64,
    pub disarm: u64,
}

/// Edges observed since the previous control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmEdges {
    pub arm: bool,
    pub disarm: bool,
}

/// A dodge influence: something to steer away from or toward, expressed as
/// a polar vector mixed into the autonomous helm setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Influence {
    pub bearing: f64,
    pub strength: f64,
}

pub type AnalogMap = HashMap<String, f64>;

// ─── BoatState ────────────────────────────────────────────────────────────────

/// The process-wide control context. Owned by the scheduler; mode objects
/// borrow it for the duration of a tick. Mode identifiers here mirror the
/// live mode objects for telemetry and command gating.
pub struct BoatState {
    pub cfg: Arc<Config>,

    pub boat_mode: BoatModeId,
    pub nav_mode: NavModeId,
    pub auto_mode: AutoModeId,
    pub rc_mode: RcModeId,
    /// Boat mode before the current one; SELFTEST uses it to resume a
    /// mission after a restart.
    pub last_boat_mode: BoatModeId,

    /// Mode requests from shore, consumed by the mode machines. RC
    /// sub-modes have no shore path; the transmitter's mode-select
    /// channel drives them.
    pub commanded_mode: Option<BoatModeId>,
    pub commanded_nav: Option<NavModeId>,
    pub commanded_auto: Option<AutoModeId>,

    faults: BTreeSet<Fault>,

    pub last_fix: Option<Stamped<GpsFix>>,
    pub last_orientation: Option<Stamped<Orientation>>,
    pub last_rc: Option<Stamped<RcFrame>>,
    pub analog: Option<Stamped<AnalogMap>>,
    pub ais: Option<Stamped<HashMap<u32, AisContact>>>,
    pub arm_edges: ArmEdges,
    pub last_shore: Option<Instant>,
    pub telemetry_ok: bool,

    pub waypoints: Vec<Waypoint>,
    pub next_waypoint: usize,
    pub launch_point: Option<Location>,
    pub anchor_point: Option<Location>,
    pub gains: Gains,
    pub declination: f64,
    pub influences: Vec<Influence>,

    /// Recorded track for the path dump, bounded by config.
    pub track: Vec<(DateTime<Utc>, Location)>,
    /// Extra one-shot telemetry topics queued by command handlers.
    pub outbox: Vec<(&'static str, String)>,
    /// Diagnostic dump files queued by command handlers; the scheduler
    /// writes them off the control thread.
    pub dumps: Vec<(std::path::PathBuf, String)>,

    pub actuators: Actuators,
    pub(crate) pending: VecDeque<CommandMsg>,
}

impl BoatState {
    pub fn new(cfg: Arc<Config>, actuators: Actuators) -> Self {
        let gains = Gains { kp: cfg.helm.kp, ki: cfg.helm.ki, kd: cfg.helm.kd };
        Self {
            cfg,
            boat_mode: BoatModeId::Start,
            nav_mode: NavModeId::None,
            auto_mode: AutoModeId::None,
            rc_mode: RcModeId::None,
            last_boat_mode: BoatModeId::None,
            commanded_mode: None,
            commanded_nav: None,
            commanded_auto: None,
            faults: BTreeSet::new(),
            last_fix: None,
            last_orientation: None,
            last_rc: None,
            analog: None,
            ais: None,
            arm_edges: ArmEdges::default(),
            last_shore: None,
            telemetry_ok: true,
            waypoints: Vec::new(),
            next_waypoint: 0,
            launch_point: None,
            anchor_point: None,
            gains,
            declination: 0.0,
            influences: Vec::new(),
            track: Vec::new(),
            outbox: Vec::new(),
            dumps: Vec::new(),
            actuators,
            pending: VecDeque::new(),
        }
    }

    // ── Faults ──

    pub fn insert_fault(&mut self, fault: Fault) -> bool {
        self.faults.insert(fault)
    }

    pub fn remove_fault(&mut self, fault: Fault) -> bool {
        self.faults.remove(&fault)
    }

    pub fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    pub fn fault_count(&self) -> usize {
        self.faults.len()
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    pub fn fault_string(&self) -> String {
        self.faults.iter().map(Fault::as_str).collect::<Vec<_>>().join(":")
    }

    pub fn faults(&self) -> impl Iterator<Item = Fault> + '_ {
        self.faults.iter().copied()
    }

    /// Track a stale/fresh input: stale inserts, fresh removes.
    pub fn set_fault(&mut self, fault: Fault, present: bool) {
        if present {
            self.faults.insert(fault);
        } else {
            self.faults.remove(&fault);
        }
    }

    // ── Command FIFO ──

    pub fn push_cmd(&mut self, cmd: CommandMsg) {
        self.pending.push_back(cmd);
    }

    pub fn command_cnt(&self) -> usize {
        self.pending.len()
    }

    // ── Freshness ──

    pub fn gps_fresh(&self, now: Instant) -> bool {
        self.last_fix
            .as_ref()
            .is_some_and(|s| s.value.is_valid() && s.age(now) <= self.cfg.timeouts.gps_fresh())
    }

    pub fn imu_fresh(&self, now: Instant) -> bool {
        self.last_orientation
            .as_ref()
            .is_some_and(|s| s.value.is_valid() && s.age(now) <= self.cfg.timeouts.imu_fresh())
    }

    pub fn rc_fresh(&self, now: Instant) -> bool {
        self.last_rc.as_ref().is_some_and(|s| s.age(now) <= self.cfg.timeouts.rc_fresh())
    }

    pub fn shore_fresh(&self, now: Instant) -> bool {
        self.last_shore
            .is_some_and(|t| now.saturating_duration_since(t) <= self.cfg.timeouts.shore())
    }

    /// Battery voltage from the configured analog channel.
    pub fn battery_volts(&self) -> Option<f64> {
        self.analog.as_ref().and_then(|s| s.value.get(&self.cfg.battery.channel).copied())
    }

    pub fn battery_low(&self) -> bool {
        self.battery_volts().is_some_and(|v| v < self.cfg.battery.low_volts)
    }

    /// Current fix location, if there is a valid one.
    pub fn here(&self) -> Option<Location> {
        self.last_fix.as_ref().filter(|s| s.value.is_valid()).map(|s| s.value.fix)
    }

    /// True heading from the latest orientation sample, with the cached
    /// declination applied.
    pub fn true_heading(&self) -> Option<f64> {
        self.last_orientation.as_ref().map(|s| {
            let mut o = s.value;
            o.declination = self.declination;
            o.make_true().heading
        })
    }

    /// Queue a dodge influence for this tick's setpoint computation.
    pub fn push_influence(&mut self, bearing: f64, strength: f64) {
        self.influences.push(Influence { bearing, strength });
    }
}

#[cfg(test)]
pub mod testutil {
    use super::*;
    use crate::actuators::{Actuators, SimBank, SimServo};

    /// A BoatState over simulated actuators, for mode and command tests.
    pub fn state() -> BoatState {
        state_with(Config::default())
    }

    pub fn state_with(cfg: Config) -> BoatState {
        let cfg = Arc::new(cfg);
        let actuators =
            Actuators::new(Box::new(SimBank::default()), Box::new(SimServo::default()), &cfg);
        BoatState::new(cfg, actuators)
    }

    pub fn fix_at(lat: f64, lon: f64) -> GpsFix {
        let tpv = boat_types::TpvReport {
            mode: Some(3),
            lat: Some(lat),
            lon: Some(lon),
            speed: Some(1.5),
            track: Some(45.0),
            ..Default::default()
        };
        GpsFix::from_tpv(&tpv, Utc::now())
    }

    pub fn orientation(heading: f64) -> Orientation {
        Orientation::new(0.0, 0.0, heading, true).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn faults_are_a_set() {
        let mut s = testutil::state();
        assert!(s.insert_fault(Fault::NoGnss));
        assert!(!s.insert_fault(Fault::NoGnss));
        s.insert_fault(Fault::LowBattery);
        assert_eq!(s.fault_count(), 2);
        assert_eq!(s.fault_string(), "No GNSS:Low Battery");
        assert!(s.remove_fault(Fault::NoGnss));
        assert!(!s.remove_fault(Fault::NoGnss));
        s.clear_faults();
        assert_eq!(s.fault_count(), 0);
    }

    #[test]
    fn command_fifo_counts() {
        let mut s = testutil::state();
        s.push_cmd(CommandMsg::new("FetchWaypoints", json!(null)));
        s.push_cmd(CommandMsg::new("SetWaypoint", json!({"index": 1})));
        assert_eq!(s.command_cnt(), 2);
    }

    #[test]
    fn freshness_windows() {
        let mut s = testutil::state();
        let now = Instant::now();
        assert!(!s.gps_fresh(now));
        s.last_fix = Some(Stamped::new(testutil::fix_at(47.5, -122.3)));
        assert!(s.gps_fresh(now + Duration::from_secs(1)));
        assert!(!s.gps_fresh(now + Duration::from_secs(10)));
    }

    #[test]
    fn battery_reads_the_configured_channel() {
        let mut s = testutil::state();
        assert!(!s.battery_low());
        let mut map = AnalogMap::new();
        map.insert("battery_mon".into(), 11.2);
        map.insert("mot_v".into(), 24.1);
        s.analog = Some(Stamped::new(map));
        assert_eq!(s.battery_volts(), Some(11.2));
        assert!(s.battery_low());
    }

    #[tokio::test]
    async fn input_cell_publish_and_sample() {
        let cell: InputCell<u32> = InputCell::new();
        assert!(cell.sample().is_none());
        assert!(cell.publish(7, Duration::from_millis(5)).await);
        assert_eq!(cell.sample().unwrap().value, 7);
    }

    #[tokio::test]
    async fn contended_cell_falls_back() {
        let cell: InputCell<u32> = InputCell::new();
        cell.publish(1, Duration::from_millis(5)).await;
        let guard = cell.inner.write().await;
        // Writer holds the lock: the control side sees nothing and keeps
        // its previous copy; the producer's bounded wait expires.
        assert!(cell.sample().is_none());
        assert!(!cell.publish(2, Duration::from_millis(2)).await);
        drop(guard);
        assert_eq!(cell.sample().unwrap().value, 1);
    }
}

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("relay {relay} driver fault: {detail}")]
    Relay { relay: &'static str, detail: String },
}

/// The output relay bank. One entry per physical relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relay {
    Red,
    White,
    Yellow,
    RedWht,
    YlwWht,
    Dir,
    Disarm,
    Horn,
    Enable,
}

impl Relay {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relay::Red => "RED",
            Relay::White => "WHITE",
            Relay::Yellow => "YELLOW",
            Relay::RedWht => "REDWHT",
            Relay::YlwWht => "YLWWHT",
            Relay::Dir => "DIR",
            Relay::Disarm => "DISARM",
            Relay::Horn => "HORN",
            Relay::Enable => "ENABLE",
        }
    }
}

const THROTTLE_RELAYS: [Relay; 6] =
    [Relay::Red, Relay::White, Relay::Yellow, Relay::RedWht, Relay::YlwWht, Relay::Dir];

// ─── Driver seams ─────────────────────────────────────────────────────────────

/// Relay driver seam. The GPIO implementation lives outside the core; the
/// simulated bank below stands in for it on the bench.
pub trait SwitchBank: Send {
    fn set(&mut self, relay: Relay, closed: bool) -> Result<(), HardwareError>;
}

/// Rudder servo driver seam. Writes are idempotent at the hardware layer
/// and cannot fail.
pub trait RudderServo: Send {
    fn write_deg(&mut self, deg: f64);
}

/// Records relay states and logs transitions.
#[derive(Default)]
pub struct SimBank {
    closed: BTreeSet<Relay>,
}

impl SwitchBank for SimBank {
    fn set(&mut self, relay: Relay, closed: bool) -> Result<(), HardwareError> {
        let was = self.closed.contains(&relay);
        if was != closed {
            debug!(relay = relay.as_str(), closed, "relay");
        }
        if closed {
            self.closed.insert(relay);
        } else {
            self.closed.remove(&relay);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SimServo {
    pub last_deg: f64,
}

impl RudderServo for SimServo {
    fn write_deg(&mut self, deg: f64) {
        self.last_deg = deg;
    }
}

// ─── Wrappers ─────────────────────────────────────────────────────────────────

/// All actuator outputs, commanded only from the control task.
pub struct Actuators {
    bank: Box<dyn SwitchBank>,
    servo: Box<dyn RudderServo>,
    rudder_min: f64,
    rudder_max: f64,
    throttle_min: i8,
    throttle_max: i8,
    reverse_dwell: Duration,
    disarm_pulse: Duration,
    rudder_pos: Option<f64>,
    throttle_level: i8,
    /// Sign of the throttle the last time it ran; 0 until the first run.
    last_run_sign: i8,
    zero_since: Option<Instant>,
    servo_enabled: bool,
}

impl Actuators {
    pub fn new(bank: Box<dyn SwitchBank>, servo: Box<dyn RudderServo>, cfg: &Config) -> Self {
        Self {
            bank,
            servo,
            rudder_min: cfg.helm.rudder_min,
            rudder_max: cfg.helm.rudder_max,
            throttle_min: cfg.throttle.min,
            throttle_max: cfg.throttle.max,
            reverse_dwell: cfg.throttle.reverse_dwell(),
            disarm_pulse: cfg.timeouts.disarm_pulse(),
            rudder_pos: None,
            throttle_level: 0,
            last_run_sign: 0,
            zero_since: None,
            servo_enabled: false,
        }
    }

    /// Clamp and command the rudder. Repeated writes of the same position
    /// are de-duplicated.
    pub fn write_rudder(&mut self, deg: f64) {
        let clamped = deg.clamp(self.rudder_min, self.rudder_max);
        if self.rudder_pos != Some(clamped) {
            self.servo.write_deg(clamped);
            self.rudder_pos = Some(clamped);
        }
    }

    pub fn rudder_position(&self) -> f64 {
        self.rudder_pos.unwrap_or(0.0)
    }

    /// Command a throttle level. A sign reversal holds at zero for the
    /// configured dwell before the opposite relay set closes; the applied
    /// level is returned.
    pub fn set_throttle(&mut self, level: i8, now: Instant) -> Result<i8, HardwareError> {
        let wanted = level.clamp(self.throttle_min, self.throttle_max);
        let reversing = wanted != 0
            && self.throttle_level != 0
            && (wanted < 0) != (self.throttle_level < 0);
        let dwelling = wanted != 0
            && self.throttle_level == 0
            && self
                .zero_since
                .is_some_and(|t| now.duration_since(t) < self.reverse_dwell)
            && self.wanted_after_dwell(wanted);

        let applied = if reversing || dwelling { 0 } else { wanted };
        self.apply_throttle(applied, now)?;
        Ok(applied)
    }

    // A dwell only binds a command that flips the sign we last ran at.
    fn wanted_after_dwell(&self, wanted: i8) -> bool {
        self.last_run_sign != 0 && (wanted < 0) != (self.last_run_sign < 0)
    }

    fn apply_throttle(&mut self, level: i8, now: Instant) -> Result<(), HardwareError> {
        if level == self.throttle_level {
            if level == 0 && self.zero_since.is_none() {
                self.zero_since = Some(now);
            }
            return Ok(());
        }
        if self.throttle_level != 0 && level == 0 {
            self.last_run_sign = if self.throttle_level < 0 { -1 } else { 1 };
        }
        for relay in THROTTLE_RELAYS {
            self.bank.set(relay, false)?;
        }
        let magnitude_relay = match level.unsigned_abs() {
            0 => None,
            1 => Some(Relay::Red),
            2 => Some(Relay::White),
            3 => Some(Relay::Yellow),
            4 => Some(Relay::RedWht),
            _ => Some(Relay::YlwWht),
        };
        if let Some(relay) = magnitude_relay {
            self.bank.set(relay, true)?;
            if level < 0 {
                self.bank.set(Relay::Dir, true)?;
            }
            self.zero_since = None;
        } else {
            self.zero_since = Some(now);
        }
        self.throttle_level = level;
        Ok(())
    }

    pub fn throttle(&self) -> i8 {
        self.throttle_level
    }

    /// The servo-power relay must be closed before the rudder will move.
    pub fn servo_enable(&mut self, on: bool) -> Result<(), HardwareError> {
        if self.servo_enabled != on {
            self.bank.set(Relay::Enable, on)?;
            self.servo_enabled = on;
        }
        Ok(())
    }

    pub fn servo_enabled(&self) -> bool {
        self.servo_enabled
    }

    pub fn horn(&mut self, on: bool) -> Result<(), HardwareError> {
        self.bank.set(Relay::Horn, on)
    }

    /// Assert mechanical disarm: close the disarm relay for the configured
    /// pulse length, then release it.
    pub async fn pulse_disarm(&mut self) -> Result<(), HardwareError> {
        self.bank.set(Relay::Disarm, true)?;
        tokio::time::sleep(self.disarm_pulse).await;
        self.bank.set(Relay::Disarm, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::{Arc, Mutex};

    /// Records every switch operation for assertions.
    #[derive(Clone, Default)]
    pub struct MockBank {
        pub ops: Arc<Mutex<Vec<(Relay, bool)>>>,
        pub closed: Arc<Mutex<BTreeSet<Relay>>>,
    }

    impl SwitchBank for MockBank {
        fn set(&mut self, relay: Relay, closed: bool) -> Result<(), HardwareError> {
            self.ops.lock().unwrap().push((relay, closed));
            let mut set = self.closed.lock().unwrap();
            if closed {
                set.insert(relay);
            } else {
                set.remove(&relay);
            }
            Ok(())
        }
    }

    fn actuators() -> (Actuators, MockBank) {
        let bank = MockBank::default();
        let act = Actuators::new(Box::new(bank.clone()), Box::new(SimServo::default()), &Config::default());
        (act, bank)
    }

    #[test]
    fn rudder_clamps_and_dedupes() {
        let (mut act, _) = actuators();
        act.write_rudder(45.0);
        assert_eq!(act.rudder_position(), 30.0);
        act.write_rudder(-90.0);
        assert_eq!(act.rudder_position(), -30.0);
    }

    #[test]
    fn throttle_level_maps_to_relays() {
        let (mut act, bank) = actuators();
        let now = Instant::now();
        assert_eq!(act.set_throttle(3, now).unwrap(), 3);
        assert!(bank.closed.lock().unwrap().contains(&Relay::Yellow));
        assert!(!bank.closed.lock().unwrap().contains(&Relay::Dir));

        assert_eq!(act.set_throttle(0, now).unwrap(), 0);
        assert!(bank.closed.lock().unwrap().is_empty());

        // Too-large commands clamp to the band.
        assert_eq!(
            act.set_throttle(9, now + Duration::from_millis(100)).unwrap(),
            5
        );
        assert!(bank.closed.lock().unwrap().contains(&Relay::YlwWht));
    }

    #[test]
    fn reversal_dwells_at_zero() {
        let (mut act, bank) = actuators();
        let t0 = Instant::now();
        act.set_throttle(2, t0).unwrap();
        // Direct reversal is forced through zero.
        assert_eq!(act.set_throttle(-2, t0 + Duration::from_millis(10)).unwrap(), 0);
        // Still inside the dwell: stays at zero.
        assert_eq!(act.set_throttle(-2, t0 + Duration::from_millis(30)).unwrap(), 0);
        // After the dwell the reverse set closes, DIR included.
        assert_eq!(act.set_throttle(-2, t0 + Duration::from_millis(120)).unwrap(), -2);
        let closed = bank.closed.lock().unwrap();
        assert!(closed.contains(&Relay::White));
        assert!(closed.contains(&Relay::Dir));
    }

    #[test]
    fn same_sign_restart_skips_the_dwell() {
        let (mut act, _) = actuators();
        let t0 = Instant::now();
        act.set_throttle(2, t0).unwrap();
        act.set_throttle(0, t0 + Duration::from_millis(10)).unwrap();
        // Re-engaging forward inside the dwell window is allowed.
        assert_eq!(act.set_throttle(3, t0 + Duration::from_millis(20)).unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_pulse_closes_then_opens() {
        let (mut act, bank) = actuators();
        act.pulse_disarm().await.unwrap();
        let ops = bank.ops.lock().unwrap();
        assert_eq!(
            ops.as_slice(),
            &[(Relay::Disarm, true), (Relay::Disarm, false)]
        );
    }
}

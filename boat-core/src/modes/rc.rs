use std::time::Instant;

use boat_types::RcModeId;

use super::note_hw;
use crate::helm::Helm;
use crate::state::{BoatState, RcFrame};

/// Manual-control sub-modes. RUDDER drives the servo straight from the
/// stick; COURSE closes the helm loop on a stick-selected heading.
pub enum RcMode {
    Idle,
    Rudder,
    Course { helm: Helm },
    Failsafe,
}

impl RcMode {
    pub fn enter(id: RcModeId, state: &mut BoatState) -> RcMode {
        let mode = match id {
            RcModeId::Rudder => RcMode::Rudder,
            RcModeId::Course => RcMode::Course { helm: new_helm(state) },
            RcModeId::Failsafe => RcMode::Failsafe,
            _ => RcMode::Idle,
        };
        state.rc_mode = mode.id();
        mode
    }

    pub fn id(&self) -> RcModeId {
        match self {
            RcMode::Idle => RcModeId::Idle,
            RcMode::Rudder => RcModeId::Rudder,
            RcMode::Course { .. } => RcModeId::Course,
            RcMode::Failsafe => RcModeId::Failsafe,
        }
    }

    pub fn tick(&mut self, state: &mut BoatState, now: Instant) -> Option<RcModeId> {
        match self {
            RcMode::Idle => {
                let r = state.actuators.set_throttle(0, now);
                note_hw(state, r);
                state.actuators.write_rudder(0.0);
                let r = state.actuators.servo_enable(false);
                note_hw(state, r);
                if !state.rc_fresh(now) {
                    return Some(RcModeId::Failsafe);
                }
                selected_drive_mode(state).filter(|m| *m != RcModeId::Idle)
            }
            RcMode::Rudder => {
                if !state.rc_fresh(now) {
                    return Some(RcModeId::Failsafe);
                }
                let frame = current_frame(state);
                let r = state.actuators.servo_enable(true);
                note_hw(state, r);
                state.actuators.write_rudder(frame.rudder * state.cfg.nav.rc_rudder_scale);
                let level = stick_throttle(state, frame.throttle);
                let r = state.actuators.set_throttle(level, now);
                note_hw(state, r);
                selected_drive_mode(state).filter(|m| *m != RcModeId::Rudder)
            }
            RcMode::Course { helm } => {
                if !state.rc_fresh(now) {
                    return Some(RcModeId::Failsafe);
                }
                let frame = current_frame(state);
                helm.set_gains(state.gains);
                let r = state.actuators.servo_enable(true);
                note_hw(state, r);
                if let Some(heading) = state.true_heading() {
                    let error = boat_types::location::fold_deg_signed(frame.course - heading);
                    let rudder = helm.update(error, now);
                    state.actuators.write_rudder(rudder);
                }
                let level = stick_throttle(state, frame.throttle);
                let r = state.actuators.set_throttle(level, now);
                note_hw(state, r);
                selected_drive_mode(state).filter(|m| *m != RcModeId::Course)
            }
            RcMode::Failsafe => {
                let r = state.actuators.set_throttle(0, now);
                note_hw(state, r);
                state.actuators.write_rudder(0.0);
                // Held until a fresh RC frame is seen; GPS is not consulted.
                if state.rc_fresh(now) {
                    return Some(RcModeId::Idle);
                }
                None
            }
        }
    }
}

fn new_helm(state: &BoatState) -> Helm {
    Helm::new(
        state.gains,
        state.cfg.helm.rudder_min,
        state.cfg.helm.rudder_max,
        state.cfg.control.frame_len(),
    )
}

fn current_frame(state: &BoatState) -> RcFrame {
    state.last_rc.as_ref().map(|s| s.value).unwrap_or_default()
}

/// Drive mode requested by the transmitter's mode-select channel.
fn selected_drive_mode(state: &BoatState) -> Option<RcModeId> {
    state
        .last_rc
        .as_ref()
        .map(|s| s.value.mode_select)
        .filter(|m| matches!(m, RcModeId::Rudder | RcModeId::Course))
}

fn stick_throttle(state: &BoatState, stick: f64) -> i8 {
    (stick * state.cfg.throttle.max as f64).round() as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{testutil, Stamped};
    use std::time::Duration;

    fn rc_frame(throttle: f64, rudder: f64, mode: RcModeId) -> RcFrame {
        RcFrame { throttle, rudder, mode_select: mode, ..Default::default() }
    }

    #[test]
    fn rudder_mode_maps_sticks_to_actuators() {
        let mut state = testutil::state();
        let now = Instant::now();
        state.last_rc = Some(Stamped::new(rc_frame(0.3, 0.1, RcModeId::Rudder)));
        let mut mode = RcMode::enter(RcModeId::Rudder, &mut state);

        assert_eq!(mode.tick(&mut state, now), None);
        assert!((state.actuators.rudder_position() - 3.0).abs() < 1e-9);
        assert_eq!(state.actuators.throttle(), 2); // round(5 * 0.3)
        assert!(state.actuators.servo_enabled());
    }

    #[test]
    fn stale_rc_drops_into_failsafe_and_recovers() {
        let mut state = testutil::state();
        let t0 = Instant::now();
        state.last_rc = Some(Stamped::new(rc_frame(0.5, 0.0, RcModeId::Rudder)));
        let mut mode = RcMode::enter(RcModeId::Rudder, &mut state);
        mode.tick(&mut state, t0);
        assert_eq!(state.actuators.throttle(), 3);

        // Frame ages past the sense timeout.
        let later = t0 + Duration::from_secs(2);
        assert_eq!(mode.tick(&mut state, later), Some(RcModeId::Failsafe));
        let mut mode = RcMode::enter(RcModeId::Failsafe, &mut state);
        assert_eq!(mode.tick(&mut state, later), None);
        assert_eq!(state.actuators.throttle(), 0);
        assert_eq!(state.actuators.rudder_position(), 0.0);

        // A fresh frame alone re-enters IDLE.
        state.last_rc = Some(Stamped { value: rc_frame(0.0, 0.0, RcModeId::Idle), at: later });
        assert_eq!(mode.tick(&mut state, later), Some(RcModeId::Idle));
    }

    #[test]
    fn mode_select_switches_submodes() {
        let mut state = testutil::state();
        let now = Instant::now();
        state.last_rc = Some(Stamped::new(rc_frame(0.0, 0.0, RcModeId::Course)));
        let mut mode = RcMode::enter(RcModeId::Idle, &mut state);
        assert_eq!(mode.tick(&mut state, now), Some(RcModeId::Course));
    }

    #[test]
    fn course_mode_steers_toward_the_stick_heading() {
        let mut state = testutil::state();
        let now = Instant::now();
        let mut frame = rc_frame(0.2, 0.0, RcModeId::Course);
        frame.course = 45.0;
        state.last_rc = Some(Stamped::new(frame));
        state.last_orientation = Some(Stamped::new(testutil::orientation(0.0)));
        let mut mode = RcMode::enter(RcModeId::Course, &mut state);
        assert_eq!(mode.tick(&mut state, now), None);
        assert!(state.actuators.rudder_position() > 0.0);
        assert_eq!(state.actuators.throttle(), 1);
    }
}

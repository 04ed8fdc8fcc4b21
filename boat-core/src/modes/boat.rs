use std::time::Instant;

use tracing::{info, warn};

use boat_types::{AutoModeId, BoatModeId, NavModeId, RcModeId};

use super::{note_hw, NavMode};
use crate::state::{BoatState, Fault};

/// Top-level boat state machine. Armed variants own the navigation layer;
/// everything else holds the drive train safe. Transitions are requested
/// by `tick` and applied by the scheduler through `enter`, always on the
/// control task.
pub enum BoatMode {
    Start,
    SelfTest { entered: Instant },
    Disarmed,
    Fault { pulsed: bool },
    Armed { nav: NavMode },
    Manual { nav: NavMode },
    Waypoint { nav: NavMode },
    NoSignal { nav: NavMode, resume: BoatModeId },
    Return { nav: NavMode },
    ArmedTest,
}

impl BoatMode {
    /// Factory for a mode id. Records the outgoing mode so SELFTEST can
    /// resume an interrupted mission, then builds the new variant and its
    /// sub-mode chain.
    pub fn enter(id: BoatModeId, state: &mut BoatState, now: Instant) -> BoatMode {
        let prev = state.boat_mode;
        state.last_boat_mode = prev;
        state.boat_mode = id;
        info!(from = %prev, to = %id, "boat mode");

        let clear_nav = |state: &mut BoatState| {
            state.nav_mode = NavModeId::None;
            state.auto_mode = AutoModeId::None;
            state.rc_mode = RcModeId::None;
        };

        match id {
            BoatModeId::SelfTest => {
                clear_nav(state);
                BoatMode::SelfTest { entered: now }
            }
            BoatModeId::Disarmed => {
                clear_nav(state);
                BoatMode::Disarmed
            }
            BoatModeId::Fault => {
                clear_nav(state);
                BoatMode::Fault { pulsed: false }
            }
            BoatModeId::Armed => {
                // First arming fixes the launch point for RETURN.
                if state.launch_point.is_none() {
                    state.launch_point = state.here();
                }
                BoatMode::Armed { nav: NavMode::enter(NavModeId::Idle, state) }
            }
            BoatModeId::Manual => {
                BoatMode::Manual { nav: NavMode::enter_rc(state, RcModeId::Rudder) }
            }
            BoatModeId::Waypoint => {
                BoatMode::Waypoint { nav: NavMode::enter_auto(state, AutoModeId::Waypoint) }
            }
            BoatModeId::Return => {
                BoatMode::Return { nav: NavMode::enter_auto(state, AutoModeId::Return) }
            }
            BoatModeId::NoSignal => {
                // Remember what to restore once the lost link returns.
                let resume = match prev {
                    BoatModeId::Manual
                    | BoatModeId::Waypoint
                    | BoatModeId::Return
                    | BoatModeId::Armed => prev,
                    _ => BoatModeId::Disarmed,
                };
                BoatMode::NoSignal { nav: NavMode::enter_auto(state, AutoModeId::Return), resume }
            }
            BoatModeId::ArmedTest => {
                clear_nav(state);
                BoatMode::ArmedTest
            }
            _ => {
                clear_nav(state);
                BoatMode::Start
            }
        }
    }

    pub fn id(&self) -> BoatModeId {
        match self {
            BoatMode::Start => BoatModeId::Start,
            BoatMode::SelfTest { .. } => BoatModeId::SelfTest,
            BoatMode::Disarmed => BoatModeId::Disarmed,
            BoatMode::Fault { .. } => BoatModeId::Fault,
            BoatMode::Armed { .. } => BoatModeId::Armed,
            BoatMode::Manual { .. } => BoatModeId::Manual,
            BoatMode::Waypoint { .. } => BoatModeId::Waypoint,
            BoatMode::NoSignal { .. } => BoatModeId::NoSignal,
            BoatMode::Return { .. } => BoatModeId::Return,
            BoatMode::ArmedTest => BoatModeId::ArmedTest,
        }
    }

    /// One control frame. Returns the successor mode id when a transition
    /// is due; the transition function is total — every abnormal path has
    /// a successor, with FAULT as the sink.
    pub async fn tick(&mut self, state: &mut BoatState, now: Instant) -> Option<BoatModeId> {
        match self {
            BoatMode::Start => {
                safe_outputs(state, now);
                Some(BoatModeId::SelfTest)
            }

            BoatMode::SelfTest { entered } => {
                safe_outputs(state, now);
                let gps = state.gps_fresh(now);
                let shore = state.shore_fresh(now);
                state.set_fault(Fault::NoGnss, !gps);
                state.set_fault(Fault::NoShore, !shore);
                // RC is optional at boot; a fresh frame just clears the flag.
                if state.rc_fresh(now) {
                    state.remove_fault(Fault::NoRc);
                }

                if gps && shore {
                    return Some(match state.commanded_mode.take() {
                        Some(BoatModeId::ArmedTest) => BoatModeId::ArmedTest,
                        other => {
                            if let Some(m) = other {
                                warn!(requested = %m, "command ignored during self test");
                            }
                            match state.last_boat_mode {
                                // Resume an interrupted mission.
                                BoatModeId::Waypoint => BoatModeId::Waypoint,
                                BoatModeId::Return => BoatModeId::Return,
                                _ => BoatModeId::Disarmed,
                            }
                        }
                    });
                }
                if now.saturating_duration_since(*entered) > state.cfg.timeouts.selftest() {
                    // Nothing wrong but the shore link itself: go look for it.
                    let only_link = state.fault_count() > 0
                        && state
                            .faults()
                            .all(|f| matches!(f, Fault::NoShore | Fault::NoTelemetry));
                    return Some(if only_link { BoatModeId::NoSignal } else { BoatModeId::Fault });
                }
                None
            }

            BoatMode::Disarmed => {
                safe_outputs(state, now);
                state.set_fault(Fault::NoGnss, !state.gps_fresh(now));
                state.set_fault(Fault::NoShore, !state.shore_fresh(now));
                if state.rc_fresh(now) {
                    state.remove_fault(Fault::NoRc);
                }
                // GNSS or hardware trouble is disqualifying even at rest;
                // link and battery faults just block arming.
                if state.has_fault(Fault::NoGnss) || state.has_fault(Fault::Hardware) {
                    return Some(BoatModeId::Fault);
                }
                if state.arm_edges.arm && state.fault_count() == 0 {
                    return Some(BoatModeId::Armed);
                }
                match take_commanded(state, &[BoatModeId::SelfTest]) {
                    Some(BoatModeId::SelfTest) => Some(BoatModeId::SelfTest),
                    _ => None,
                }
            }

            BoatMode::Fault { pulsed } => {
                safe_outputs(state, now);
                if !*pulsed {
                    *pulsed = true;
                    state.actuators.write_rudder(0.0);
                    let r = state.actuators.pulse_disarm().await;
                    note_hw(state, r);
                    state.insert_fault(Fault::Disarm);
                }
                // Held until a reset clears the fault string.
                if let Some(BoatModeId::SelfTest) = take_commanded(state, &[BoatModeId::SelfTest])
                {
                    state.clear_faults();
                    return Some(BoatModeId::SelfTest);
                }
                None
            }

            BoatMode::Armed { nav } => {
                if let Some(next) = armed_guards(state, nav.id(), now).await {
                    return Some(next);
                }
                if let Some(next) = take_commanded(state, ARMED_ACCEPTS) {
                    return Some(next);
                }
                // A live transmitter asking for a drive mode takes the con.
                if state.rc_fresh(now) {
                    let selected = state.last_rc.as_ref().map(|s| s.value.mode_select);
                    if matches!(selected, Some(RcModeId::Rudder | RcModeId::Course)) {
                        return Some(BoatModeId::Manual);
                    }
                }
                if let Some(next) = nav.tick(state, now) {
                    *nav = NavMode::enter(next, state);
                }
                None
            }

            BoatMode::Manual { nav } => {
                if let Some(next) = armed_guards(state, nav.id(), now).await {
                    return Some(next);
                }
                if let Some(next) = take_commanded(state, ARMED_ACCEPTS) {
                    return Some(next);
                }
                if let Some(next) = nav.tick(state, now) {
                    *nav = NavMode::enter(next, state);
                }
                None
            }

            BoatMode::Waypoint { nav } | BoatMode::Return { nav } => {
                if let Some(next) = armed_guards(state, nav.id(), now).await {
                    return Some(next);
                }
                if let Some(next) = take_commanded(state, ARMED_ACCEPTS) {
                    return Some(next);
                }
                if let Some(next) = nav.tick(state, now) {
                    *nav = NavMode::enter(next, state);
                }
                // A HOME waypoint promotes the whole boat into RETURN.
                if state.auto_mode == AutoModeId::Return && state.boat_mode == BoatModeId::Waypoint
                {
                    return Some(BoatModeId::Return);
                }
                None
            }

            BoatMode::NoSignal { nav, resume } => {
                if state.arm_edges.disarm {
                    return Some(BoatModeId::Disarmed);
                }
                if state.battery_low() {
                    state.insert_fault(Fault::LowBattery);
                    let r = state.actuators.pulse_disarm().await;
                    note_hw(state, r);
                    return Some(BoatModeId::Disarmed);
                }
                if state.has_fault(Fault::Hardware) {
                    return Some(BoatModeId::Fault);
                }
                let gps_stale = !state.gps_fresh(now);
                state.set_fault(Fault::NoGnss, gps_stale);
                if gps_stale {
                    return Some(BoatModeId::Fault);
                }

                // Recover every link whose loss drove us here.
                let mut still_lost = false;
                if state.has_fault(Fault::NoShore) {
                    if state.shore_fresh(now) {
                        state.remove_fault(Fault::NoShore);
                    } else {
                        still_lost = true;
                    }
                }
                if state.has_fault(Fault::NoRc) {
                    if state.rc_fresh(now) {
                        state.remove_fault(Fault::NoRc);
                    } else {
                        still_lost = true;
                    }
                }
                if !still_lost {
                    info!(resume = %resume, "signal recovered");
                    return Some(*resume);
                }

                if let Some(next) = nav.tick(state, now) {
                    *nav = NavMode::enter(next, state);
                }
                None
            }

            BoatMode::ArmedTest => {
                // Bench mode: actuators move only under explicit shore
                // commands, never under autonomous control.
                if state.arm_edges.disarm {
                    return Some(BoatModeId::Disarmed);
                }
                if state.has_fault(Fault::Hardware) {
                    return Some(BoatModeId::Fault);
                }
                take_commanded(state, &[BoatModeId::Disarmed, BoatModeId::SelfTest])
            }
        }
    }
}

const ARMED_ACCEPTS: &[BoatModeId] = &[
    BoatModeId::Disarmed,
    BoatModeId::Armed,
    BoatModeId::Manual,
    BoatModeId::Waypoint,
    BoatModeId::Return,
    BoatModeId::SelfTest,
];

/// Consume a shore mode request if this mode accepts it; anything else is
/// logged and dropped so a stale request cannot fire later.
fn take_commanded(state: &mut BoatState, accepted: &[BoatModeId]) -> Option<BoatModeId> {
    let requested = state.commanded_mode.take()?;
    if requested == state.boat_mode {
        return None;
    }
    if accepted.contains(&requested) {
        Some(requested)
    } else {
        warn!(requested = %requested, current = %state.boat_mode, "mode command refused");
        None
    }
}

/// Throttle off and servo power cut, commanded every tick in the
/// non-driving modes.
fn safe_outputs(state: &mut BoatState, now: Instant) {
    let r = state.actuators.set_throttle(0, now);
    note_hw(state, r);
    let r = state.actuators.servo_enable(false);
    note_hw(state, r);
}

/// Shared hazard checks for the armed modes, in priority order: operator
/// disarm, battery, hardware, GNSS, then link losses.
async fn armed_guards(
    state: &mut BoatState,
    nav: NavModeId,
    now: Instant,
) -> Option<BoatModeId> {
    if state.arm_edges.disarm {
        return Some(BoatModeId::Disarmed);
    }
    if state.battery_low() {
        state.insert_fault(Fault::LowBattery);
        let r = state.actuators.pulse_disarm().await;
        note_hw(state, r);
        return Some(BoatModeId::Disarmed);
    }
    if state.has_fault(Fault::Hardware) {
        return Some(BoatModeId::Fault);
    }

    let gps_stale = !state.gps_fresh(now);
    state.set_fault(Fault::NoGnss, gps_stale);
    if gps_stale && nav == NavModeId::Autonomous {
        return Some(BoatModeId::Fault);
    }

    let shore_stale = !state.shore_fresh(now);
    state.set_fault(Fault::NoShore, shore_stale);
    if shore_stale {
        return Some(BoatModeId::NoSignal);
    }

    if nav == NavModeId::Rc {
        let rc_stale = !state.rc_fresh(now);
        state.set_fault(Fault::NoRc, rc_stale);
        if rc_stale {
            return Some(BoatModeId::NoSignal);
        }
    }
    None
}

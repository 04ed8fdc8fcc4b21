use std::time::Instant;

use boat_types::location::fold_deg_signed;
use boat_types::{AutoModeId, CourseType, Location, TwoVector, WaypointAction};

use super::note_hw;
use crate::helm::Helm;
use crate::state::{BoatState, Fault};

/// Autonomous navigation sub-modes. WAYPOINT and RETURN share one steering
/// law with different targets; ANCHOR breathes in and out of a hold radius
/// around a fixed point.
pub enum AutoMode {
    Idle,
    Waypoint { helm: Helm },
    Return { helm: Helm },
    Anchor { helm: Helm },
}

impl AutoMode {
    pub fn enter(id: AutoModeId, state: &mut BoatState) -> AutoMode {
        let mode = match id {
            AutoModeId::Waypoint => AutoMode::Waypoint { helm: new_helm(state) },
            AutoModeId::Return => AutoMode::Return { helm: new_helm(state) },
            AutoModeId::Anchor => {
                // The anchor point is fixed at entry: an explicit point if a
                // command set one, otherwise wherever the boat is now.
                if state.anchor_point.is_none() {
                    state.anchor_point = state.here();
                }
                AutoMode::Anchor { helm: new_helm(state) }
            }
            _ => AutoMode::Idle,
        };
        state.auto_mode = mode.id();
        mode
    }

    pub fn id(&self) -> AutoModeId {
        match self {
            AutoMode::Idle => AutoModeId::Idle,
            AutoMode::Waypoint { .. } => AutoModeId::Waypoint,
            AutoMode::Return { .. } => AutoModeId::Return,
            AutoMode::Anchor { .. } => AutoModeId::Anchor,
        }
    }

    pub fn tick(&mut self, state: &mut BoatState, now: Instant) -> Option<AutoModeId> {
        match self {
            AutoMode::Idle => {
                let r = state.actuators.set_throttle(0, now);
                note_hw(state, r);
                state.actuators.write_rudder(0.0);
                let r = state.actuators.servo_enable(true);
                note_hw(state, r);
                None
            }
            AutoMode::Waypoint { helm } => {
                let Some(waypoint) = state.waypoints.get(state.next_waypoint).copied() else {
                    // List exhausted: behave as STOP.
                    return Some(AutoModeId::Anchor);
                };
                let Some(here) = state.here() else {
                    hold(state, now);
                    return None;
                };
                let distance = here
                    .distance_to(&waypoint.location, CourseType::GreatCircle)
                    .unwrap_or(f64::INFINITY);
                if distance <= state.cfg.nav.waypoint_accuracy_m {
                    return match waypoint.action {
                        WaypointAction::Continue => {
                            state.next_waypoint += 1;
                            if state.next_waypoint >= state.waypoints.len() {
                                Some(AutoModeId::Anchor)
                            } else {
                                None
                            }
                        }
                        WaypointAction::Stop => {
                            state.anchor_point = Some(here);
                            Some(AutoModeId::Anchor)
                        }
                        WaypointAction::Home => Some(AutoModeId::Return),
                    };
                }
                let cruise = state.cfg.nav.cruise_throttle;
                steer(state, helm, &waypoint.location, cruise, now);
                None
            }
            AutoMode::Return { helm } => {
                let Some(launch) = state.launch_point else {
                    // Nowhere to return to; hold position instead.
                    return Some(AutoModeId::Anchor);
                };
                let Some(here) = state.here() else {
                    hold(state, now);
                    return None;
                };
                let distance =
                    here.distance_to(&launch, CourseType::GreatCircle).unwrap_or(f64::INFINITY);
                if distance <= state.cfg.nav.waypoint_accuracy_m {
                    state.anchor_point = Some(launch);
                    return Some(AutoModeId::Anchor);
                }
                let cruise = state.cfg.nav.cruise_throttle;
                steer(state, helm, &launch, cruise, now);
                None
            }
            AutoMode::Anchor { helm } => {
                if state.anchor_point.is_none() {
                    state.anchor_point = state.here();
                }
                let Some(anchor) = state.anchor_point else {
                    hold(state, now);
                    return None;
                };
                let Some(here) = state.here() else {
                    hold(state, now);
                    return None;
                };
                let distance =
                    here.distance_to(&anchor, CourseType::GreatCircle).unwrap_or(0.0);
                if distance > state.cfg.nav.anchor_hold_m {
                    let cruise = state.cfg.nav.cruise_throttle;
                    steer(state, helm, &anchor, cruise, now);
                } else {
                    // Inside the hold radius: drift with the helm off.
                    let r = state.actuators.set_throttle(0, now);
                    note_hw(state, r);
                    state.actuators.write_rudder(0.0);
                    let r = state.actuators.servo_enable(true);
                    note_hw(state, r);
                    helm.reset();
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

/// No usable fix or heading: power down the drive but keep the servo hot
/// so control resumes the moment the sensor comes back.
fn hold(state: &mut BoatState, now: Instant) {
    let r = state.actuators.set_throttle(0, now);
    note_hw(state, r);
    let r = state.actuators.servo_enable(true);
    note_hw(state, r);
}

/// Shared steering law: bearing to target, mixed with any queued dodge
/// influences, through the helm to the rudder.
fn steer(state: &mut BoatState, helm: &mut Helm, target: &Location, throttle: i8, now: Instant) {
    helm.set_gains(state.gains);
    let r = state.actuators.servo_enable(true);
    note_hw(state, r);

    let Some(setpoint) = influenced_bearing(state, target) else {
        hold(state, now);
        return;
    };
    if state.imu_fresh(now) {
        state.remove_fault(Fault::Imu);
        if let Some(heading) = state.true_heading() {
            let rudder = helm.update(fold_deg_signed(setpoint - heading), now);
            state.actuators.write_rudder(rudder);
        }
        let r = state.actuators.set_throttle(throttle, now);
        note_hw(state, r);
    } else {
        // Cannot steer blind: flag the IMU and take the way off.
        state.insert_fault(Fault::Imu);
        hold(state, now);
    }
}

/// Bearing to the target with the tick's dodge influences vector-summed
/// in. The target carries unit strength; the summed strength is capped.
fn influenced_bearing(state: &mut BoatState, target: &Location) -> Option<f64> {
    let here = state.here()?;
    let bearing = here.bearing_to(target, CourseType::GreatCircle).ok()?;
    if state.influences.is_empty() {
        return Some(bearing);
    }
    let mut total = TwoVector::from_bearing_deg(bearing, 1.0);
    for influence in state.influences.drain(..) {
        total += TwoVector::from_bearing_deg(influence.bearing, influence.strength);
    }
    let cap = state.cfg.nav.influence_strength_max;
    if total.mag() > cap {
        if let Ok(unit) = total.unit() {
            total = unit * cap;
        }
    }
    Some(total.bearing_deg())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{testutil, Stamped};
    use boat_types::Waypoint;

    fn seattle() -> Location {
        Location::new(47.5, -122.3)
    }

    /// ~900 m east of `seattle()`.
    fn east_target() -> Location {
        Location::new(47.5, -122.288)
    }

    fn with_fix(state: &mut BoatState, loc: Location) {
        state.last_fix = Some(Stamped::new(testutil::fix_at(loc.lat, loc.lon)));
        state.last_orientation = Some(Stamped::new(testutil::orientation(0.0)));
    }

    use crate::state::BoatState;

    #[test]
    fn waypoint_steers_and_cruises() {
        let mut state = testutil::state();
        let now = Instant::now();
        with_fix(&mut state, seattle());
        state.waypoints = vec![Waypoint::new(east_target(), WaypointAction::Stop)];
        let mut mode = AutoMode::enter(AutoModeId::Waypoint, &mut state);

        assert_eq!(mode.tick(&mut state, now), None);
        assert_eq!(state.actuators.throttle(), state.cfg.nav.cruise_throttle);
        // Target due east of a north-pointing boat: hard starboard rudder.
        assert!(state.actuators.rudder_position() > 0.0);
        assert!(state.actuators.servo_enabled());
    }

    #[test]
    fn arrival_stop_drops_anchor_at_the_fix() {
        let mut state = testutil::state();
        let now = Instant::now();
        with_fix(&mut state, east_target());
        state.waypoints = vec![Waypoint::new(east_target(), WaypointAction::Stop)];
        let mut mode = AutoMode::enter(AutoModeId::Waypoint, &mut state);

        assert_eq!(mode.tick(&mut state, now), Some(AutoModeId::Anchor));
        assert_eq!(state.anchor_point, Some(east_target()));
    }

    #[test]
    fn arrival_continue_advances_then_exhausts_to_anchor() {
        let mut state = testutil::state();
        let now = Instant::now();
        with_fix(&mut state, seattle());
        state.waypoints = vec![
            Waypoint::new(seattle(), WaypointAction::Continue),
            Waypoint::new(east_target(), WaypointAction::Continue),
        ];
        let mut mode = AutoMode::enter(AutoModeId::Waypoint, &mut state);
        assert_eq!(mode.tick(&mut state, now), None);
        assert_eq!(state.next_waypoint, 1);

        with_fix(&mut state, east_target());
        assert_eq!(mode.tick(&mut state, now), Some(AutoModeId::Anchor));
    }

    #[test]
    fn arrival_home_returns_to_launch() {
        let mut state = testutil::state();
        let now = Instant::now();
        with_fix(&mut state, east_target());
        state.launch_point = Some(seattle());
        state.waypoints = vec![Waypoint::new(east_target(), WaypointAction::Home)];
        let mut mode = AutoMode::enter(AutoModeId::Waypoint, &mut state);
        assert_eq!(mode.tick(&mut state, now), Some(AutoModeId::Return));
    }

    #[test]
    fn anchor_breathes_across_the_hold_radius() {
        let mut state = testutil::state();
        let now = Instant::now();
        with_fix(&mut state, seattle());
        let mut mode = AutoMode::enter(AutoModeId::Anchor, &mut state);
        assert_eq!(state.anchor_point, Some(seattle()));

        // On station: dead in the water.
        mode.tick(&mut state, now);
        assert_eq!(state.actuators.throttle(), 0);
        assert_eq!(state.actuators.rudder_position(), 0.0);

        // Drift out ~900 m: power back toward the anchor.
        with_fix(&mut state, east_target());
        mode.tick(&mut state, now);
        assert_eq!(state.actuators.throttle(), state.cfg.nav.cruise_throttle);

        // Blown back inside: power off again.
        with_fix(&mut state, seattle());
        mode.tick(&mut state, now);
        assert_eq!(state.actuators.throttle(), 0);
    }

    #[test]
    fn influences_bend_the_setpoint() {
        let mut state = testutil::state();
        with_fix(&mut state, seattle());
        let plain = influenced_bearing(&mut state, &east_target()).unwrap();
        assert!((plain - 90.0).abs() < 1.0, "bearing {plain}");

        state.push_influence(0.0, 1.0); // equal-strength pull to the north
        let bent = influenced_bearing(&mut state, &east_target()).unwrap();
        assert!((bent - 45.0).abs() < 1.0, "bent {bent}");
        assert!(state.influences.is_empty(), "influences are consumed");
    }

    #[test]
    fn stale_imu_takes_the_way_off() {
        let mut state = testutil::state();
        let now = Instant::now();
        with_fix(&mut state, seattle());
        state.waypoints = vec![Waypoint::new(east_target(), WaypointAction::Stop)];
        // Orientation sample far older than the freshness window.
        state.last_orientation =
            Some(Stamped { value: testutil::orientation(0.0), at: now - std::time::Duration::from_secs(5) });
        let mut mode = AutoMode::enter(AutoModeId::Waypoint, &mut state);
        mode.tick(&mut state, now);
        assert!(state.has_fault(Fault::Imu));
        assert_eq!(state.actuators.throttle(), 0);
    }
}

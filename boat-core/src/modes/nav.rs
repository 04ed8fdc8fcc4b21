use std::time::Instant;

use boat_types::{AutoModeId, NavModeId, RcModeId};

use super::{note_hw, AutoMode, RcMode};
use crate::state::BoatState;

/// Navigation layer. RC and AUTONOMOUS own their sub-mode object and
/// forward every tick into it; IDLE and FAULT hold the drive train safe.
pub enum NavMode {
    Idle,
    Fault,
    Rc(RcMode),
    Autonomous(AutoMode),
}

impl NavMode {
    pub fn enter(id: NavModeId, state: &mut BoatState) -> NavMode {
        match id {
            NavModeId::Rc => Self::enter_rc(state, RcModeId::Idle),
            NavModeId::Autonomous => Self::enter_auto(state, AutoModeId::Idle),
            NavModeId::Fault => {
                state.nav_mode = NavModeId::Fault;
                state.auto_mode = AutoModeId::None;
                state.rc_mode = RcModeId::None;
                NavMode::Fault
            }
            _ => {
                state.nav_mode = NavModeId::Idle;
                state.auto_mode = AutoModeId::None;
                state.rc_mode = RcModeId::None;
                NavMode::Idle
            }
        }
    }

    /// RC navigation with a chosen initial sub-mode.
    pub fn enter_rc(state: &mut BoatState, sub: RcModeId) -> NavMode {
        state.nav_mode = NavModeId::Rc;
        state.auto_mode = AutoModeId::None;
        NavMode::Rc(RcMode::enter(sub, state))
    }

    /// Autonomous navigation with a chosen initial sub-mode.
    pub fn enter_auto(state: &mut BoatState, sub: AutoModeId) -> NavMode {
        state.nav_mode = NavModeId::Autonomous;
        state.rc_mode = RcModeId::None;
        NavMode::Autonomous(AutoMode::enter(sub, state))
    }

    pub fn id(&self) -> NavModeId {
        match self {
            NavMode::Idle => NavModeId::Idle,
            NavMode::Fault => NavModeId::Fault,
            NavMode::Rc(_) => NavModeId::Rc,
            NavMode::Autonomous(_) => NavModeId::Autonomous,
        }
    }

    pub fn tick(&mut self, state: &mut BoatState, now: Instant) -> Option<NavModeId> {
        if let Some(requested) = state.commanded_nav.take() {
            if requested != self.id() {
                return Some(requested);
            }
        }
        match self {
            NavMode::Idle => {
                let r = state.actuators.set_throttle(0, now);
                note_hw(state, r);
                state.actuators.write_rudder(0.0);
                let r = state.actuators.servo_enable(false);
                note_hw(state, r);
                None
            }
            NavMode::Fault => {
                let r = state.actuators.set_throttle(0, now);
                note_hw(state, r);
                let r = state.actuators.servo_enable(false);
                note_hw(state, r);
                None
            }
            NavMode::Rc(sub) => {
                if let Some(next) = sub.tick(state, now) {
                    *sub = RcMode::enter(next, state);
                }
                None
            }
            NavMode::Autonomous(sub) => {
                if let Some(requested) = state.commanded_auto.take() {
                    if requested != sub.id() {
                        *sub = AutoMode::enter(requested, state);
                    }
                }
                if let Some(next) = sub.tick(state, now) {
                    *sub = AutoMode::enter(next, state);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{testutil, Stamped};
    use boat_types::{Location, Waypoint, WaypointAction};

    #[test]
    fn idle_holds_the_drive_safe() {
        let mut state = testutil::state();
        let now = Instant::now();
        let mut nav = NavMode::enter(NavModeId::Idle, &mut state);
        assert_eq!(nav.tick(&mut state, now), None);
        assert_eq!(state.actuators.throttle(), 0);
        assert!(!state.actuators.servo_enabled());
    }

    #[test]
    fn sub_mode_swaps_follow_commands() {
        let mut state = testutil::state();
        let now = Instant::now();
        state.last_fix = Some(Stamped::new(testutil::fix_at(47.5, -122.3)));
        let mut nav = NavMode::enter_auto(&mut state, AutoModeId::Idle);
        assert_eq!(state.auto_mode, AutoModeId::Idle);

        state.commanded_auto = Some(AutoModeId::Anchor);
        nav.tick(&mut state, now);
        assert_eq!(state.auto_mode, AutoModeId::Anchor);
        assert!(state.anchor_point.is_some());
    }

    #[test]
    fn autonomous_arrival_swaps_in_place() {
        let mut state = testutil::state();
        let now = Instant::now();
        let here = Location::new(47.5, -122.3);
        state.last_fix = Some(Stamped::new(testutil::fix_at(here.lat, here.lon)));
        state.last_orientation = Some(Stamped::new(testutil::orientation(0.0)));
        state.waypoints = vec![Waypoint::new(here, WaypointAction::Stop)];
        let mut nav = NavMode::enter_auto(&mut state, AutoModeId::Waypoint);

        // Already on top of the waypoint: one tick anchors.
        nav.tick(&mut state, now);
        assert_eq!(state.auto_mode, AutoModeId::Anchor);
        assert_eq!(state.anchor_point, Some(here));
    }

    #[test]
    fn nav_level_command_bubbles_up() {
        let mut state = testutil::state();
        let now = Instant::now();
        let mut nav = NavMode::enter(NavModeId::Idle, &mut state);
        state.commanded_nav = Some(NavModeId::Rc);
        assert_eq!(nav.tick(&mut state, now), Some(NavModeId::Rc));
    }
}

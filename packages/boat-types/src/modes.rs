use serde::{Deserialize, Serialize};

// ─── Boat mode ────────────────────────────────────────────────────────────────

/// Top-level operating mode of the vessel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoatModeId {
    #[default]
    None,
    Start,
    SelfTest,
    Disarmed,
    Fault,
    Armed,
    Manual,
    Waypoint,
    NoSignal,
    Return,
    ArmedTest,
}

impl BoatModeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoatModeId::None => "NONE",
            BoatModeId::Start => "START",
            BoatModeId::SelfTest => "SELF_TEST",
            BoatModeId::Disarmed => "DISARMED",
            BoatModeId::Fault => "FAULT",
            BoatModeId::Armed => "ARMED",
            BoatModeId::Manual => "MANUAL",
            BoatModeId::Waypoint => "WAYPOINT",
            BoatModeId::NoSignal => "NO_SIGNAL",
            BoatModeId::Return => "RETURN",
            BoatModeId::ArmedTest => "ARMED_TEST",
        }
    }

    /// Modes in which the drive train may be powered.
    pub fn is_armed(&self) -> bool {
        matches!(
            self,
            BoatModeId::Armed
                | BoatModeId::Manual
                | BoatModeId::Waypoint
                | BoatModeId::NoSignal
                | BoatModeId::Return
                | BoatModeId::ArmedTest
        )
    }
}

impl std::fmt::Display for BoatModeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Navigation mode ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavModeId {
    #[default]
    None,
    Idle,
    Fault,
    Rc,
    Autonomous,
}

impl NavModeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavModeId::None => "NONE",
            NavModeId::Idle => "IDLE",
            NavModeId::Fault => "FAULT",
            NavModeId::Rc => "RC",
            NavModeId::Autonomous => "AUTONOMOUS",
        }
    }
}

impl std::fmt::Display for NavModeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Autonomous sub-mode ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoModeId {
    #[default]
    None,
    Idle,
    Waypoint,
    Return,
    Anchor,
}

impl AutoModeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoModeId::None => "NONE",
            AutoModeId::Idle => "IDLE",
            AutoModeId::Waypoint => "WAYPOINT",
            AutoModeId::Return => "RETURN",
            AutoModeId::Anchor => "ANCHOR",
        }
    }
}

impl std::fmt::Display for AutoModeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── RC sub-mode ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RcModeId {
    #[default]
    None,
    Idle,
    Rudder,
    Course,
    Failsafe,
}

impl RcModeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RcModeId::None => "NONE",
            RcModeId::Idle => "IDLE",
            RcModeId::Rudder => "RUDDER",
            RcModeId::Course => "COURSE",
            RcModeId::Failsafe => "FAILSAFE",
        }
    }
}

impl std::fmt::Display for RcModeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

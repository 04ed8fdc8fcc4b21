use serde::{Deserialize, Serialize};

use crate::location::Location;

/// What the boat does when it reaches a waypoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaypointAction {
    Stop,
    Home,
    #[default]
    Continue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub location: Location,
    pub action: WaypointAction,
}

impl Waypoint {
    pub fn new(location: Location, action: WaypointAction) -> Self {
        Self { location, action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_screaming_snake() {
        let wp = Waypoint::new(Location::new(47.5, -122.29), WaypointAction::Stop);
        let json = serde_json::to_string(&wp).unwrap();
        assert!(json.contains("\"STOP\""));
        let back: Waypoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wp);
    }
}

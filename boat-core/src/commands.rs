//! Shore command dispatch. Commands arrive as `{"Command","Argument"}`
//! envelopes on the FIFO; a name-keyed table maps each to a handler that
//! mutates the boat state. A bad command is logged and dropped — it never
//! stalls the queue.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use boat_types::{
    AutoModeId, BoatModeId, CommandMsg, Location, NavModeId, Waypoint, WaypointAction,
};

use crate::helm::Gains;
use crate::state::BoatState;

type Handler = fn(&mut BoatState, &Value) -> anyhow::Result<()>;

/// The dispatch table. Returns None for names the boat does not know.
fn handler_for(name: &str) -> Option<Handler> {
    Some(match name {
        "SetMode" => set_mode,
        "SetNavMode" => set_nav_mode,
        "SetAutoMode" => set_auto_mode,
        "SetHome" => set_home,
        "SetWaypoint" => set_waypoint,
        "SetWaypointAction" => set_waypoint_action,
        "SetPID" => set_pid,
        "FetchWaypoints" => fetch_waypoints,
        "PushPath" => push_path,
        "DumpPathKML" => dump_path_kml,
        "DumpWaypointKML" => dump_waypoint_kml,
        "DumpObstacleKML" => dump_obstacle_kml,
        "DumpAIS" => dump_ais,
        "ReverseShell" => reverse_shell,
        "Heartbeat" => heartbeat,
        _ => return None,
    })
}

impl BoatState {
    /// Drain up to `limit` pending commands (0 drains everything).
    /// Returns how many were executed, counting failures.
    pub fn execute_cmds(&mut self, limit: usize) -> usize {
        let mut executed = 0;
        while let Some(msg) = {
            if limit != 0 && executed >= limit {
                None
            } else {
                self.pending.pop_front()
            }
        } {
            executed += 1;
            match handler_for(&msg.name) {
                Some(handler) => match handler(self, &msg.args) {
                    Ok(()) => info!(command = %msg.name, "command executed"),
                    Err(err) => warn!(command = %msg.name, %err, "command failed"),
                },
                None => warn!(command = %msg.name, "unknown command dropped"),
            }
        }
        executed
    }

    pub fn push_cmd_named(&mut self, name: &str, args: Value) {
        self.push_cmd(CommandMsg::new(name, args));
    }
}

// ─── Mode requests ────────────────────────────────────────────────────────────

fn set_mode(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let mode: BoatModeId =
        serde_json::from_value(args["mode"].clone()).context("mode name")?;
    state.commanded_mode = Some(mode);
    Ok(())
}

fn set_nav_mode(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let mode: NavModeId = serde_json::from_value(args["mode"].clone()).context("mode name")?;
    state.commanded_nav = Some(mode);
    Ok(())
}

fn set_auto_mode(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let mode: AutoModeId = serde_json::from_value(args["mode"].clone()).context("mode name")?;
    state.commanded_auto = Some(mode);
    Ok(())
}

// ─── Mission setup ────────────────────────────────────────────────────────────

fn set_home(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let home = match (args.get("lat").and_then(Value::as_f64), args.get("lon").and_then(Value::as_f64)) {
        (Some(lat), Some(lon)) => {
            let loc = Location::new(lat, lon);
            if !loc.is_valid() {
                bail!("home location out of range");
            }
            loc
        }
        // Bare SetHome means "home is here".
        _ => state.here().context("no valid fix to set home from")?,
    };
    state.launch_point = Some(home);
    Ok(())
}

fn set_waypoint(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let index = args["index"].as_u64().context("waypoint index")? as usize;
    if index >= state.waypoints.len() {
        bail!("waypoint index {index} out of range ({} loaded)", state.waypoints.len());
    }
    state.next_waypoint = index;
    Ok(())
}

fn set_waypoint_action(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let index = args["index"].as_u64().context("waypoint index")? as usize;
    let action: WaypointAction =
        serde_json::from_value(args["action"].clone()).context("waypoint action")?;
    let len = state.waypoints.len();
    let waypoint = state
        .waypoints
        .get_mut(index)
        .with_context(|| format!("waypoint index {index} out of range ({len} loaded)"))?;
    waypoint.action = action;
    Ok(())
}

fn set_pid(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let gains: Gains = serde_json::from_value(args.clone()).context("gain triple")?;
    state.gains = gains;
    Ok(())
}

fn fetch_waypoints(state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    let body = serde_json::to_string(&state.waypoints)?;
    state.outbox.push(("Waypoints", body));
    Ok(())
}

fn push_path(state: &mut BoatState, args: &Value) -> anyhow::Result<()> {
    let path = args["path"].as_array().context("path array")?;
    let mut waypoints = Vec::with_capacity(path.len());
    for pair in path {
        let lat = pair[0].as_f64().context("path latitude")?;
        let lon = pair[1].as_f64().context("path longitude")?;
        let loc = Location::new(lat, lon);
        if !loc.is_valid() {
            bail!("path point out of range");
        }
        waypoints.push(Waypoint::new(loc, WaypointAction::Continue));
    }
    if let Some(last) = waypoints.last_mut() {
        last.action = WaypointAction::Stop;
    }
    state.waypoints = waypoints;
    state.next_waypoint = 0;
    Ok(())
}

fn heartbeat(_state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    Ok(())
}

// ─── Diagnostics ──────────────────────────────────────────────────────────────

fn dump_path_kml(state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    let mut coords = String::new();
    for (_, loc) in &state.track {
        writeln!(coords, "{},{},0", loc.lon, loc.lat)?;
    }
    let body = format!(
        "<Placemark><name>track</name><LineString><coordinates>\n{coords}</coordinates></LineString></Placemark>"
    );
    queue_dump(state, "path.kml", kml_document("Boat track", &body));
    Ok(())
}

fn dump_waypoint_kml(state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    let mut body = String::new();
    for (i, wp) in state.waypoints.iter().enumerate() {
        write!(
            body,
            "<Placemark><name>wp{} {:?}</name><Point><coordinates>{},{},0</coordinates></Point></Placemark>",
            i, wp.action, wp.location.lon, wp.location.lat
        )?;
    }
    queue_dump(state, "waypoints.kml", kml_document("Waypoints", &body));
    Ok(())
}

fn dump_obstacle_kml(state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut body = String::new();
    if let Some(contacts) = state.ais.as_ref().map(|s| &s.value) {
        for contact in contacts.values() {
            let projected = contact.project(now);
            if !projected.is_valid() {
                continue;
            }
            let name = contact.shipname.clone().unwrap_or_else(|| contact.mmsi.to_string());
            write!(
                body,
                "<Placemark><name>{name}</name><Point><coordinates>{},{},0</coordinates></Point></Placemark>",
                projected.lon, projected.lat
            )?;
        }
    }
    queue_dump(state, "obstacles.kml", kml_document("AIS contacts", &body));
    Ok(())
}

fn dump_ais(state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    let contacts = state.ais.as_ref().map(|s| &s.value);
    let body = serde_json::to_string_pretty(&contacts)?;
    queue_dump(state, "ais.json", body);
    Ok(())
}

fn kml_document(name: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n<Document><name>{name}</name>{body}</Document>\n</kml>\n"
    )
}

/// Handlers only queue dump content; the scheduler ships the queue to the
/// blocking pool so no file I/O happens on the control thread.
fn queue_dump(state: &mut BoatState, file: &str, body: String) {
    let path = state.cfg.log.dump_dir.join(file);
    state.dumps.push((path, body));
}

/// Runs on the blocking pool. Failures are logged per file; a bad dump
/// directory costs the dump, not the boat.
pub(crate) fn write_dumps(jobs: &[(PathBuf, String)]) {
    for (path, body) in jobs {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), %err, "diagnostic dump dir failed");
                continue;
            }
        }
        match std::fs::write(path, body) {
            Ok(()) => info!(path = %path.display(), "diagnostic dump written"),
            Err(err) => warn!(path = %path.display(), %err, "diagnostic dump failed"),
        }
    }
}

// ─── Operator shell ───────────────────────────────────────────────────────────

/// Refused afloat, and deliberately inert even at the dock.
fn reverse_shell(state: &mut BoatState, _args: &Value) -> anyhow::Result<()> {
    if state.boat_mode != BoatModeId::Disarmed {
        bail!("refused outside DISARMED");
    }
    warn!("ReverseShell is disabled in this build");
    Ok(())
}

//! The control loop ("CTRL"). A fixed-period tick that samples the input
//! cells, maintains the fault set, drains the command FIFO, steps the
//! mode hierarchy, and hands one telemetry frame per tick to the shore
//! task. It never blocks on a sensor and never holds a snapshot lock
//! across an await; actuators are commanded from this task alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use boat_types::{AisContact, CommandMsg, GpsFix, MagModel, Orientation};

use crate::modes::BoatMode;
use crate::shore::{build_frame, TelemetryFrame};
use crate::state::{AnalogMap, ArmCounters, ArmEdges, BoatState, Fault, InputCell, RcFrame};
use crate::statelog::StateRow;

/// The per-sensor snapshot slots shared between the input tasks and the
/// control loop.
#[derive(Clone, Default)]
pub struct InputCells {
    pub gps: InputCell<GpsFix>,
    pub ais: InputCell<HashMap<u32, AisContact>>,
    pub orientation: InputCell<Orientation>,
    pub analog: InputCell<AnalogMap>,
    pub rc: InputCell<RcFrame>,
    pub arm: InputCell<ArmCounters>,
    pub shore_contact: InputCell<()>,
}

pub struct Scheduler {
    state: BoatState,
    mode: BoatMode,
    cells: InputCells,
    cmd_rx: mpsc::UnboundedReceiver<CommandMsg>,
    frames_tx: mpsc::Sender<TelemetryFrame>,
    log_tx: mpsc::Sender<StateRow>,
    mag_model: Option<MagModel>,
    link_ok: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    seen_arm: ArmCounters,
    magvar_updated: Option<Instant>,
    was_armed: bool,
    horn_until: Option<Instant>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut state: BoatState,
        cells: InputCells,
        cmd_rx: mpsc::UnboundedReceiver<CommandMsg>,
        frames_tx: mpsc::Sender<TelemetryFrame>,
        log_tx: mpsc::Sender<StateRow>,
        mag_model: Option<MagModel>,
        link_ok: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let mode = BoatMode::enter(boat_types::BoatModeId::Start, &mut state, Instant::now());
        Self {
            state,
            mode,
            cells,
            cmd_rx,
            frames_tx,
            log_tx,
            mag_model,
            link_ok,
            stop,
            seen_arm: ArmCounters::default(),
            magvar_updated: None,
            was_armed: false,
            horn_until: None,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.state.cfg.control.frame_len());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(period_ms = self.state.cfg.control.frame_len_ms, "control loop running");
        loop {
            ticker.tick().await;
            if self.stop.load(Ordering::Relaxed) {
                info!("control loop stopping");
                return Ok(());
            }
            self.tick(Instant::now()).await;
        }
    }

    pub(crate) async fn tick(&mut self, now: Instant) {
        self.sample_inputs();
        self.housekeeping(now);

        // Commands arrive from the shore task; the FIFO drains here only.
        while let Ok(msg) = self.cmd_rx.try_recv() {
            self.state.push_cmd(msg);
        }
        let limit = self.state.cfg.control.cmds_per_tick;
        self.state.execute_cmds(limit);
        // Queued diagnostic dumps go to the blocking pool; disk latency
        // stays off this task.
        if !self.state.dumps.is_empty() {
            let jobs = std::mem::take(&mut self.state.dumps);
            tokio::task::spawn_blocking(move || crate::commands::write_dumps(&jobs));
        }

        if let Some(next) = self.mode.tick(&mut self.state, now).await {
            self.mode = BoatMode::enter(next, &mut self.state, now);
        }
        self.sound_horn(now);

        // Influences not consumed by an autonomous mode die with the tick.
        self.state.influences.clear();

        let frame = build_frame(&mut self.state);
        if let Err(err) = self.frames_tx.try_send(frame) {
            debug!(%err, "telemetry frame dropped");
        }
        // The writer task owns the file; a full channel costs a row.
        if let Err(err) = self.log_tx.try_send(StateRow::snapshot(&self.state)) {
            debug!(%err, "state log row dropped");
        }
    }

    /// Pull the latest snapshot from every cell. A contended or silent
    /// cell leaves the previous copy in place; staleness is judged by the
    /// snapshot's own stamp, never by lock luck.
    fn sample_inputs(&mut self) {
        if let Some(fix) = self.cells.gps.sample() {
            self.state.last_fix = Some(fix);
        }
        if let Some(orientation) = self.cells.orientation.sample() {
            self.state.last_orientation = Some(orientation);
        }
        if let Some(analog) = self.cells.analog.sample() {
            self.state.analog = Some(analog);
        }
        if let Some(rc) = self.cells.rc.sample() {
            self.state.last_rc = Some(rc);
        }
        if let Some(ais) = self.cells.ais.sample() {
            self.state.ais = Some(ais);
        }
        if let Some(contact) = self.cells.shore_contact.sample() {
            self.state.last_shore = Some(contact.at);
        }

        self.state.arm_edges = match self.cells.arm.sample() {
            Some(counters) => {
                let edges = ArmEdges {
                    arm: counters.value.arm > self.seen_arm.arm,
                    disarm: counters.value.disarm > self.seen_arm.disarm,
                };
                self.seen_arm = counters.value;
                edges
            }
            None => ArmEdges::default(),
        };
    }

    fn housekeeping(&mut self, now: Instant) {
        self.state.telemetry_ok = self.link_ok.load(Ordering::Relaxed);
        let telemetry_down = !self.state.telemetry_ok;
        self.state.set_fault(Fault::NoTelemetry, telemetry_down);

        // Low battery latches; only a reset clears it.
        if self.state.battery_low() {
            self.state.insert_fault(Fault::LowBattery);
        }

        self.refresh_declination(now);
        self.record_track();
    }

    fn refresh_declination(&mut self, now: Instant) {
        let Some(model) = self.mag_model.as_ref() else { return };
        let Some(here) = self.state.here() else { return };
        let due = self
            .magvar_updated
            .is_none_or(|t| now.saturating_duration_since(t) >= self.state.cfg.timeouts.magvar_refresh());
        if !due {
            return;
        }
        match model.declination(&here, Utc::now()) {
            Ok(declination) => {
                self.state.declination = declination;
                self.magvar_updated = Some(now);
            }
            // Leave the cached value standing.
            Err(err) => debug!(%err, "declination update failed"),
        }
    }

    /// Warning blast whenever the boat goes from an unarmed to an armed
    /// mode, held for the configured horn time.
    fn sound_horn(&mut self, now: Instant) {
        let armed = self.state.boat_mode.is_armed();
        if armed && !self.was_armed {
            if self.state.actuators.horn(true).is_ok() {
                self.horn_until = Some(now + self.state.cfg.timeouts.horn());
            }
        }
        if self.horn_until.is_some_and(|until| now >= until) {
            let _ = self.state.actuators.horn(false);
            self.horn_until = None;
        }
        self.was_armed = armed;
    }

    fn record_track(&mut self) {
        let Some(here) = self.state.here() else { return };
        if self.state.track.last().is_some_and(|(_, last)| *last == here) {
            return;
        }
        let cap = self.state.cfg.control.track_history_len;
        if self.state.track.len() >= cap {
            self.state.track.remove(0);
        }
        self.state.track.push((Utc::now(), here));
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &BoatState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil;
    use boat_types::BoatModeId;
    use serde_json::json;
    use std::time::Duration;

    struct Rig {
        scheduler: Scheduler,
        cells: InputCells,
        cmd_tx: mpsc::UnboundedSender<CommandMsg>,
        frames_rx: mpsc::Receiver<TelemetryFrame>,
        log_rx: mpsc::Receiver<StateRow>,
    }

    fn rig() -> Rig {
        let cells = InputCells::default();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::channel(16);
        let (log_tx, log_rx) = mpsc::channel(16);
        let scheduler = Scheduler::new(
            testutil::state(),
            cells.clone(),
            cmd_rx,
            frames_tx,
            log_tx,
            None,
            Arc::new(AtomicBool::new(true)),
            Arc::new(AtomicBool::new(false)),
        );
        Rig { scheduler, cells, cmd_tx, frames_rx, log_rx }
    }

    #[tokio::test]
    async fn boot_walks_into_selftest_and_emits_telemetry() {
        let mut rig = rig();
        let wait = Duration::from_millis(5);
        rig.cells.gps.publish(testutil::fix_at(47.5, -122.3), wait).await;
        rig.cells.shore_contact.publish((), wait).await;

        let now = Instant::now();
        rig.scheduler.tick(now).await; // START → SELFTEST
        assert_eq!(rig.scheduler.state().boat_mode, BoatModeId::SelfTest);
        rig.scheduler.tick(now).await; // SELFTEST → DISARMED
        assert_eq!(rig.scheduler.state().boat_mode, BoatModeId::Disarmed);

        let frame = rig.frames_rx.try_recv().expect("frame per tick");
        assert!(frame.topics.iter().any(|(t, _)| *t == crate::shore::TOPIC_MODE));
        // One state row per tick went to the log writer.
        let row = rig.log_rx.try_recv().expect("row per tick");
        assert_eq!(row.boat, "SELF_TEST");
    }

    #[tokio::test]
    async fn commands_flow_from_the_channel_into_state() {
        let mut rig = rig();
        rig.cmd_tx
            .send(CommandMsg::new("SetPID", json!({"Kp": 3.0, "Ki": 0.2, "Kd": 0.0})))
            .unwrap();
        rig.scheduler.tick(Instant::now()).await;
        assert_eq!(rig.scheduler.state().gains.kp, 3.0);
        assert_eq!(rig.scheduler.state().command_cnt(), 0);
    }

    #[tokio::test]
    async fn arm_edges_fire_once_per_count() {
        let mut rig = rig();
        let wait = Duration::from_millis(5);
        rig.cells.arm.publish(ArmCounters { arm: 1, disarm: 0 }, wait).await;
        rig.scheduler.tick(Instant::now()).await;
        // The edge was visible during that tick and is not re-reported.
        assert!(!rig.scheduler.state().arm_edges.arm || rig.scheduler.state().boat_mode != BoatModeId::Start);
        rig.scheduler.tick(Instant::now()).await;
        assert!(!rig.scheduler.state().arm_edges.arm);
    }

    #[tokio::test]
    async fn telemetry_outage_sets_the_fault() {
        let cells = InputCells::default();
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (frames_tx, _frames_rx) = mpsc::channel(16);
        let (log_tx, _log_rx) = mpsc::channel(16);
        let link_ok = Arc::new(AtomicBool::new(false));
        let mut scheduler = Scheduler::new(
            testutil::state(),
            cells,
            cmd_rx,
            frames_tx,
            log_tx,
            None,
            link_ok.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        scheduler.tick(Instant::now()).await;
        assert!(scheduler.state().has_fault(Fault::NoTelemetry));

        link_ok.store(true, Ordering::Relaxed);
        scheduler.tick(Instant::now()).await;
        assert!(!scheduler.state().has_fault(Fault::NoTelemetry));
    }
}

//! Append-only state log. The wider telemetry store lives off-boat; the
//! core only needs an append that hands back a monotonically increasing
//! sequence number, which the JSONL file below provides. The control loop
//! never writes the file itself: it hands rows over a channel to the
//! writer task, which runs each append on the blocking pool.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::state::BoatState;

#[derive(Debug, Clone, Serialize)]
pub struct StateRow {
    pub at: DateTime<Utc>,
    pub boat: String,
    pub nav: String,
    pub auto: String,
    pub rc: String,
    pub faults: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub rudder: f64,
    pub throttle: i8,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl StateRow {
    pub fn snapshot(state: &BoatState) -> Self {
        let fix = state.last_fix.as_ref().map(|s| &s.value);
        Self {
            at: Utc::now(),
            boat: state.boat_mode.to_string(),
            nav: state.nav_mode.to_string(),
            auto: state.auto_mode.to_string(),
            rc: state.rc_mode.to_string(),
            faults: state.fault_string(),
            lat: fix.map(|f| f.fix.lat),
            lon: fix.map(|f| f.fix.lon),
            speed: fix.map(|f| f.speed),
            heading: state.true_heading(),
            rudder: state.actuators.rudder_position(),
            throttle: state.actuators.throttle(),
            kp: state.gains.kp,
            ki: state.gains.ki,
            kd: state.gains.kd,
        }
    }
}

/// Capability the core requires of row storage.
pub trait StateLog: Send {
    /// Append a row; the returned sequence number increases by one per
    /// append and is usable as a primary key.
    fn append(&mut self, row: &StateRow) -> anyhow::Result<u64>;
}

/// One JSON object per line, sequence numbers picked up from the existing
/// file on open.
pub struct JsonlLog {
    file: File,
    next_seq: u64,
}

impl JsonlLog {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let existing = match File::open(path) {
            Ok(f) => BufReader::new(f).lines().count() as u64,
            Err(_) => 0,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening state log {}", path.display()))?;
        Ok(Self { file, next_seq: existing })
    }
}

impl StateLog for JsonlLog {
    fn append(&mut self, row: &StateRow) -> anyhow::Result<u64> {
        let seq = self.next_seq;
        let mut value = serde_json::to_value(row)?;
        value["seq"] = serde_json::Value::from(seq);
        writeln!(self.file, "{value}").context("writing state log row")?;
        self.next_seq += 1;
        Ok(seq)
    }
}

/// Discards rows; used when the log path is unwritable rather than
/// stopping the boat.
pub struct NullLog;

impl StateLog for NullLog {
    fn append(&mut self, _row: &StateRow) -> anyhow::Result<u64> {
        Ok(0)
    }
}

/// Spawn the log writer. Rows arrive over the channel; each append runs
/// on the blocking pool so disk latency never lands on an executor
/// thread. The task exits when every sender is dropped.
pub fn spawn(
    log: Box<dyn StateLog>,
    mut rx: mpsc::Receiver<StateRow>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log = log;
        while let Some(row) = rx.recv().await {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let appended = tokio::task::spawn_blocking(move || {
                let mut log = log;
                let result = log.append(&row);
                (log, result)
            })
            .await;
            match appended {
                Ok((returned, Ok(_))) => log = returned,
                Ok((returned, Err(err))) => {
                    warn!(%err, "state log append failed");
                    log = returned;
                }
                Err(err) => {
                    warn!(%err, "state log writer died");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil;

    #[test]
    fn sequence_numbers_increase_and_survive_reopen() {
        let path = std::env::temp_dir().join(format!("boat-statelog-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let state = testutil::state();
        let row = StateRow::snapshot(&state);

        let mut log = JsonlLog::open(&path).unwrap();
        assert_eq!(log.append(&row).unwrap(), 0);
        assert_eq!(log.append(&row).unwrap(), 1);
        drop(log);

        let mut log = JsonlLog::open(&path).unwrap();
        assert_eq!(log.append(&row).unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["seq"], 0);
        assert_eq!(first["boat"], "START");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn writer_task_drains_the_channel() {
        let path =
            std::env::temp_dir().join(format!("boat-statelog-task-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let state = testutil::state();
        let row = StateRow::snapshot(&state);
        let log = JsonlLog::open(&path).unwrap();

        let (tx, rx) = mpsc::channel(8);
        let stop = Arc::new(AtomicBool::new(false));
        let join = spawn(Box::new(log), rx, stop);
        tx.send(row.clone()).await.unwrap();
        tx.send(row).await.unwrap();
        drop(tx); // closing the channel retires the writer
        join.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let last: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(last["seq"], 1);
        let _ = std::fs::remove_file(&path);
    }
}

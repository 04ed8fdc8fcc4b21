use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::actuators::HardwareError;
use crate::inputs::stopped;
use crate::state::{ArmCounters, InputCell, RcFrame};

/// RC receiver source. Returns None when no frame has arrived; the frame
/// cell simply goes stale and the failsafe machinery takes over.
pub trait RcDriver: Send {
    fn read(&mut self) -> Result<Option<RcFrame>, HardwareError>;
}

/// Bench stand-in for an absent transmitter.
#[derive(Default)]
pub struct SimRc {
    pub frame: Option<RcFrame>,
}

impl RcDriver for SimRc {
    fn read(&mut self) -> Result<Option<RcFrame>, HardwareError> {
        Ok(self.frame)
    }
}

/// Edge detector for one button: the line must hold for the dwell before
/// a single edge is reported, and must release before the next one.
struct DebouncedEdge {
    dwell: Duration,
    asserted_since: Option<Instant>,
    fired: bool,
}

impl DebouncedEdge {
    fn new(dwell: Duration) -> Self {
        Self { dwell, asserted_since: None, fired: false }
    }

    fn update(&mut self, level: bool, now: Instant) -> bool {
        if !level {
            self.asserted_since = None;
            self.fired = false;
            return false;
        }
        let since = *self.asserted_since.get_or_insert(now);
        if !self.fired && now.duration_since(since) >= self.dwell {
            self.fired = true;
            return true;
        }
        false
    }
}

pub fn spawn(
    mut driver: Box<dyn RcDriver>,
    frame_cell: InputCell<RcFrame>,
    edge_cell: InputCell<ArmCounters>,
    period: Duration,
    lock_wait: Duration,
    dwell: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut beat = tokio::time::interval(period);
        beat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut arm = DebouncedEdge::new(dwell);
        let mut disarm = DebouncedEdge::new(dwell);
        let mut counters = ArmCounters::default();
        loop {
            beat.tick().await;
            if stopped(&stop) {
                return;
            }
            let now = Instant::now();
            match driver.read() {
                Ok(Some(frame)) => {
                    if arm.update(frame.arm_switch, now) {
                        counters.arm += 1;
                    }
                    if disarm.update(frame.disarm_switch, now) {
                        counters.disarm += 1;
                    }
                    frame_cell.publish(frame, lock_wait).await;
                    edge_cell.publish(counters, lock_wait).await;
                }
                // No frame: the snapshot ages out on its own, but a held
                // button must not fire again from memory.
                Ok(None) => {
                    arm.update(false, now);
                    disarm.update(false, now);
                }
                Err(err) => debug!(%err, "rc read failed"),
            }
        }
    })
}

//! Sensor input tasks. Each source runs its own beat loop on the tokio
//! runtime: read the driver, parse, publish into its snapshot cell under a
//! bounded lock wait, sleep until the next beat. Every task checks a
//! cooperative stop flag once per beat; shutdown joins each with a
//! deadline and abandons stragglers to process exit.

pub mod adc;
pub mod gps;
pub mod imu;
pub mod rc;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct InputHandle {
    pub name: &'static str,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl InputHandle {
    pub fn new(name: &'static str, stop: Arc<AtomicBool>, join: JoinHandle<()>) -> Self {
        Self { name, stop, join }
    }
}

#[derive(Default)]
pub struct InputSet {
    handles: Vec<InputHandle>,
}

impl InputSet {
    pub fn push(&mut self, handle: InputHandle) {
        self.handles.push(handle);
    }

    /// Signal every input to stop, then join each within what is left of
    /// the deadline. A task that fails to exit is left to the OS.
    pub async fn shutdown(self, deadline: Duration) {
        for handle in &self.handles {
            handle.stop.store(true, Ordering::Relaxed);
        }
        let end = Instant::now() + deadline;
        for handle in self.handles {
            let left = end.saturating_duration_since(Instant::now());
            match tokio::time::timeout(left, handle.join).await {
                Ok(Ok(())) => debug!(input = handle.name, "input stopped"),
                Ok(Err(err)) => warn!(input = handle.name, %err, "input task panicked"),
                Err(_) => warn!(input = handle.name, "input missed the shutdown deadline"),
            }
        }
    }
}

pub(crate) fn stopped(stop: &AtomicBool) -> bool {
    stop.load(Ordering::Relaxed)
}

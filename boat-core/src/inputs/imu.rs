use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use boat_types::Orientation;

use crate::actuators::HardwareError;
use crate::inputs::stopped;
use crate::state::InputCell;

/// Fused attitude source. The I²C implementation lives outside the core.
pub trait ImuDriver: Send {
    fn read(&mut self) -> Result<Orientation, HardwareError>;
}

/// Bench stand-in: a stable magnetic heading with a slow wander.
pub struct SimImu {
    heading: f64,
}

impl SimImu {
    pub fn new(heading: f64) -> Self {
        Self { heading }
    }
}

impl ImuDriver for SimImu {
    fn read(&mut self) -> Result<Orientation, HardwareError> {
        self.heading = (self.heading + 0.05) % 360.0;
        Ok(Orientation::new(0.0, 0.0, self.heading, true))
    }
}

pub fn spawn(
    mut driver: Box<dyn ImuDriver>,
    cell: InputCell<Orientation>,
    period: Duration,
    lock_wait: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut beat = tokio::time::interval(period);
        beat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            beat.tick().await;
            if stopped(&stop) {
                return;
            }
            match driver.read() {
                Ok(sample) => {
                    cell.publish(sample.normalize(), lock_wait).await;
                }
                // A bad read just leaves the snapshot to go stale.
                Err(err) => debug!(%err, "imu read failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_normalized_samples() {
        let cell = InputCell::new();
        let stop = Arc::new(AtomicBool::new(false));
        let join = spawn(
            Box::new(SimImu::new(359.99)),
            cell.clone(),
            Duration::from_millis(5),
            Duration::from_millis(5),
            stop.clone(),
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        let sample = cell.sample().expect("orientation published").value;
        assert!(sample.is_valid());
        assert!((0.0..360.0).contains(&sample.heading));
        assert!(sample.magnetic);
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = join.await;
    }
}

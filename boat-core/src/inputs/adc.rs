use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::actuators::HardwareError;
use crate::inputs::stopped;
use crate::state::{AnalogMap, InputCell};

/// Scaled analog channel source (volts or amps, by channel name).
pub trait AdcDriver: Send {
    fn read(&mut self) -> Result<AnalogMap, HardwareError>;
}

/// Bench stand-in with healthy electrical numbers.
pub struct SimAdc {
    pub battery_volts: f64,
}

impl Default for SimAdc {
    fn default() -> Self {
        Self { battery_volts: 13.2 }
    }
}

impl AdcDriver for SimAdc {
    fn read(&mut self) -> Result<AnalogMap, HardwareError> {
        let mut map = AnalogMap::new();
        map.insert("battery_mon".into(), self.battery_volts);
        map.insert("mot_v".into(), self.battery_volts);
        map.insert("mot_i".into(), 0.4);
        map.insert("charge_v".into(), 14.1);
        map.insert("charge_i".into(), 0.2);
        Ok(map)
    }
}

pub fn spawn(
    mut driver: Box<dyn AdcDriver>,
    cell: InputCell<AnalogMap>,
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
                Ok(map) => {
                    cell.publish(map, lock_wait).await;
                }
                Err(err) => debug!(%err, "adc read failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_the_channel_map() {
        let cell = InputCell::new();
        let stop = Arc::new(AtomicBool::new(false));
        let join = spawn(
            Box::new(SimAdc::default()),
            cell.clone(),
            Duration::from_millis(5),
            Duration::from_millis(5),
            stop.clone(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        let map = cell.sample().expect("analog published").value;
        assert_eq!(map.get("battery_mon"), Some(&13.2));
        assert!(map.contains_key("mot_i"));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = join.await;
    }
}

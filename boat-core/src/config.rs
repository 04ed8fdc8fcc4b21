use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
/// Environment variable that overrides the configuration file path.
pub const CONFIG_ENV: &str = "BOAT_CONFIG";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub control: ControlCfg,
    pub timeouts: TimeoutCfg,
    pub helm: HelmCfg,
    pub nav: NavCfg,
    pub throttle: ThrottleCfg,
    pub battery: BatteryCfg,
    pub hardware: HardwareCfg,
    pub gps: GpsCfg,
    pub imu: BeatCfg,
    pub adc: BeatCfg,
    pub rc: BeatCfg,
    pub shore: ShoreCfg,
    pub magvar: MagvarCfg,
    pub log: LogCfg,
}

impl Config {
    /// Load from `BOAT_CONFIG` or the default path. A missing or invalid
    /// file is a start-up failure; the caller exits non-zero.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {path}"))?;
        toml::from_str(&text).with_context(|| format!("parsing configuration file {path}"))
    }
}

// ─── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Control loop period, milliseconds.
    pub frame_len_ms: u64,
    /// Commands drained per tick; 0 drains the whole queue.
    pub cmds_per_tick: usize,
    /// How long to wait for input tasks to exit at shutdown.
    pub shutdown_deadline_ms: u64,
    /// Bound on recorded track points kept for the path dump.
    pub track_history_len: usize,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self { frame_len_ms: 500, cmds_per_tick: 0, shutdown_deadline_ms: 2_000, track_history_len: 10_000 }
    }
}

impl ControlCfg {
    pub fn frame_len(&self) -> Duration {
        Duration::from_millis(self.frame_len_ms)
    }
    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutCfg {
    pub gps_fresh_s: u64,
    pub rc_fresh_ms: u64,
    pub imu_fresh_ms: u64,
    pub shore_s: u64,
    pub selftest_s: u64,
    pub arm_dwell_ms: u64,
    pub disarm_pulse_ms: u64,
    pub horn_s: u64,
    /// Declination recompute interval, seconds.
    pub magvar_refresh_s: u64,
}

impl Default for TimeoutCfg {
    fn default() -> Self {
        Self {
            gps_fresh_s: 5,
            rc_fresh_ms: 500,
            imu_fresh_ms: 500,
            shore_s: 60,
            selftest_s: 30,
            arm_dwell_ms: 50,
            disarm_pulse_ms: 50,
            horn_s: 2,
            magvar_refresh_s: 60,
        }
    }
}

impl TimeoutCfg {
    pub fn gps_fresh(&self) -> Duration {
        Duration::from_secs(self.gps_fresh_s)
    }
    pub fn rc_fresh(&self) -> Duration {
        Duration::from_millis(self.rc_fresh_ms)
    }
    pub fn imu_fresh(&self) -> Duration {
        Duration::from_millis(self.imu_fresh_ms)
    }
    pub fn shore(&self) -> Duration {
        Duration::from_secs(self.shore_s)
    }
    pub fn selftest(&self) -> Duration {
        Duration::from_secs(self.selftest_s)
    }
    pub fn arm_dwell(&self) -> Duration {
        Duration::from_millis(self.arm_dwell_ms)
    }
    pub fn disarm_pulse(&self) -> Duration {
        Duration::from_millis(self.disarm_pulse_ms)
    }
    pub fn horn(&self) -> Duration {
        Duration::from_secs(self.horn_s)
    }
    pub fn magvar_refresh(&self) -> Duration {
        Duration::from_secs(self.magvar_refresh_s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HelmCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub rudder_min: f64,
    pub rudder_max: f64,
}

impl Default for HelmCfg {
    fn default() -> Self {
        Self { kp: 1.0, ki: 0.0, kd: 0.1, rudder_min: -30.0, rudder_max: 30.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavCfg {
    /// Arrival radius for a waypoint, metres.
    pub waypoint_accuracy_m: f64,
    /// Anchor hold radius, metres.
    pub anchor_hold_m: f64,
    /// Throttle level used under way in autonomous modes.
    pub cruise_throttle: i8,
    /// Degrees of rudder per unit of RC rudder stick.
    pub rc_rudder_scale: f64,
    /// Cap on the summed strength of dodge influences.
    pub influence_strength_max: f64,
}

impl Default for NavCfg {
    fn default() -> Self {
        Self {
            waypoint_accuracy_m: 10.0,
            anchor_hold_m: 15.0,
            cruise_throttle: 3,
            rc_rudder_scale: 30.0,
            influence_strength_max: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleCfg {
    pub min: i8,
    pub max: i8,
    /// Minimum dwell at zero when the commanded sign reverses, milliseconds.
    pub reverse_dwell_ms: u64,
}

impl Default for ThrottleCfg {
    fn default() -> Self {
        Self { min: -5, max: 5, reverse_dwell_ms: 50 }
    }
}

impl ThrottleCfg {
    pub fn reverse_dwell(&self) -> Duration {
        Duration::from_millis(self.reverse_dwell_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatteryCfg {
    pub low_volts: f64,
    pub channel: String,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self { low_volts: 12.0, channel: "battery_mon".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareCfg {
    /// Output driver backend. "sim" logs actuator writes; real GPIO/PWM
    /// drivers register under their own names.
    pub driver: String,
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self { driver: "sim".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpsCfg {
    pub host: String,
    pub port: u16,
    pub beat_ms: u64,
    pub lock_wait_ms: u64,
    pub reconnect_ms: u64,
    pub ais_max_age_s: i64,
    pub ais_max_range_m: f64,
}

impl Default for GpsCfg {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2947,
            beat_ms: 200,
            lock_wait_ms: 5,
            reconnect_ms: 1_000,
            ais_max_age_s: 600,
            ais_max_range_m: 18_520.0, // 10 nmi
        }
    }
}

impl GpsCfg {
    pub fn beat(&self) -> Duration {
        Duration::from_millis(self.beat_ms)
    }
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

/// Beat settings shared by the polled inputs (IMU, ADC, RC).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeatCfg {
    pub beat_ms: u64,
    pub lock_wait_ms: u64,
}

impl Default for BeatCfg {
    fn default() -> Self {
        Self { beat_ms: 100, lock_wait_ms: 5 }
    }
}

impl BeatCfg {
    pub fn beat(&self) -> Duration {
        Duration::from_millis(self.beat_ms)
    }
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShoreCfg {
    pub bind: String,
    pub peer: String,
    pub beat_ms: u64,
}

impl Default for ShoreCfg {
    fn default() -> Self {
        Self { bind: "0.0.0.0:4040".to_string(), peer: "127.0.0.1:4041".to_string(), beat_ms: 100 }
    }
}

impl ShoreCfg {
    pub fn beat(&self) -> Duration {
        Duration::from_millis(self.beat_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MagvarCfg {
    pub model: PathBuf,
}

impl Default for MagvarCfg {
    fn default() -> Self {
        Self { model: PathBuf::from("magvar.toml") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogCfg {
    pub state_log: PathBuf,
    pub dump_dir: PathBuf,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self { state_log: PathBuf::from("state.jsonl"), dump_dir: PathBuf::from("dumps") }
    }
}

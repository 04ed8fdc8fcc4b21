mod actuators;
mod commands;
mod config;
mod helm;
mod inputs;
mod modes;
mod scheduler;
mod shore;
mod state;
mod statelog;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::bail;
use tokio::sync::mpsc;
use tracing::{info, warn};

use boat_types::MagModel;

use actuators::{Actuators, SimBank, SimServo};
use config::Config;
use inputs::adc::SimAdc;
use inputs::imu::SimImu;
use inputs::rc::SimRc;
use inputs::{InputHandle, InputSet};
use scheduler::{InputCells, Scheduler};
use state::BoatState;
use statelog::{JsonlLog, NullLog, StateLog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boat_core=info".into()),
        )
        .init();

    let cfg = Arc::new(Config::load()?);
    info!(version = env!("CARGO_PKG_VERSION"), "boat control core starting");

    // Magnetic variation model. Losing it costs declination accuracy, not
    // the boat; run on with the cached zero.
    let mag_model = match MagModel::load(&cfg.magvar.model) {
        Ok(model) => Some(model),
        Err(err) => {
            warn!(%err, "magnetic model unavailable; declination held at 0");
            None
        }
    };

    if cfg.hardware.driver != "sim" {
        bail!("unknown hardware driver {:?}", cfg.hardware.driver);
    }
    let actuators =
        Actuators::new(Box::new(SimBank::default()), Box::new(SimServo::default()), &cfg);
    let state = BoatState::new(cfg.clone(), actuators);

    // Input tasks, one stop flag each.
    let cells = InputCells::default();
    let mut inputs = InputSet::default();

    let stop_gps = Arc::new(AtomicBool::new(false));
    let join =
        inputs::gps::spawn(cfg.clone(), cells.gps.clone(), cells.ais.clone(), stop_gps.clone());
    inputs.push(InputHandle::new("gps", stop_gps, join));

    let stop_imu = Arc::new(AtomicBool::new(false));
    let join = inputs::imu::spawn(
        Box::new(SimImu::new(0.0)),
        cells.orientation.clone(),
        cfg.imu.beat(),
        cfg.imu.lock_wait(),
        stop_imu.clone(),
    );
    inputs.push(InputHandle::new("imu", stop_imu, join));

    let stop_adc = Arc::new(AtomicBool::new(false));
    let join = inputs::adc::spawn(
        Box::new(SimAdc::default()),
        cells.analog.clone(),
        cfg.adc.beat(),
        cfg.adc.lock_wait(),
        stop_adc.clone(),
    );
    inputs.push(InputHandle::new("adc", stop_adc, join));

    let stop_rc = Arc::new(AtomicBool::new(false));
    let join = inputs::rc::spawn(
        Box::new(SimRc::default()),
        cells.rc.clone(),
        cells.arm.clone(),
        cfg.rc.beat(),
        cfg.rc.lock_wait(),
        cfg.timeouts.arm_dwell(),
        stop_rc.clone(),
    );
    inputs.push(InputHandle::new("rc", stop_rc, join));

    // Shore bridge. A dead bind is a start-up failure; the operator has no
    // way to reach an unreachable boat.
    let transport = shore::UdpShore::bind(&cfg.shore.bind, &cfg.shore.peer).await?;
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames_rx) = mpsc::channel(8);
    let link_ok = Arc::new(AtomicBool::new(true));
    let stop_tele = Arc::new(AtomicBool::new(false));
    let join = shore::spawn(
        Box::new(transport),
        frames_rx,
        cmd_tx,
        cells.shore_contact.clone(),
        link_ok.clone(),
        cfg.shore.beat(),
        cfg.gps.lock_wait(),
        stop_tele.clone(),
    );
    inputs.push(InputHandle::new("tele", stop_tele, join));

    // State log writer: the control loop hands rows over a channel and
    // never touches the disk itself.
    let log: Box<dyn StateLog> = match JsonlLog::open(&cfg.log.state_log) {
        Ok(log) => Box::new(log),
        Err(err) => {
            warn!(%err, "state log unavailable; rows discarded");
            Box::new(NullLog)
        }
    };
    let (log_tx, log_rx) = mpsc::channel(64);
    let stop_log = Arc::new(AtomicBool::new(false));
    let join = statelog::spawn(log, log_rx, stop_log.clone());
    inputs.push(InputHandle::new("statelog", stop_log, join));

    let stop_ctrl = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_ctrl.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    Scheduler::new(state, cells, cmd_rx, frames_tx, log_tx, mag_model, link_ok, stop_ctrl)
        .run()
        .await?;

    inputs.shutdown(cfg.control.shutdown_deadline()).await;
    info!("clean shutdown");
    Ok(())
}

//! Shore bridge: the telemetry/command task ("TELE"). The control loop
//! hands it one `TelemetryFrame` per tick over a channel; inbound shore
//! traffic becomes `CommandMsg`s on the command FIFO. The broker itself
//! sits behind `ShoreTransport`; the default transport speaks JSON
//! envelopes over UDP to a configured peer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use boat_types::CommandMsg;

use crate::inputs::stopped;
use crate::state::{BoatState, InputCell};

// ─── Topics ───────────────────────────────────────────────────────────────────

pub const TOPIC_SPEED_LOCATION: &str = "SpeedLocation";
pub const TOPIC_MODE: &str = "Mode";
pub const TOPIC_BEARING: &str = "Bearing";
pub const TOPIC_GPS_COURSE: &str = "GPSCourse";
pub const TOPIC_BATTERY: &str = "BatteryVoltage";
pub const TOPIC_RUDDER: &str = "RudderPosition";
pub const TOPIC_THROTTLE: &str = "ThrottlePosition";
pub const TOPIC_FAULT: &str = "FaultString";
pub const TOPIC_PID: &str = "PID_K";

/// One control tick's outgoing telemetry: one payload per topic.
#[derive(Debug, Clone, Default)]
pub struct TelemetryFrame {
    pub topics: Vec<(&'static str, String)>,
}

/// Snapshot the state into a telemetry frame. CSV bodies except for the
/// PID gains, which go out as JSON.
pub fn build_frame(state: &mut BoatState) -> TelemetryFrame {
    let mut topics = Vec::with_capacity(9 + state.outbox.len());

    let (speed, lat, lon, track) = match state.last_fix.as_ref().map(|s| &s.value) {
        Some(fix) => (fix.speed, fix.fix.lat, fix.fix.lon, fix.track),
        None => (0.0, f64::NAN, f64::NAN, f64::NAN),
    };
    topics.push((TOPIC_SPEED_LOCATION, format!("{speed:.2},{lat:.6},{lon:.6},0.0")));
    topics.push((
        TOPIC_MODE,
        format!("{}:{}:{}:{}", state.boat_mode, state.nav_mode, state.auto_mode, state.rc_mode),
    ));
    let mag = state
        .last_orientation
        .as_ref()
        .map(|s| s.value.make_mag().heading)
        .unwrap_or(f64::NAN);
    let true_heading = state.true_heading().unwrap_or(f64::NAN);
    topics.push((TOPIC_BEARING, format!("{true_heading:.1},{mag:.1}")));
    topics.push((TOPIC_GPS_COURSE, format!("{track:.1}")));
    let volts = state.battery_volts().unwrap_or(f64::NAN);
    topics.push((TOPIC_BATTERY, format!("{volts:.2}")));
    topics.push((TOPIC_RUDDER, format!("{:.1}", state.actuators.rudder_position())));
    topics.push((TOPIC_THROTTLE, format!("{}", state.actuators.throttle())));
    topics.push((TOPIC_FAULT, state.fault_string()));
    let gains = state.gains;
    topics.push((
        TOPIC_PID,
        json!({"Kp": gains.kp, "Ki": gains.ki, "Kd": gains.kd}).to_string(),
    ));

    // One-shot topics queued by command handlers.
    topics.append(&mut state.outbox);
    TelemetryFrame { topics }
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// The seam to the real broker bridge. Both calls are non-blocking; the
/// TELE beat provides the pacing.
pub trait ShoreTransport: Send {
    fn publish(&mut self, topic: &str, payload: &str) -> anyhow::Result<()>;
    /// Drain whatever inbound envelopes have arrived since the last beat.
    fn poll_inbound(&mut self) -> Vec<CommandMsg>;
}

/// JSON-over-UDP shore link: `{"topic","payload"}` out, command
/// envelopes in.
pub struct UdpShore {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpShore {
    pub async fn bind(bind: &str, peer: &str) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind).await.with_context(|| format!("binding {bind}"))?;
        let peer: SocketAddr = peer.parse().with_context(|| format!("peer address {peer}"))?;
        info!(%peer, "shore link up");
        Ok(Self { socket, peer })
    }
}

impl ShoreTransport for UdpShore {
    fn publish(&mut self, topic: &str, payload: &str) -> anyhow::Result<()> {
        let body = json!({"topic": topic, "payload": payload}).to_string();
        match self.socket.try_send_to(body.as_bytes(), self.peer) {
            Ok(_) => Ok(()),
            // A full socket buffer drops the message, not the link.
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn poll_inbound(&mut self) -> Vec<CommandMsg> {
        let mut inbound = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, src)) => match serde_json::from_slice::<CommandMsg>(&buf[..len]) {
                    Ok(msg) => inbound.push(msg),
                    Err(err) => debug!(%src, %err, "malformed shore datagram"),
                },
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(%err, "shore recv error");
                    break;
                }
            }
        }
        inbound
    }
}

// ─── TELE task ────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    mut transport: Box<dyn ShoreTransport>,
    mut frames: mpsc::Receiver<TelemetryFrame>,
    cmd_tx: mpsc::UnboundedSender<CommandMsg>,
    contact: InputCell<()>,
    link_ok: Arc<AtomicBool>,
    beat: Duration,
    lock_wait: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(beat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if stopped(&stop) {
                return;
            }

            // Inbound: every decodable envelope is both a command and
            // proof of shore contact.
            for msg in transport.poll_inbound() {
                contact.publish((), lock_wait).await;
                if cmd_tx.send(msg).is_err() {
                    return; // control loop is gone
                }
            }

            // Outbound: drain whatever the control loop has queued.
            let mut healthy = true;
            while let Ok(frame) = frames.try_recv() {
                for (topic, payload) in &frame.topics {
                    if let Err(err) = transport.publish(topic, payload) {
                        warn!(topic, %err, "telemetry publish failed");
                        healthy = false;
                    }
                }
            }
            if healthy {
                link_ok.store(true, Ordering::Relaxed);
            } else {
                link_ok.store(false, Ordering::Relaxed);
            }
        }
    })
}

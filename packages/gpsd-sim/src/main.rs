//! main.rs — gpsd stream simulator
//!
//! Serves a gpsd-style newline-delimited JSON stream over TCP so the boat
//! core can run on a bench with no receiver attached:
//!   1. Physics loop: advances the own-ship track and a small AIS fleet
//!   2. TCP server: per-client task streaming TPV at the configured rate,
//!      with AIS position reports interleaved every few seconds
//!
//! Clients get a VERSION banner on connect, like the real daemon; the
//! ?WATCH line they send is read and discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "gpsd-sim", about = "gpsd-style TPV/AIS stream simulator")]
struct Args {
    /// TCP port to listen on (gpsd's default)
    #[arg(long, default_value = "2947")]
    port: u16,
    /// TPV reports per second
    #[arg(long, default_value = "1.0")]
    rate: f64,
    /// Start latitude
    #[arg(long, default_value = "47.560644")]
    lat: f64,
    /// Start longitude
    #[arg(long, default_value = "-122.338816")]
    lon: f64,
    /// Course over ground, degrees true
    #[arg(long, default_value = "90.0")]
    heading: f64,
    /// Speed over ground, m/s
    #[arg(long, default_value = "2.0")]
    speed: f64,
    /// Number of synthetic AIS ships
    #[arg(long, default_value = "3")]
    fleet: usize,
}

// ── World state ───────────────────────────────────────────────────────────────

const EARTH_RADIUS_M: f64 = 6_371_009.0;

#[derive(Debug, Clone)]
struct Ship {
    mmsi: u32,
    name: String,
    lat: f64,
    lon: f64,
    course: f64,
    speed_kn: f64,
}

#[derive(Debug, Clone)]
struct World {
    lat: f64,
    lon: f64,
    track: f64,
    speed: f64,
    fleet: Vec<Ship>,
}

impl World {
    fn new(args: &Args) -> Self {
        let mut rng = rand::thread_rng();
        let fleet = (0..args.fleet)
            .map(|i| Ship {
                mmsi: 367_000_000 + i as u32,
                name: format!("SIM SHIP {:02}", i + 1),
                lat: args.lat + rng.gen_range(-0.02..0.02),
                lon: args.lon + rng.gen_range(-0.02..0.02),
                course: rng.gen_range(0.0..360.0),
                speed_kn: rng.gen_range(2.0..12.0),
            })
            .collect();
        Self { lat: args.lat, lon: args.lon, track: args.heading, speed: args.speed, fleet }
    }

    /// Advance every track by dt seconds with a little Gaussian wander.
    fn advance(&mut self, dt: f64, jitter: &Normal<f64>) {
        let mut rng = rand::thread_rng();
        self.track = (self.track + jitter.sample(&mut rng)).rem_euclid(360.0);
        let (dlat, dlon) = step(self.lat, self.track, self.speed * dt);
        self.lat += dlat;
        self.lon += dlon;

        for ship in &mut self.fleet {
            ship.course = (ship.course + jitter.sample(&mut rng)).rem_euclid(360.0);
            let metres = ship.speed_kn * 0.514444 * dt;
            let (dlat, dlon) = step(ship.lat, ship.course, metres);
            ship.lat += dlat;
            ship.lon += dlon;
        }
    }

    fn tpv(&self) -> String {
        json!({
            "class": "TPV",
            "device": "sim0",
            "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "mode": 3,
            "lat": self.lat,
            "lon": self.lon,
            "alt": 0.0,
            "track": self.track,
            "speed": self.speed,
            "climb": 0.0,
            "epx": 3.0,
            "epy": 3.0,
            "eps": 0.5,
        })
        .to_string()
    }

    fn ais(&self, ship: &Ship) -> String {
        json!({
            "class": "AIS",
            "device": "sim0",
            "type": 1,
            "mmsi": ship.mmsi,
            "status": 0,
            "lat": ship.lat,
            "lon": ship.lon,
            "speed": ship.speed_kn,
            "course": ship.course,
            "heading": ship.course,
            "shipname": ship.name,
        })
        .to_string()
    }
}

/// Flat-earth step: degrees of lat/lon for a run of `metres` on `course`.
fn step(lat: f64, course: f64, metres: f64) -> (f64, f64) {
    let rad = course.to_radians();
    let north = metres * rad.cos();
    let east = metres * rad.sin();
    let dlat = (north / EARTH_RADIUS_M).to_degrees();
    let dlon = (east / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
    (dlat, dlon)
}

// ── Server ────────────────────────────────────────────────────────────────────

type SharedWorld = Arc<RwLock<World>>;

async fn serve_client(stream: TcpStream, world: SharedWorld, rate: f64) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".into());
    info!(%peer, "client connected");
    let (read_half, mut write_half) = stream.into_split();

    // Swallow whatever the client sends (?WATCH and friends).
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    let banner = json!({
        "class": "VERSION",
        "release": "sim",
        "rev": env!("CARGO_PKG_VERSION"),
        "proto_major": 3,
        "proto_minor": 14,
    })
    .to_string();
    if write_half.write_all(format!("{banner}\n").as_bytes()).await.is_err() {
        return;
    }

    let mut ticker = interval(Duration::from_secs_f64(1.0 / rate));
    let mut beat: u64 = 0;
    loop {
        ticker.tick().await;
        beat += 1;
        let world = world.read().await.clone();
        let mut body = world.tpv();
        body.push('\n');
        // AIS fleet comes through every five beats, one report per ship.
        if beat % 5 == 0 {
            for ship in &world.fleet {
                body.push_str(&world.ais(ship));
                body.push('\n');
            }
        }
        if let Err(err) = write_half.write_all(body.as_bytes()).await {
            info!(%peer, %err, "client gone");
            return;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpsd_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    info!(
        port = args.port,
        rate = args.rate,
        fleet = args.fleet,
        "gpsd simulator starting at ({:.6}, {:.6})",
        args.lat,
        args.lon
    );

    let world: SharedWorld = Arc::new(RwLock::new(World::new(&args)));

    // Physics loop at 10 Hz.
    {
        let world = world.clone();
        tokio::spawn(async move {
            let jitter = Normal::new(0.0, 0.8).expect("jitter sigma");
            let dt = 0.1;
            let mut ticker = interval(Duration::from_secs_f64(dt));
            loop {
                ticker.tick().await;
                world.write().await.advance(dt, &jitter);
            }
        });
    }

    let listener = match TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(l) => l,
        Err(err) => {
            warn!(port = args.port, %err, "bind failed");
            std::process::exit(1);
        }
    };
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve_client(stream, world.clone(), args.rate));
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use boat_types::{AisContact, GpsFix, GpsdReport};

use crate::config::Config;
use crate::inputs::stopped;
use crate::state::InputCell;

/// gpsd watch handshake: switch the daemon to NDJSON reporting.
const WATCH: &str = "?WATCH={\"enable\":true,\"json\":true}\n";

/// Spawn the GPS input: a reconnecting TCP client on the gpsd stream.
/// TPV reports refresh the fix cell; AIS reports upsert the contact map,
/// which is pruned against age and range every beat.
pub fn spawn(
    cfg: Arc<Config>,
    fix_cell: InputCell<GpsFix>,
    ais_cell: InputCell<HashMap<u32, AisContact>>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", cfg.gps.host, cfg.gps.port);
        let mut contacts: HashMap<u32, AisContact> = HashMap::new();

        while !stopped(&stop) {
            let stream = match TcpStream::connect(&addr).await {
                Ok(s) => s,
                Err(err) => {
                    debug!(%addr, %err, "gpsd connect failed");
                    tokio::time::sleep(cfg.gps.reconnect()).await;
                    continue;
                }
            };
            info!(%addr, "connected to gpsd");
            let mut stream = BufReader::new(stream);
            if let Err(err) = stream.get_mut().write_all(WATCH.as_bytes()).await {
                warn!(%err, "gpsd watch handshake failed");
                tokio::time::sleep(cfg.gps.reconnect()).await;
                continue;
            }

            let mut line = String::new();
            loop {
                if stopped(&stop) {
                    return;
                }
                line.clear();
                let read =
                    tokio::time::timeout(cfg.gps.beat(), stream.read_line(&mut line)).await;
                match read {
                    Ok(Ok(0)) => {
                        warn!("gpsd stream closed");
                        break;
                    }
                    Ok(Ok(_)) => {
                        handle_line(&cfg, line.trim(), &fix_cell, &mut contacts).await;
                    }
                    Ok(Err(err)) => {
                        warn!(%err, "gpsd read error");
                        break;
                    }
                    // No line this beat; fall through to the prune.
                    Err(_) => {}
                }
                prune_and_publish(&cfg, &fix_cell, &ais_cell, &mut contacts).await;
            }
            tokio::time::sleep(cfg.gps.reconnect()).await;
        }
    })
}

async fn handle_line(
    cfg: &Config,
    line: &str,
    fix_cell: &InputCell<GpsFix>,
    contacts: &mut HashMap<u32, AisContact>,
) {
    if line.is_empty() {
        return;
    }
    let now = Utc::now();
    match serde_json::from_str::<GpsdReport>(line) {
        Ok(GpsdReport::Tpv(tpv)) => {
            let fix = GpsFix::from_tpv(&tpv, now);
            fix_cell.publish(fix, cfg.gps.lock_wait()).await;
        }
        Ok(GpsdReport::Ais(report)) => {
            contacts
                .entry(report.mmsi)
                .or_insert_with(|| AisContact::new(report.mmsi, now))
                .update_from(&report, now);
        }
        // Classes the core does not consume, and garbage, both land here.
        Err(err) => debug!(%err, "dropped gpsd record"),
    }
}

async fn prune_and_publish(
    cfg: &Config,
    fix_cell: &InputCell<GpsFix>,
    ais_cell: &InputCell<HashMap<u32, AisContact>>,
    contacts: &mut HashMap<u32, AisContact>,
) {
    let now = Utc::now();
    let here = fix_cell.sample().filter(|s| s.value.is_valid()).map(|s| s.value.fix);
    let max_age = chrono::Duration::seconds(cfg.gps.ais_max_age_s);
    let before = contacts.len();
    contacts.retain(|_, c| !c.should_prune(now, here.as_ref(), max_age, cfg.gps.ais_max_range_m));
    if contacts.len() != before {
        debug!(pruned = before - contacts.len(), kept = contacts.len(), "ais prune");
    }
    ais_cell.publish(contacts.clone(), cfg.gps.lock_wait()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::InputHandle;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const TPV: &str = "{\"class\":\"TPV\",\"mode\":3,\"lat\":47.56,\"lon\":-122.34,\"speed\":2.0,\"track\":10.0}";
    const AIS: &str = "{\"class\":\"AIS\",\"type\":1,\"mmsi\":367000001,\"lat\":47.57,\"lon\":-122.33,\"speed\":5.0,\"course\":180.0}";
    const SKY: &str = "{\"class\":\"SKY\",\"satellites\":[]}";

    #[tokio::test]
    async fn consumes_a_gpsd_stream_end_to_end() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // A one-shot fake gpsd: expect the watch line, emit three records.
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let _ = sock.read(&mut buf).await.unwrap();
            let body = format!("{TPV}\n{AIS}\n{SKY}\n");
            sock.write_all(body.as_bytes()).await.unwrap();
            // Hold the socket open while the reader drains it.
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        });

        let mut cfg = Config::default();
        cfg.gps.host = "127.0.0.1".into();
        cfg.gps.port = port;
        cfg.gps.beat_ms = 20;
        let cfg = Arc::new(cfg);

        let fix_cell = InputCell::new();
        let ais_cell = InputCell::new();
        let stop = Arc::new(AtomicBool::new(false));
        let join = spawn(cfg, fix_cell.clone(), ais_cell.clone(), stop.clone());
        let handle = InputHandle::new("gps", stop, join);

        // Give the task a few beats to drain the stream.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let fix = fix_cell.sample().expect("fix published").value;
        assert!(fix.is_valid());
        assert!((fix.fix.lat - 47.56).abs() < 1e-9);

        let contacts = ais_cell.sample().expect("ais published").value;
        assert_eq!(contacts.len(), 1);
        assert!(contacts.contains_key(&367_000_001));

        let mut set = crate::inputs::InputSet::default();
        set.push(handle);
        set.shutdown(std::time::Duration::from_millis(500)).await;
    }
}

mod scenario;

use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use plog_core::{
    config::{self, AppConfig},
    models::{PlayerId, TICKS_PER_SECOND},
    persist::{BlobStore, FileBlobStore},
    sync::{LoopbackHub, SyncLayer, SyncRole},
    world::SharedWorld,
    LogisticsSession,
};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

const SEED: &str = "demo-seed-1337";
const SIMULATED_SECONDS: u64 = 90;
const FRAME: Duration = Duration::from_millis(50);
const LITTER_OBJECT: u64 = 9001;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    let host_store = peer_store(&config.data_root, "host");
    let guest_store = peer_store(&config.data_root, "guest");
    let world = scenario::build_world();

    let hub = LoopbackHub::new();
    let host_id = PlayerId::compute("host", SEED);
    let guest_id = PlayerId::compute("guest", SEED);

    let mut host = LogisticsSession::new(
        config.clone(),
        world.clone(),
        host_store,
        SyncLayer::new(SyncRole::Authority, host_id, hub.transport_for(host_id)),
    );
    hub.connect(host_id, host.inbox(), true);
    let mut guest = LogisticsSession::new(
        config,
        world.clone(),
        guest_store,
        SyncLayer::new(SyncRole::Client, guest_id, hub.transport_for(guest_id)),
    );
    hub.connect(guest_id, guest.inbox(), false);

    host.start(SEED, "host", Arc::new(world.clone()))
        .context("failed to start host session")?;
    guest
        .start(SEED, "guest", Arc::new(world.clone()))
        .context("failed to start guest session")?;

    run(&mut host, &mut guest, &world).await;

    for session in [&mut host, &mut guest] {
        if let Err(err) = session.end_game() {
            warn!(player = %session.player_id(), "{err:#}");
        }
    }
    hub.disconnect(guest_id);
    hub.disconnect(host_id);
    Ok(())
}

/// Each peer stands in for a separate machine, so each gets its own save root.
fn peer_store(data_root: &Path, peer: &str) -> Arc<dyn BlobStore> {
    Arc::new(FileBlobStore::new(data_root.join(peer)))
}

async fn run(
    host: &mut LogisticsSession<SharedWorld>,
    guest: &mut LogisticsSession<SharedWorld>,
    world: &SharedWorld,
) {
    let scene = scenario::ghost_scene();
    let mut frame = tokio::time::interval(FRAME);

    for second in 0..SIMULATED_SECONDS {
        frame.tick().await;
        match second {
            1 => {
                host.set_desired_item(scenario::IRON_INGOT, 100, 150);
                host.set_desired_item(scenario::GEAR, 20, 40);
                guest.set_desired_item(scenario::COPPER_INGOT, 50, 80);
            }
            20 => {
                world.with(|w| w.add_trash(LITTER_OBJECT, scenario::GEAR, 7));
                if !host.on_trash_added(scenario::GEAR, 7, LITTER_OBJECT) {
                    info!("litter left on the ground");
                }
            }
            _ => {}
        }

        host.on_tick(TICKS_PER_SECOND);
        guest.on_tick(TICKS_PER_SECOND);

        if second % 10 == 0 {
            if let Some(text) = host.hud_text(Some(&scene)) {
                for line in text.lines() {
                    info!(player = %host.player_id(), "{line}");
                }
            }
        }
    }
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("plog-sim.log"))
        .context("failed to open log file")?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use plog_core::persist::{load_json, save_json};

    use super::*;

    #[test]
    fn peers_keep_separate_saves() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let host = peer_store(dir.path(), "host");
        let guest = peer_store(dir.path(), "guest");

        save_json(host.as_ref(), "cross_seed/demo", &vec![1u32])?;
        save_json(guest.as_ref(), "cross_seed/demo", &vec![2u32])?;

        assert_eq!(load_json::<Vec<u32>>(host.as_ref(), "cross_seed/demo"), Some(vec![1]));
        assert_eq!(load_json::<Vec<u32>>(guest.as_ref(), "cross_seed/demo"), Some(vec![2]));
        Ok(())
    }
}

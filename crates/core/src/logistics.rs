//! Process-wide logistics context driven by the host tick.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    cross_seed::{BufferedObservation, CrossSeedInventoryState},
    desired::{DesiredInventoryStore, DesiredItemEntry, NO_RECYCLE_LIMIT},
    error::LogisticsError,
    hud::{self, GhostScene},
    manager::{PersonalLogisticsManager, SyncReport},
    models::{ItemId, PlayerId},
    network::LogisticsNetwork,
    persist::BlobStore,
    shipping::{ItemLoadState, ProcessReport, ShippingManager},
    sync::{DrainReport, InboxHandle, SyncLayer},
    trash::{TrashHandler, TrashReport},
    world::{NetworkScanner, World},
};

/// What happened during one [`LogisticsSession::on_tick`] call.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Inbound packets applied or dropped.
    pub drained: DrainReport,
    /// Set when a reconciliation pass was due.
    pub sync: Option<SyncReport>,
    /// Set when maintenance was due.
    pub shipping: Option<ProcessReport>,
    /// Set when maintenance was due.
    pub trash: Option<TrashReport>,
}

/// Owns every logistics component for one player in one game.
///
/// Lifecycle is `new` → `start` → `on_tick`* → `end_game`. A session can be
/// started again after `end_game`; each start builds a fresh network index.
pub struct LogisticsSession<W: World> {
    config: AppConfig,
    world: W,
    store: Arc<dyn BlobStore>,
    sync: SyncLayer,
    network: LogisticsNetwork,
    manager: PersonalLogisticsManager,
    shipping: ShippingManager,
    trash: TrashHandler,
    cross_seed: CrossSeedInventoryState,
    session_id: Option<String>,
    started: bool,
    game_tick: u64,
    sync_timer: u64,
    maintenance_timer: u64,
    load_state_timer: u64,
}

impl<W: World> LogisticsSession<W> {
    /// Assemble a session for the player `sync` speaks for.
    pub fn new(config: AppConfig, world: W, store: Arc<dyn BlobStore>, sync: SyncLayer) -> Self {
        let player_id = sync.local_player();
        Self {
            manager: PersonalLogisticsManager::new(player_id, config.shipment_travel_ticks),
            shipping: ShippingManager::new(player_id),
            config,
            world,
            store,
            sync,
            network: LogisticsNetwork::new(),
            trash: TrashHandler::new(),
            cross_seed: CrossSeedInventoryState::new(),
            session_id: None,
            started: false,
            game_tick: 0,
            sync_timer: 0,
            maintenance_timer: 0,
            load_state_timer: 0,
        }
    }

    /// Load persisted state and start the network index.
    ///
    /// Must run inside a tokio runtime. Starting an already started
    /// session does nothing.
    pub fn start(
        &mut self,
        seed_id: &str,
        session_id: &str,
        scanner: Arc<dyn NetworkScanner>,
    ) -> Result<(), LogisticsError> {
        if self.started {
            debug!(seed = seed_id, "logistics session already started");
            return Ok(());
        }

        self.network = LogisticsNetwork::new();
        self.network.start(
            scanner,
            Duration::from_millis(self.config.index_rebuild_interval_ms),
        )?;

        self.cross_seed.init(self.store.as_ref(), seed_id);
        let discarded = self
            .shipping
            .load(self.store.as_ref(), session_id, &self.world, self.game_tick);
        if !discarded.is_empty() {
            warn!(
                count = discarded.len(),
                "discarded saved shipments whose station is gone"
            );
        }

        self.sync.request_state_from_host();
        self.session_id = Some(session_id.to_string());
        self.started = true;
        info!(
            player = %self.player_id(),
            seed = seed_id,
            session = session_id,
            role = ?self.sync.role(),
            "logistics session started"
        );
        Ok(())
    }

    /// Advance timers by `elapsed` ticks and run whatever is due.
    pub fn on_tick(&mut self, elapsed: u64) -> TickReport {
        let mut report = TickReport::default();
        if !self.started {
            return report;
        }
        self.game_tick += elapsed;
        report.drained = self.sync.drain(self.cross_seed.registry_mut());

        if self.network.is_ready() {
            self.sync_timer += elapsed;
            if self.sync_timer >= self.config.sync_interval_ticks {
                self.sync_timer = 0;
                report.sync = self.sync_inventory();
            }
        } else {
            self.sync_timer = 0;
        }

        self.maintenance_timer += elapsed;
        if self.maintenance_timer >= self.config.maintenance_interval_ticks {
            self.maintenance_timer = 0;
            let (trash, shipping) = self.maintain();
            report.trash = Some(trash);
            report.shipping = Some(shipping);
        }

        self.load_state_timer += elapsed;
        if self.load_state_timer >= self.config.load_state_interval_ticks {
            self.load_state_timer = 0;
            for state in self.load_state() {
                info!(
                    item = %state.item_name,
                    quantity = state.quantity,
                    percent = state.percent_loaded,
                    seconds = state.seconds_remaining,
                    "inbound"
                );
            }
        }
        report
    }

    fn sync_inventory(&mut self) -> Option<SyncReport> {
        if self.config.inventory_management_paused {
            debug!("inventory management paused");
            return None;
        }
        let player_id = self.player_id();
        let empty = DesiredInventoryStore::default();
        let desired = self.cross_seed.registry().store(player_id).unwrap_or(&empty);
        Some(self.manager.sync_inventory(
            desired,
            &self.world,
            &self.network,
            &mut self.shipping,
            self.game_tick,
        ))
    }

    fn maintain(&mut self) -> (TrashReport, ProcessReport) {
        let trash = self.trash.process_tasks(&mut self.world, &self.network);
        let shipping = self
            .shipping
            .process(&mut self.world, &self.network, self.game_tick);

        let player_id = self.player_id();
        for &(item_id, item_count) in &shipping.buffer_changes {
            self.cross_seed.registry_mut().observe_buffer(
                player_id,
                item_id,
                BufferedObservation {
                    item_count,
                    game_tick: self.game_tick,
                },
            );
            self.sync
                .notify_buffer_upsert(item_id, item_count, self.game_tick);
        }
        (trash, shipping)
    }

    /// Stop the index and persist everything. Safe to call repeatedly.
    pub fn end_game(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.network.stop();

        let desired = self
            .cross_seed
            .save(self.store.as_ref())
            .context("failed to save desired inventory");
        self.cross_seed.reset();

        let shipments = match self.session_id.take() {
            Some(session_id) => self
                .shipping
                .save(self.store.as_ref(), &session_id, self.game_tick)
                .with_context(|| format!("failed to save shipments for {session_id}")),
            None => Ok(()),
        };
        self.shipping.reset();
        self.trash.clear();
        self.sync_timer = 0;
        self.maintenance_timer = 0;
        self.load_state_timer = 0;
        info!(player = %self.player_id(), "logistics session ended");

        desired.and(shipments)
    }

    /// Set the local player's limits for an item and announce the change.
    ///
    /// Returns `false` when the stored entry was already identical.
    pub fn set_desired_item(&mut self, item_id: ItemId, request_min: i64, recycle_max: i64) -> bool {
        let entry = DesiredItemEntry::clamped(item_id, request_min, recycle_max);
        let player_id = self.player_id();
        if !self.cross_seed.registry_mut().apply(player_id, entry) {
            return false;
        }
        self.sync.send_desired_item_update(entry);
        true
    }

    /// Stop managing an item.
    ///
    /// The entry becomes neutral (request nothing, never recycle) here and
    /// on every peer, since sync packets only ever replace entries. Returns
    /// the previous limits, or `None` when the item was not managed.
    pub fn remove_desired_item(&mut self, item_id: ItemId) -> Option<DesiredItemEntry> {
        let player_id = self.player_id();
        let neutral = DesiredItemEntry::clamped(item_id, 0, i64::from(NO_RECYCLE_LIMIT));
        let store = self.cross_seed.registry_mut().store_mut(player_id);
        let previous = store.get(item_id).copied().filter(|entry| *entry != neutral)?;
        store.apply(neutral);
        self.sync.send_desired_item_update(neutral);
        Some(previous)
    }

    /// Host hook for newly dropped litter. Returns whether it was queued.
    pub fn on_trash_added(&mut self, item_id: ItemId, count: u32, object_id: u64) -> bool {
        if !self.config.send_litter_to_logistics_network
            || !self.network.is_ready()
            || !self.network.has_item(item_id)
        {
            return false;
        }
        self.trash.add_task(item_id, count, object_id);
        true
    }

    /// Inbound progress grouped by item.
    pub fn load_state(&self) -> Vec<ItemLoadState> {
        self.shipping.load_state(&self.world, self.game_tick)
    }

    /// HUD overlay text honouring the display settings.
    pub fn hud_text(&self, scene: Option<&GhostScene>) -> Option<String> {
        if self.config.inventory_management_paused {
            return None;
        }
        let mut lines = Vec::new();
        if self.config.show_incoming_item_progress {
            lines.extend(hud::incoming_items_text(&self.load_state()));
        }
        if self.config.show_nearest_build_ghost_indicator {
            if let Some(nearest) = scene.and_then(hud::nearest_ghost) {
                let item_id = nearest.ghost.item_id;
                let available = self
                    .shipping
                    .is_item_in_inventory_or_inbound(&self.world, item_id);
                lines.push(hud::ghost_status_line(
                    &nearest,
                    &self.world.item_name(item_id),
                    available,
                ));
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.concat())
        }
    }

    /// Local player.
    pub fn player_id(&self) -> PlayerId {
        self.sync.local_player()
    }

    /// Whether `start` succeeded and `end_game` has not run since.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Ticks elapsed since the session was created.
    pub fn game_tick(&self) -> u64 {
        self.game_tick
    }

    /// Handle the transport pushes received packets into.
    pub fn inbox(&self) -> InboxHandle {
        self.sync.inbox()
    }

    /// Active settings.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Host world.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// Mutable host world.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Current network index.
    pub fn network(&self) -> &LogisticsNetwork {
        &self.network
    }

    /// Active shipments of the local player.
    pub fn shipping(&self) -> &ShippingManager {
        &self.shipping
    }

    /// Pending litter reclaims.
    pub fn trash(&self) -> &TrashHandler {
        &self.trash
    }

    /// Desired inventory of every known player.
    pub fn cross_seed(&self) -> &CrossSeedInventoryState {
        &self.cross_seed
    }

    /// Desired inventory of the local player.
    pub fn desired(&self) -> Option<&DesiredInventoryStore> {
        self.cross_seed.registry().store(self.player_id())
    }
}

impl<W: World> Drop for LogisticsSession<W> {
    fn drop(&mut self) {
        self.network.stop();
    }
}

impl<W: World> std::fmt::Debug for LogisticsSession<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogisticsSession")
            .field("player", &self.player_id())
            .field("started", &self.started)
            .field("game_tick", &self.game_tick)
            .field("network", &self.network)
            .field("tasks", &self.shipping.tasks().len())
            .finish()
    }
}

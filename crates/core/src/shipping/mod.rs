//! Shipment tracking between the logistics network and the player.

mod load_state;
mod task;

pub use load_state::ItemLoadState;
pub use task::{ShipmentDirection, ShipmentStatus, ShipmentTask};

use std::{collections::BTreeMap, mem};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::{LogisticsError, WorldError},
    models::{ItemId, PlayerId},
    network::LogisticsNetwork,
    persist::{self, BlobStore},
    world::World,
};

/// Outcome of one [`ShippingManager::process`] pass.
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Tasks that reached `Delivered` during the pass.
    pub delivered: Vec<ShipmentTask>,
    /// Tasks that reached `Failed` during the pass.
    pub failed: Vec<ShipmentTask>,
    /// Personal buffer entries whose count changed, with the new count.
    pub buffer_changes: Vec<(ItemId, u32)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredShipments {
    session_id: String,
    saved_at: DateTime<Utc>,
    player_id: PlayerId,
    next_id: u64,
    #[serde(default)]
    game_tick: u64,
    #[serde(default)]
    tasks: Vec<ShipmentTask>,
    #[serde(default)]
    buffer: Vec<(ItemId, u32)>,
}

/// Owns and advances the active shipments of the local player.
#[derive(Debug)]
pub struct ShippingManager {
    player_id: PlayerId,
    tasks: Vec<ShipmentTask>,
    reservations: BTreeMap<u64, u32>,
    buffer: BTreeMap<ItemId, u32>,
    next_id: u64,
}

impl ShippingManager {
    /// Create an empty manager for `player_id`.
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            tasks: Vec::new(),
            reservations: BTreeMap::new(),
            buffer: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Player whose shipments are managed.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Register a new task, returning its id.
    ///
    /// `reserved` is the network reservation backing a delivery; it is
    /// released once the items are taken from the station or the task fails.
    pub fn enqueue(&mut self, mut task: ShipmentTask, reserved: u32) -> u64 {
        task.id = self.next_id;
        self.next_id += 1;
        if reserved > 0 {
            self.reservations.insert(task.id, reserved);
        }
        debug!(
            id = task.id,
            item = %task.item_id,
            quantity = task.quantity,
            direction = ?task.direction,
            "queued shipment"
        );
        let id = task.id;
        self.tasks.push(task);
        id
    }

    /// Active (non-terminal) tasks.
    pub fn tasks(&self) -> &[ShipmentTask] {
        &self.tasks
    }

    /// Quantity of `item` on its way to the player.
    pub fn inbound_quantity(&self, item: ItemId) -> u32 {
        self.sum_quantity(item, ShipmentDirection::Delivery)
    }

    /// Quantity of `item` scheduled to leave the player.
    pub fn outbound_quantity(&self, item: ItemId) -> u32 {
        self.sum_quantity(item, ShipmentDirection::Recycle)
    }

    fn sum_quantity(&self, item: ItemId, direction: ShipmentDirection) -> u32 {
        self.tasks
            .iter()
            .filter(|task| task.item_id == item && task.direction == direction)
            .map(|task| task.quantity)
            .fold(0u32, u32::saturating_add)
    }

    /// Items delivered but waiting for room in the inventory.
    pub fn buffered_quantity(&self, item: ItemId) -> u32 {
        self.buffer.get(&item).copied().unwrap_or(0)
    }

    /// Personal buffer contents in item order.
    pub fn buffer(&self) -> &BTreeMap<ItemId, u32> {
        &self.buffer
    }

    /// Whether the player has, or will soon have, at least one `item`.
    pub fn is_item_in_inventory_or_inbound<W: World + ?Sized>(&self, world: &W, item: ItemId) -> bool {
        world.held_quantity(self.player_id, item) > 0
            || self.buffered_quantity(item) > 0
            || self.inbound_quantity(item) > 0
    }

    /// Inbound progress grouped by item.
    pub fn load_state<W: World + ?Sized>(&self, world: &W, now: u64) -> Vec<ItemLoadState> {
        ItemLoadState::collect(&self.tasks, now, |item| world.item_name(item))
    }

    /// Advance every task and flush the personal buffer.
    pub fn process<W: World + ?Sized>(
        &mut self,
        world: &mut W,
        network: &LogisticsNetwork,
        now: u64,
    ) -> ProcessReport {
        let mut report = ProcessReport::default();

        for mut task in mem::take(&mut self.tasks) {
            let step = match task.status() {
                ShipmentStatus::Queued => {
                    if let Some(reserved) = self.reservations.remove(&task.id) {
                        network.release(task.item_id, reserved);
                    }
                    dispatch(&mut task, world, now)
                }
                ShipmentStatus::InTransit if task.has_arrived(now) => {
                    self.complete(&mut task, world, &mut report)
                }
                _ => Ok(()),
            };

            if let Err(err) = step {
                warn!(id = task.id, "shipment failed: {err}");
                if let Err(err) = task.transition(ShipmentStatus::Failed) {
                    warn!(id = task.id, "{err}");
                }
            }

            match task.status() {
                ShipmentStatus::Delivered => {
                    info!(
                        id = task.id,
                        item = %task.item_id,
                        quantity = task.quantity,
                        direction = ?task.direction,
                        "shipment delivered"
                    );
                    report.delivered.push(task);
                }
                ShipmentStatus::Failed => report.failed.push(task),
                _ => self.tasks.push(task),
            }
        }

        self.flush_buffer(world, &mut report);
        report
    }

    fn complete<W: World + ?Sized>(
        &mut self,
        task: &mut ShipmentTask,
        world: &mut W,
        report: &mut ProcessReport,
    ) -> Result<(), LogisticsError> {
        match task.direction {
            ShipmentDirection::Delivery => {
                let applied = match world.apply_delta(task.player_id, task.item_id, i64::from(task.quantity)) {
                    Ok(applied) => applied.clamp(0, i64::from(task.quantity)) as u32,
                    Err(err) => {
                        warn!(id = task.id, "inventory rejected delivery: {err}");
                        0
                    }
                };
                let overflow = task.quantity - applied;
                if overflow > 0 {
                    let count = self.buffer.entry(task.item_id).or_insert(0);
                    *count = count.saturating_add(overflow);
                    report.buffer_changes.push((task.item_id, *count));
                    debug!(item = %task.item_id, overflow, "inventory full, buffering delivery");
                }
            }
            ShipmentDirection::Recycle => {
                if !world.station_exists(task.station_id) {
                    return Err(stale(task));
                }
                let surplus = world
                    .held_quantity(task.player_id, task.item_id)
                    .saturating_sub(task.keep_at_least);
                let wanted = task.quantity.min(surplus);
                let removed = world
                    .apply_delta(task.player_id, task.item_id, -i64::from(wanted))
                    .map(|delta| delta.unsigned_abs().min(u64::from(wanted)) as u32)
                    .map_err(|err| unavailable(task, &err))?;

                let stored = match world.store_in_station(task.station_id, task.item_id, removed) {
                    Ok(stored) => stored.min(removed),
                    Err(err) => {
                        give_back(world, task, removed);
                        return Err(match err {
                            WorldError::StationMissing(_) => stale(task),
                            other => unavailable(task, &other),
                        });
                    }
                };
                give_back(world, task, removed - stored);
                task.quantity = stored;
            }
        }
        task.transition(ShipmentStatus::Delivered)
    }

    fn flush_buffer<W: World + ?Sized>(&mut self, world: &mut W, report: &mut ProcessReport) {
        let player = self.player_id;
        self.buffer.retain(|item, count| {
            let applied = world
                .apply_delta(player, *item, i64::from(*count))
                .map(|applied| applied.clamp(0, i64::from(*count)) as u32)
                .unwrap_or(0);
            if applied > 0 {
                *count -= applied;
                report.buffer_changes.push((*item, *count));
            }
            *count > 0
        });
    }

    /// Persist active tasks and the personal buffer for `session_id`.
    ///
    /// `now` is the game tick the task timestamps are measured against.
    pub fn save(&self, store: &dyn BlobStore, session_id: &str, now: u64) -> Result<()> {
        let stored = StoredShipments {
            session_id: session_id.to_string(),
            saved_at: Utc::now(),
            player_id: self.player_id,
            next_id: self.next_id,
            game_tick: now,
            tasks: self.tasks.clone(),
            buffer: self.buffer.iter().map(|(item, count)| (*item, *count)).collect(),
        };
        persist::save_json(store, &storage_key(session_id), &stored)?;
        info!(session = session_id, tasks = self.tasks.len(), "saved shipments");
        Ok(())
    }

    /// Replace in-memory state with what was saved for `session_id`.
    ///
    /// Restored tasks are rebased onto `now` so time already spent in
    /// transit carries over to the new clock. Tasks whose station no
    /// longer exists are returned as failed and not restored.
    pub fn load<W: World + ?Sized>(
        &mut self,
        store: &dyn BlobStore,
        session_id: &str,
        world: &W,
        now: u64,
    ) -> Vec<ShipmentTask> {
        self.reset();
        let Some(stored) = persist::load_json::<StoredShipments>(store, &storage_key(session_id))
        else {
            return Vec::new();
        };
        if stored.player_id != self.player_id {
            warn!(
                session = session_id,
                saved = %stored.player_id,
                "ignoring shipments saved for another player"
            );
            return Vec::new();
        }

        let mut discarded = Vec::new();
        for mut task in stored.tasks {
            if task.status().is_terminal() {
                continue;
            }
            if !world.station_exists(task.station_id) {
                warn!(id = task.id, "{}", stale(&task));
                if task.transition(ShipmentStatus::Failed).is_ok() {
                    discarded.push(task);
                }
                continue;
            }
            task.rebase(stored.game_tick, now);
            self.tasks.push(task);
        }

        let highest = self.tasks.iter().map(|task| task.id).max().unwrap_or(0);
        self.next_id = stored.next_id.max(highest + 1);
        self.buffer = stored
            .buffer
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .collect();
        info!(
            session = session_id,
            restored = self.tasks.len(),
            discarded = discarded.len(),
            "loaded shipments"
        );
        discarded
    }

    /// Forget every task, reservation and buffered item.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.reservations.clear();
        self.buffer.clear();
        self.next_id = 1;
    }
}

fn storage_key(session_id: &str) -> String {
    format!("shipping/{session_id}")
}

fn stale(task: &ShipmentTask) -> LogisticsError {
    LogisticsError::StaleSource {
        station: task.station_id,
        item: task.item_id,
    }
}

fn dispatch<W: World + ?Sized>(
    task: &mut ShipmentTask,
    world: &mut W,
    now: u64,
) -> Result<(), LogisticsError> {
    match task.direction {
        ShipmentDirection::Delivery => {
            let taken = match world.take_from_station(task.station_id, task.item_id, task.quantity) {
                Ok(taken) => taken.min(task.quantity),
                Err(WorldError::StationMissing(_)) => return Err(stale(task)),
                Err(err) => return Err(unavailable(task, &err)),
            };
            if taken == 0 {
                return Err(LogisticsError::Unavailable(task.item_id));
            }
            task.quantity = taken;
        }
        ShipmentDirection::Recycle => {
            if !world.station_exists(task.station_id) {
                return Err(stale(task));
            }
        }
    }
    task.depart(now)
}

fn give_back<W: World + ?Sized>(world: &mut W, task: &ShipmentTask, quantity: u32) {
    if quantity == 0 {
        return;
    }
    if let Err(err) = world.apply_delta(task.player_id, task.item_id, i64::from(quantity)) {
        warn!(id = task.id, quantity, "failed to return items to player: {err}");
    }
}

fn unavailable(task: &ShipmentTask, cause: &WorldError) -> LogisticsError {
    debug!(id = task.id, "world error: {cause}");
    LogisticsError::Unavailable(task.item_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::StationId,
        persist::MemoryBlobStore,
        world::InMemoryWorld,
    };

    const PLAYER: PlayerId = PlayerId(7);
    const IRON: ItemId = ItemId(42);
    const DEPOT: StationId = StationId(1);

    fn delivery(quantity: u32) -> ShipmentTask {
        ShipmentTask::new(PLAYER, IRON, quantity, ShipmentDirection::Delivery, DEPOT, 0, 600)
    }

    fn recycle(quantity: u32) -> ShipmentTask {
        ShipmentTask::new(PLAYER, IRON, quantity, ShipmentDirection::Recycle, DEPOT, 0, 600)
    }

    fn world_with_stock(stock: u32) -> InMemoryWorld {
        let mut world = InMemoryWorld::new();
        world.set_station_stock(DEPOT, IRON, stock);
        world
    }

    #[test]
    fn delivery_moves_items_from_station_to_player() {
        let mut world = world_with_stock(60);
        let network = LogisticsNetwork::new();
        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(60), 0);
        assert_eq!(shipping.inbound_quantity(IRON), 60);

        let report = shipping.process(&mut world, &network, 0);
        assert!(report.delivered.is_empty());
        assert_eq!(shipping.tasks()[0].status(), ShipmentStatus::InTransit);
        assert_eq!(world.station_stock(DEPOT, IRON), 0);

        let report = shipping.process(&mut world, &network, 600);
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].status(), ShipmentStatus::Delivered);
        assert_eq!(world.held_quantity(PLAYER, IRON), 60);
        assert!(shipping.tasks().is_empty());
    }

    #[test]
    fn vanished_source_fails_without_retry() {
        let mut world = world_with_stock(60);
        let network = LogisticsNetwork::new();
        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(60), 0);
        world.remove_station(DEPOT);

        let report = shipping.process(&mut world, &network, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].status(), ShipmentStatus::Failed);
        assert!(shipping.tasks().is_empty());
        assert_eq!(world.held_quantity(PLAYER, IRON), 0);
    }

    #[test]
    fn partial_stock_shrinks_delivery() {
        let mut world = world_with_stock(25);
        let network = LogisticsNetwork::new();
        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(60), 0);

        shipping.process(&mut world, &network, 0);
        assert_eq!(shipping.inbound_quantity(IRON), 25);
    }

    #[test]
    fn recycle_removes_surplus_into_station() {
        let mut world = world_with_stock(0);
        world.set_held(PLAYER, IRON, 200);
        let network = LogisticsNetwork::new();
        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(recycle(50), 0);
        assert_eq!(shipping.outbound_quantity(IRON), 50);

        shipping.process(&mut world, &network, 10);
        let report = shipping.process(&mut world, &network, 610);
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(world.held_quantity(PLAYER, IRON), 150);
        assert_eq!(world.station_stock(DEPOT, IRON), 50);
    }

    #[test]
    fn full_inventory_overflows_into_buffer() {
        let mut world = world_with_stock(60);
        world.set_capacity(PLAYER, 40);
        let network = LogisticsNetwork::new();
        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(60), 0);

        shipping.process(&mut world, &network, 0);
        let report = shipping.process(&mut world, &network, 600);
        assert_eq!(world.held_quantity(PLAYER, IRON), 40);
        assert_eq!(shipping.buffered_quantity(IRON), 20);
        assert_eq!(report.buffer_changes, vec![(IRON, 20)]);
        assert!(shipping.is_item_in_inventory_or_inbound(&world, IRON));

        world.set_capacity(PLAYER, 100);
        let report = shipping.process(&mut world, &network, 700);
        assert_eq!(world.held_quantity(PLAYER, IRON), 60);
        assert_eq!(shipping.buffered_quantity(IRON), 0);
        assert_eq!(report.buffer_changes, vec![(IRON, 0)]);
    }

    #[test]
    fn dispatch_releases_reservation() {
        let mut world = world_with_stock(60);
        let network = LogisticsNetwork::new();
        network.rebuild(&crate::world::SharedWorld::new(world.clone()));
        let reserved = network.reserve(IRON, 60);
        assert_eq!(network.available(IRON), 0);

        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(60), reserved);
        shipping.process(&mut world, &network, 0);
        assert_eq!(network.reserved(IRON), 0);
    }

    #[test]
    fn save_and_load_discards_unresolvable_tasks() -> Result<()> {
        let store = MemoryBlobStore::new();
        let mut world = world_with_stock(100);
        world.set_station_stock(StationId(2), IRON, 100);
        let network = LogisticsNetwork::new();

        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(10), 0);
        let mut other = delivery(10);
        other.station_id = StationId(2);
        shipping.enqueue(other, 0);
        shipping.process(&mut world, &network, 0);
        shipping.save(&store, "slot-a", 0)?;

        world.remove_station(StationId(2));
        let mut restored = ShippingManager::new(PLAYER);
        let discarded = restored.load(&store, "slot-a", &world, 0);
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].status(), ShipmentStatus::Failed);
        assert_eq!(restored.tasks().len(), 1);
        assert_eq!(restored.tasks()[0].status(), ShipmentStatus::InTransit);

        let id = restored.enqueue(delivery(1), 0);
        assert_eq!(id, 3);

        let mut stranger = ShippingManager::new(PlayerId(99));
        assert!(stranger.load(&store, "slot-a", &world, 0).is_empty());
        assert!(stranger.tasks().is_empty());
        Ok(())
    }

    #[test]
    fn recycle_never_dips_below_floor() {
        let mut world = world_with_stock(0);
        world.set_held(PLAYER, IRON, 200);
        let network = LogisticsNetwork::new();
        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(recycle(50).keeping(150), 0);
        shipping.process(&mut world, &network, 0);

        world.set_held(PLAYER, IRON, 80);
        let report = shipping.process(&mut world, &network, 600);
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].quantity, 0);
        assert_eq!(world.held_quantity(PLAYER, IRON), 80);
        assert_eq!(world.station_stock(DEPOT, IRON), 0);

        world.set_held(PLAYER, IRON, 170);
        shipping.enqueue(recycle(50).keeping(150), 0);
        shipping.process(&mut world, &network, 700);
        shipping.process(&mut world, &network, 1300);
        assert_eq!(world.held_quantity(PLAYER, IRON), 150);
        assert_eq!(world.station_stock(DEPOT, IRON), 20);
    }

    #[test]
    fn restored_shipments_resume_on_a_fresh_clock() -> Result<()> {
        let store = MemoryBlobStore::new();
        let mut world = world_with_stock(60);
        let network = LogisticsNetwork::new();

        let mut shipping = ShippingManager::new(PLAYER);
        shipping.enqueue(delivery(60), 0);
        shipping.process(&mut world, &network, 1_000_000);
        shipping.save(&store, "slot-a", 1_000_400)?;

        let mut restored = ShippingManager::new(PLAYER);
        assert!(restored.load(&store, "slot-a", &world, 0).is_empty());
        assert_eq!(restored.load_state(&world, 0)[0].seconds_remaining, 10);

        restored.load(&store, "slot-a", &world, 1000);
        assert!(restored.process(&mut world, &network, 1199).delivered.is_empty());
        let report = restored.process(&mut world, &network, 1200);
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(world.held_quantity(PLAYER, IRON), 60);
        Ok(())
    }
}

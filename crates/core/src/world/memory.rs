use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::Mutex;

use super::{NetworkScanner, StationStock, World};
use crate::{
    error::WorldError,
    models::{ItemId, PlayerId, StationId},
};

/// Plain in-process world used by the headless driver and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWorld {
    held: HashMap<(PlayerId, ItemId), u32>,
    capacity: HashMap<PlayerId, u32>,
    stations: BTreeMap<StationId, Vec<(ItemId, u32)>>,
    trash: HashMap<u64, (ItemId, u32)>,
    names: HashMap<ItemId, String>,
}

impl InMemoryWorld {
    /// Empty world with no players or stations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name for an item.
    pub fn name_item(&mut self, item: ItemId, name: impl Into<String>) {
        self.names.insert(item, name.into());
    }

    /// Overwrite what a player holds.
    pub fn set_held(&mut self, player: PlayerId, item: ItemId, quantity: u32) {
        self.held.insert((player, item), quantity);
    }

    /// Cap the total number of items a player can carry.
    pub fn set_capacity(&mut self, player: PlayerId, capacity: u32) {
        self.capacity.insert(player, capacity);
    }

    /// Create (or restock) a station slot.
    pub fn set_station_stock(&mut self, station: StationId, item: ItemId, quantity: u32) {
        let slots = self.stations.entry(station).or_default();
        match slots.iter_mut().find(|(slot_item, _)| *slot_item == item) {
            Some(slot) => slot.1 = quantity,
            None => slots.push((item, quantity)),
        }
    }

    /// Quantity of an item stored at a station.
    pub fn station_stock(&self, station: StationId, item: ItemId) -> u32 {
        self.stations
            .get(&station)
            .and_then(|slots| slots.iter().find(|(slot_item, _)| *slot_item == item))
            .map(|(_, quantity)| *quantity)
            .unwrap_or(0)
    }

    /// Remove a station, as if the player dismantled it.
    pub fn remove_station(&mut self, station: StationId) {
        self.stations.remove(&station);
    }

    /// Drop litter on the ground.
    pub fn add_trash(&mut self, object_id: u64, item: ItemId, count: u32) {
        self.trash.insert(object_id, (item, count));
    }

    /// Remaining count of a litter object.
    pub fn trash_count(&self, object_id: u64) -> Option<u32> {
        self.trash.get(&object_id).map(|(_, count)| *count)
    }

    fn carried_total(&self, player: PlayerId) -> u32 {
        self.held
            .iter()
            .filter(|((owner, _), _)| *owner == player)
            .map(|(_, quantity)| *quantity)
            .fold(0u32, u32::saturating_add)
    }

    fn stock(&self) -> Vec<StationStock> {
        self.stations
            .iter()
            .map(|(station_id, items)| StationStock {
                station_id: *station_id,
                items: items.clone(),
            })
            .collect()
    }
}

impl World for InMemoryWorld {
    fn held_quantity(&self, player: PlayerId, item: ItemId) -> u32 {
        self.held.get(&(player, item)).copied().unwrap_or(0)
    }

    fn apply_delta(
        &mut self,
        player: PlayerId,
        item: ItemId,
        delta: i64,
    ) -> Result<i64, WorldError> {
        let current = self.held_quantity(player, item);
        let applied = if delta >= 0 {
            let room = self
                .capacity
                .get(&player)
                .map(|cap| cap.saturating_sub(self.carried_total(player)))
                .unwrap_or(u32::MAX)
                .min(u32::MAX - current);
            delta.min(i64::from(room))
        } else {
            delta.max(-i64::from(current))
        };
        let updated = u32::try_from(i64::from(current) + applied).map_err(|_| {
            WorldError::Unavailable(format!("inventory count out of range for {item}"))
        })?;
        self.held.insert((player, item), updated);
        Ok(applied)
    }

    fn station_exists(&self, station: StationId) -> bool {
        self.stations.contains_key(&station)
    }

    fn take_from_station(
        &mut self,
        station: StationId,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError> {
        let slots = self
            .stations
            .get_mut(&station)
            .ok_or(WorldError::StationMissing(station))?;
        let Some(slot) = slots.iter_mut().find(|(slot_item, _)| *slot_item == item) else {
            return Ok(0);
        };
        let taken = slot.1.min(quantity);
        slot.1 -= taken;
        Ok(taken)
    }

    fn store_in_station(
        &mut self,
        station: StationId,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError> {
        let slots = self
            .stations
            .get_mut(&station)
            .ok_or(WorldError::StationMissing(station))?;
        match slots.iter_mut().find(|(slot_item, _)| *slot_item == item) {
            Some(slot) => slot.1 = slot.1.saturating_add(quantity),
            None => slots.push((item, quantity)),
        }
        Ok(quantity)
    }

    fn remove_trash(
        &mut self,
        object_id: u64,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError> {
        let Some((trash_item, count)) = self.trash.get_mut(&object_id) else {
            return Err(WorldError::TrashMissing(object_id));
        };
        if *trash_item != item {
            return Err(WorldError::TrashMissing(object_id));
        }
        let removed = (*count).min(quantity);
        *count -= removed;
        if *count == 0 {
            self.trash.remove(&object_id);
        }
        Ok(removed)
    }

    fn return_trash(
        &mut self,
        object_id: u64,
        item: ItemId,
        quantity: u32,
    ) -> Result<(), WorldError> {
        if quantity == 0 {
            return Ok(());
        }
        let (trash_item, count) = self.trash.entry(object_id).or_insert((item, 0));
        if *trash_item != item {
            return Err(WorldError::TrashMissing(object_id));
        }
        *count = count.saturating_add(quantity);
        Ok(())
    }

    fn item_name(&self, item: ItemId) -> String {
        self.names
            .get(&item)
            .cloned()
            .unwrap_or_else(|| format!("Item {item}"))
    }
}

/// Thread-safe handle to an [`InMemoryWorld`], usable both as the
/// simulation-thread [`World`] and as the background [`NetworkScanner`].
#[derive(Debug, Clone, Default)]
pub struct SharedWorld {
    inner: Arc<Mutex<InMemoryWorld>>,
}

impl SharedWorld {
    /// Wrap a world for shared access.
    pub fn new(world: InMemoryWorld) -> Self {
        Self {
            inner: Arc::new(Mutex::new(world)),
        }
    }

    /// Run `f` with exclusive access to the underlying world.
    pub fn with<R>(&self, f: impl FnOnce(&mut InMemoryWorld) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl World for SharedWorld {
    fn held_quantity(&self, player: PlayerId, item: ItemId) -> u32 {
        self.inner.lock().held_quantity(player, item)
    }

    fn apply_delta(
        &mut self,
        player: PlayerId,
        item: ItemId,
        delta: i64,
    ) -> Result<i64, WorldError> {
        self.inner.lock().apply_delta(player, item, delta)
    }

    fn station_exists(&self, station: StationId) -> bool {
        self.inner.lock().station_exists(station)
    }

    fn take_from_station(
        &mut self,
        station: StationId,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError> {
        self.inner.lock().take_from_station(station, item, quantity)
    }

    fn store_in_station(
        &mut self,
        station: StationId,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError> {
        self.inner.lock().store_in_station(station, item, quantity)
    }

    fn remove_trash(
        &mut self,
        object_id: u64,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError> {
        self.inner.lock().remove_trash(object_id, item, quantity)
    }

    fn return_trash(
        &mut self,
        object_id: u64,
        item: ItemId,
        quantity: u32,
    ) -> Result<(), WorldError> {
        self.inner.lock().return_trash(object_id, item, quantity)
    }

    fn item_name(&self, item: ItemId) -> String {
        self.inner.lock().item_name(item)
    }
}

impl NetworkScanner for SharedWorld {
    fn scan(&self) -> Result<Vec<StationStock>, WorldError> {
        Ok(self.inner.lock().stock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_delta_respects_capacity_and_holdings() -> Result<(), WorldError> {
        let player = PlayerId(1);
        let mut world = InMemoryWorld::new();
        world.set_capacity(player, 50);
        world.set_held(player, ItemId(1), 20);

        assert_eq!(world.apply_delta(player, ItemId(2), 100)?, 30);
        assert_eq!(world.held_quantity(player, ItemId(2)), 30);
        assert_eq!(world.apply_delta(player, ItemId(1), -500)?, -20);
        assert_eq!(world.held_quantity(player, ItemId(1)), 0);
        Ok(())
    }

    #[test]
    fn stations_and_trash_report_missing_objects() {
        let mut world = InMemoryWorld::new();
        world.set_station_stock(StationId(1), ItemId(5), 10);
        assert_eq!(world.take_from_station(StationId(1), ItemId(5), 4), Ok(4));
        assert_eq!(world.station_stock(StationId(1), ItemId(5)), 6);
        assert_eq!(
            world.take_from_station(StationId(2), ItemId(5), 1),
            Err(WorldError::StationMissing(StationId(2)))
        );

        world.add_trash(77, ItemId(5), 3);
        assert_eq!(world.remove_trash(77, ItemId(5), 10), Ok(3));
        assert_eq!(
            world.remove_trash(77, ItemId(5), 1),
            Err(WorldError::TrashMissing(77))
        );
    }

    #[test]
    fn holdings_saturate_instead_of_overflowing() -> Result<(), WorldError> {
        let player = PlayerId(1);
        let mut world = InMemoryWorld::new();
        world.set_held(player, ItemId(1), u32::MAX - 5);
        assert_eq!(world.apply_delta(player, ItemId(1), 100)?, 5);
        assert_eq!(world.held_quantity(player, ItemId(1)), u32::MAX);

        world.set_held(player, ItemId(2), 10);
        world.set_capacity(player, 50);
        assert_eq!(world.apply_delta(player, ItemId(2), 1)?, 0);
        Ok(())
    }

    #[test]
    fn returned_litter_recreates_the_object() {
        let mut world = InMemoryWorld::new();
        world.add_trash(5, ItemId(3), 2);
        assert_eq!(world.remove_trash(5, ItemId(3), 2), Ok(2));
        assert_eq!(world.trash_count(5), None);
        assert_eq!(world.return_trash(5, ItemId(3), 2), Ok(()));
        assert_eq!(world.trash_count(5), Some(2));
        assert_eq!(
            world.return_trash(5, ItemId(4), 1),
            Err(WorldError::TrashMissing(5))
        );
    }
}

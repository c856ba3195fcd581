//! Interfaces to the host game world.
//!
//! The core never touches host objects directly. Everything it needs
//! from the simulation goes through [`World`] (called on the simulation
//! thread) and [`NetworkScanner`] (called from the background index
//! rebuild).

mod memory;

pub use memory::{InMemoryWorld, SharedWorld};

use serde::{Deserialize, Serialize};

use crate::{
    error::WorldError,
    models::{ItemId, PlayerId, StationId},
};

/// Items stocked by one station at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStock {
    /// Station being described.
    pub station_id: StationId,
    /// Stocked items and their quantities, in station slot order.
    pub items: Vec<(ItemId, u32)>,
}

/// Synchronous, authoritative access to player and station inventories.
pub trait World {
    /// Quantity of `item` currently held by `player`.
    fn held_quantity(&self, player: PlayerId, item: ItemId) -> u32;

    /// Add (positive) or remove (negative) items from a player's inventory.
    ///
    /// Returns the delta actually applied, which may be smaller in
    /// magnitude when the inventory is full or short.
    fn apply_delta(&mut self, player: PlayerId, item: ItemId, delta: i64)
        -> Result<i64, WorldError>;

    /// Whether the station still exists.
    fn station_exists(&self, station: StationId) -> bool;

    /// Remove up to `quantity` items from a station, returning the amount taken.
    fn take_from_station(
        &mut self,
        station: StationId,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError>;

    /// Store up to `quantity` items in a station, returning the amount stored.
    fn store_in_station(
        &mut self,
        station: StationId,
        item: ItemId,
        quantity: u32,
    ) -> Result<u32, WorldError>;

    /// Pick up to `quantity` items out of a litter object, returning the amount removed.
    fn remove_trash(&mut self, object_id: u64, item: ItemId, quantity: u32)
        -> Result<u32, WorldError>;

    /// Put items back into a litter object, recreating it if it was emptied.
    fn return_trash(&mut self, object_id: u64, item: ItemId, quantity: u32)
        -> Result<(), WorldError>;

    /// Display name for an item.
    fn item_name(&self, item: ItemId) -> String {
        format!("Item {item}")
    }
}

/// Read-only scan of every station, used to rebuild the network index.
pub trait NetworkScanner: Send + Sync {
    /// Snapshot the stock of every station in the world.
    fn scan(&self) -> Result<Vec<StationStock>, WorldError>;
}

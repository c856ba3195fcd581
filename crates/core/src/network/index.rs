use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    models::{ItemId, StationId},
    world::StationStock,
};

/// Station contributing stock to an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Station holding the stock.
    pub station_id: StationId,
    /// Quantity held at scan time.
    pub quantity: u32,
}

/// Aggregated availability of one item across the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIndexEntry {
    /// Indexed item.
    pub item_id: ItemId,
    /// Total quantity across all sources at scan time.
    pub available_quantity: u32,
    /// Stations stocking the item, in scan order.
    pub source_locations: Vec<SourceLocation>,
}

/// One fully built, immutable view of the network.
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    generation: u64,
    entries: BTreeMap<ItemId, NetworkIndexEntry>,
    stations: Vec<StationId>,
}

impl NetworkSnapshot {
    /// Index a station scan.
    ///
    /// Slots with zero stock still register the station as a source so
    /// recycled items have somewhere to go.
    pub fn build(generation: u64, stock: Vec<StationStock>) -> Self {
        let mut entries: BTreeMap<ItemId, NetworkIndexEntry> = BTreeMap::new();
        let mut stations = Vec::with_capacity(stock.len());

        for station in stock {
            stations.push(station.station_id);
            for (item_id, quantity) in station.items {
                let entry = entries.entry(item_id).or_insert_with(|| NetworkIndexEntry {
                    item_id,
                    available_quantity: 0,
                    source_locations: Vec::new(),
                });
                entry.available_quantity = entry.available_quantity.saturating_add(quantity);
                entry.source_locations.push(SourceLocation {
                    station_id: station.station_id,
                    quantity,
                });
            }
        }

        Self {
            generation,
            entries,
            stations,
        }
    }

    /// Monotonic rebuild counter; zero means "never built".
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Entry for an item, if any station stocks it.
    pub fn entry(&self, item: ItemId) -> Option<&NetworkIndexEntry> {
        self.entries.get(&item)
    }

    /// All entries in item order.
    pub fn entries(&self) -> impl Iterator<Item = &NetworkIndexEntry> {
        self.entries.values()
    }

    /// Every station seen by the scan, in scan order.
    pub fn stations(&self) -> &[StationId] {
        &self.stations
    }

    /// Number of distinct indexed items.
    pub fn item_count(&self) -> usize {
        self.entries.len()
    }
}

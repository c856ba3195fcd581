//! Per-player desired inventory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::ItemId;

/// Sentinel for "never recycle this item".
pub const NO_RECYCLE_LIMIT: u32 = u32::MAX;

/// How much of one item a player wants to keep on hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredItemEntry {
    /// Item the entry applies to.
    pub item_id: ItemId,
    /// Request items from the network while holding fewer than this.
    pub request_min: u32,
    /// Recycle items into the network while holding more than this.
    pub recycle_max: u32,
}

impl DesiredItemEntry {
    /// Build an entry from untrusted values, clamping into a valid range.
    ///
    /// Negative minimums become zero and a maximum below the minimum is
    /// raised to it, so recycling never dips under the requested floor.
    pub fn clamped(item_id: ItemId, request_min: i64, recycle_max: i64) -> Self {
        let request_min = request_min.clamp(0, i64::from(u32::MAX)) as u32;
        let recycle_max = recycle_max.clamp(0, i64::from(u32::MAX)) as u32;
        Self {
            item_id,
            request_min,
            recycle_max: recycle_max.max(request_min),
        }
    }

    /// Whether the entry ever recycles surplus.
    pub fn recycles(&self) -> bool {
        self.recycle_max != NO_RECYCLE_LIMIT
    }
}

/// Desired entries for a single player keyed by item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredInventoryStore {
    entries: BTreeMap<ItemId, DesiredItemEntry>,
}

impl DesiredInventoryStore {
    /// Build a store from a list of entries, clamping each.
    pub fn from_entries(entries: impl IntoIterator<Item = DesiredItemEntry>) -> Self {
        let mut store = Self::default();
        for entry in entries {
            store.apply(entry);
        }
        store
    }

    /// Replace the entry for `entry.item_id`, returning `true` when it changed.
    pub fn apply(&mut self, entry: DesiredItemEntry) -> bool {
        let entry = DesiredItemEntry::clamped(
            entry.item_id,
            i64::from(entry.request_min),
            i64::from(entry.recycle_max),
        );
        match self.entries.insert(entry.item_id, entry) {
            Some(previous) => previous != entry,
            None => true,
        }
    }

    /// Set limits for an item from untrusted values.
    pub fn set(&mut self, item_id: ItemId, request_min: i64, recycle_max: i64) -> bool {
        self.apply(DesiredItemEntry::clamped(item_id, request_min, recycle_max))
    }

    /// Remove an entry, returning it when present.
    pub fn remove(&mut self, item_id: ItemId) -> Option<DesiredItemEntry> {
        self.entries.remove(&item_id)
    }

    /// Look up the entry for an item.
    pub fn get(&self, item_id: ItemId) -> Option<&DesiredItemEntry> {
        self.entries.get(&item_id)
    }

    /// Entries in ascending item order.
    pub fn iter(&self) -> impl Iterator<Item = &DesiredItemEntry> {
        self.entries.values()
    }

    /// Owned copy of all entries.
    pub fn entries(&self) -> Vec<DesiredItemEntry> {
        self.entries.values().copied().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Desired inventory of every known player, persisted per world seed.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    desired::{DesiredInventoryStore, DesiredItemEntry},
    models::{ItemId, PlayerId},
    persist::{self, BlobStore},
};

/// Most recent buffered quantity a peer reported for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedObservation {
    /// Items sitting in the player's personal buffer.
    pub item_count: u32,
    /// Game tick of the observation.
    pub game_tick: u64,
}

/// Mirrored per-player state held by every peer.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, DesiredInventoryStore>,
    buffered: HashMap<(PlayerId, ItemId), BufferedObservation>,
}

impl PlayerRegistry {
    /// Desired inventory of `player`, if any entry was ever recorded.
    pub fn store(&self, player: PlayerId) -> Option<&DesiredInventoryStore> {
        self.players.get(&player)
    }

    /// Mutable desired inventory of `player`, created on first use.
    pub fn store_mut(&mut self, player: PlayerId) -> &mut DesiredInventoryStore {
        self.players.entry(player).or_default()
    }

    /// Entries recorded for `player`; empty when unknown.
    pub fn entries_for(&self, player: PlayerId) -> Vec<DesiredItemEntry> {
        self.players
            .get(&player)
            .map(DesiredInventoryStore::entries)
            .unwrap_or_default()
    }

    /// Replace `player`'s whole store.
    pub fn replace(&mut self, player: PlayerId, entries: Vec<DesiredItemEntry>) {
        self.players
            .insert(player, DesiredInventoryStore::from_entries(entries));
    }

    /// Apply one entry for `player`, returning `true` if it changed anything.
    pub fn apply(&mut self, player: PlayerId, entry: DesiredItemEntry) -> bool {
        self.store_mut(player).apply(entry)
    }

    /// Record a buffered-item observation; older ticks never overwrite newer ones.
    pub fn observe_buffer(
        &mut self,
        player: PlayerId,
        item: ItemId,
        observation: BufferedObservation,
    ) -> bool {
        match self.buffered.get(&(player, item)) {
            Some(existing) if existing.game_tick > observation.game_tick => false,
            _ => {
                self.buffered.insert((player, item), observation);
                true
            }
        }
    }

    /// Last buffered observation for `(player, item)`.
    pub fn buffered(&self, player: PlayerId, item: ItemId) -> Option<BufferedObservation> {
        self.buffered.get(&(player, item)).copied()
    }

    /// Known players in id order.
    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.keys().copied()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.players.clear();
        self.buffered.clear();
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredInventory {
    seed_id: String,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    players: Vec<StoredPlayer>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPlayer {
    player_id: PlayerId,
    #[serde(default)]
    entries: Vec<DesiredItemEntry>,
}

/// Desired inventory bound to the current world seed.
#[derive(Debug, Default)]
pub struct CrossSeedInventoryState {
    seed_id: Option<String>,
    registry: PlayerRegistry,
}

impl CrossSeedInventoryState {
    /// Empty, unbound state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot saved for `seed_id`, defaulting to empty.
    pub fn init(&mut self, store: &dyn BlobStore, seed_id: &str) {
        self.registry.clear();
        self.seed_id = Some(seed_id.to_string());

        let Some(stored) = persist::load_json::<StoredInventory>(store, &storage_key(seed_id))
        else {
            debug!(seed = seed_id, "no saved desired inventory");
            return;
        };
        for player in stored.players {
            self.registry.replace(player.player_id, player.entries);
        }
        info!(
            seed = seed_id,
            players = self.registry.players.len(),
            "loaded desired inventory"
        );
    }

    /// Persist every player's desired inventory under the bound seed.
    ///
    /// Does nothing before `init`.
    pub fn save(&self, store: &dyn BlobStore) -> Result<()> {
        let Some(seed_id) = self.seed_id.as_deref() else {
            debug!("desired inventory not bound to a seed, skipping save");
            return Ok(());
        };
        let stored = StoredInventory {
            seed_id: seed_id.to_string(),
            saved_at: Utc::now(),
            players: self
                .registry
                .players
                .iter()
                .map(|(player_id, store)| StoredPlayer {
                    player_id: *player_id,
                    entries: store.entries(),
                })
                .collect(),
        };
        persist::save_json(store, &storage_key(seed_id), &stored)?;
        info!(seed = seed_id, players = stored.players.len(), "saved desired inventory");
        Ok(())
    }

    /// Drop in-memory state without touching persisted storage.
    pub fn reset(&mut self) {
        self.seed_id = None;
        self.registry.clear();
    }

    /// Seed the state is bound to.
    pub fn seed_id(&self) -> Option<&str> {
        self.seed_id.as_deref()
    }

    /// Mirrored per-player state.
    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// Mutable mirrored per-player state.
    pub fn registry_mut(&mut self) -> &mut PlayerRegistry {
        &mut self.registry
    }
}

fn storage_key(seed_id: &str) -> String {
    format!("desired/{seed_id}")
}

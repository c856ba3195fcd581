//! Reclaiming litter into the logistics network.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::WorldError,
    models::ItemId,
    network::LogisticsNetwork,
    world::World,
};

/// Litter waiting to be reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashTask {
    /// Item lying on the ground.
    pub item_id: ItemId,
    /// Items still to reclaim.
    pub count: u32,
    /// Host identifier of the litter object.
    pub source_object_id: u64,
}

/// Result of a [`TrashHandler::process_tasks`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TrashReport {
    /// `(item, count)` moved into stations this pass.
    pub reclaimed: Vec<(ItemId, u32)>,
    /// Tasks dropped because their litter object disappeared.
    pub dropped: usize,
}

/// FIFO queue of litter reclaim tasks.
///
/// Enqueue filtering (feature flag, network readiness, item presence)
/// happens at the call site.
#[derive(Debug, Default)]
pub struct TrashHandler {
    queue: VecDeque<TrashTask>,
}

impl TrashHandler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reclaim task.
    pub fn add_task(&mut self, item_id: ItemId, count: u32, source_object_id: u64) {
        if count == 0 {
            return;
        }
        self.queue.push_back(TrashTask {
            item_id,
            count,
            source_object_id,
        });
    }

    /// Pending tasks in processing order.
    pub fn pending(&self) -> impl Iterator<Item = &TrashTask> {
        self.queue.iter()
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every queued task.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Reclaim as much queued litter as the network index allows.
    ///
    /// Each item is limited to the quantity the index currently reports;
    /// unreclaimed remainders stay queued for the next pass.
    pub fn process_tasks<W: World + ?Sized>(
        &mut self,
        world: &mut W,
        network: &LogisticsNetwork,
    ) -> TrashReport {
        let mut report = TrashReport::default();
        if self.queue.is_empty() {
            return report;
        }

        let snapshot = network.snapshot();
        let mut budget: HashMap<ItemId, u32> = HashMap::new();
        let mut remaining = VecDeque::with_capacity(self.queue.len());

        while let Some(mut task) = self.queue.pop_front() {
            let Some(entry) = snapshot.entry(task.item_id) else {
                remaining.push_back(task);
                continue;
            };
            let allowance = budget
                .entry(task.item_id)
                .or_insert_with(|| network.available(task.item_id));
            let Some(station) = entry.source_locations.first().map(|source| source.station_id)
            else {
                remaining.push_back(task);
                continue;
            };

            let wanted = task.count.min(*allowance);
            if wanted == 0 || !world.station_exists(station) {
                remaining.push_back(task);
                continue;
            }

            let removed = match world.remove_trash(task.source_object_id, task.item_id, wanted) {
                Ok(removed) => removed,
                Err(WorldError::TrashMissing(object)) => {
                    debug!(object, item = %task.item_id, "litter vanished, dropping task");
                    report.dropped += 1;
                    continue;
                }
                Err(err) => {
                    debug!("trash pickup deferred: {err}");
                    remaining.push_back(task);
                    continue;
                }
            };

            let stored = match world.store_in_station(station, task.item_id, removed) {
                Ok(stored) => stored.min(removed),
                Err(err) => {
                    debug!("failed to store reclaimed litter: {err}");
                    0
                }
            };
            if let Err(err) =
                world.return_trash(task.source_object_id, task.item_id, removed - stored)
            {
                warn!(
                    object = task.source_object_id,
                    item = %task.item_id,
                    lost = removed - stored,
                    "could not put unstored litter back: {err}"
                );
            }
            task.count = task.count.saturating_sub(stored);

            *allowance -= stored.min(*allowance);
            if stored > 0 {
                report.reclaimed.push((task.item_id, stored));
            }
            if task.count > 0 {
                remaining.push_back(task);
            }
        }

        self.queue = remaining;
        if !report.reclaimed.is_empty() {
            info!(
                reclaimed = report.reclaimed.len(),
                pending = self.queue.len(),
                "reclaimed litter into logistics network"
            );
        }
        report
    }
}

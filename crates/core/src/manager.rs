//! Reconciliation of desired inventory against held items and the network.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    desired::{DesiredInventoryStore, DesiredItemEntry},
    error::LogisticsError,
    models::{ItemId, PlayerId, StationId},
    network::LogisticsNetwork,
    shipping::{ShipmentDirection, ShipmentStatus, ShipmentTask, ShippingManager},
    world::World,
};

/// Outcome of one [`PersonalLogisticsManager::sync_inventory`] pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Whether the pass ran at all.
    pub ran: bool,
    /// Tasks registered with the shipping manager.
    pub created: Vec<ShipmentTask>,
    /// Items that could not be served this pass.
    pub unavailable: Vec<ItemId>,
}

/// Turns desired-inventory gaps into shipment tasks.
///
/// Entries are visited in ascending item order and the first entry to
/// claim a scarce item wins. There is no fairness between items.
#[derive(Debug, Clone)]
pub struct PersonalLogisticsManager {
    player_id: PlayerId,
    travel_ticks: u64,
}

impl PersonalLogisticsManager {
    /// Manager for `player_id` whose shipments take `travel_ticks`.
    pub fn new(player_id: PlayerId, travel_ticks: u64) -> Self {
        Self {
            player_id,
            travel_ticks,
        }
    }

    /// Compare desired, held and inbound quantities and queue shipments.
    ///
    /// Does nothing until the network has completed its first scan.
    pub fn sync_inventory<W: World + ?Sized>(
        &self,
        desired: &DesiredInventoryStore,
        world: &W,
        network: &LogisticsNetwork,
        shipping: &mut ShippingManager,
        now: u64,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        if !network.is_first_load_complete() {
            debug!("network index not loaded yet, skipping inventory sync");
            return report;
        }
        report.ran = true;

        let mut claimed = queued_claims(shipping);
        for entry in desired.iter() {
            let held = world.held_quantity(self.player_id, entry.item_id);
            let outcome = self
                .request_missing(entry, held, network, shipping, &mut claimed, now)
                .and_then(|mut tasks| {
                    tasks.extend(self.recycle_surplus(entry, held, network, shipping, now)?);
                    Ok(tasks)
                });

            match outcome {
                Ok(tasks) => report.created.extend(tasks),
                Err(err) => {
                    debug!("{err}, retrying next cycle");
                    report.unavailable.push(entry.item_id);
                }
            }
        }

        if !report.created.is_empty() {
            info!(
                created = report.created.len(),
                unavailable = report.unavailable.len(),
                "inventory sync queued shipments"
            );
        }
        report
    }

    fn request_missing(
        &self,
        entry: &DesiredItemEntry,
        held: u32,
        network: &LogisticsNetwork,
        shipping: &mut ShippingManager,
        claimed: &mut HashMap<(StationId, ItemId), u32>,
        now: u64,
    ) -> Result<Vec<ShipmentTask>, LogisticsError> {
        let item = entry.item_id;
        let on_hand = held
            .saturating_add(shipping.buffered_quantity(item))
            .saturating_add(shipping.inbound_quantity(item));
        if on_hand >= entry.request_min {
            return Ok(Vec::new());
        }

        let deficit = entry.request_min - on_hand;
        let index_entry = network.entry(item).ok_or(LogisticsError::Unavailable(item))?;
        let mut remaining = network.reserve(item, deficit);
        if remaining == 0 {
            return Err(LogisticsError::Unavailable(item));
        }

        let mut created = Vec::new();
        for source in &index_entry.source_locations {
            if remaining == 0 {
                break;
            }
            let already = claimed.entry((source.station_id, item)).or_insert(0);
            let quantity = source.quantity.saturating_sub(*already).min(remaining);
            if quantity == 0 {
                continue;
            }
            *already += quantity;
            remaining -= quantity;

            let task = ShipmentTask::new(
                self.player_id,
                item,
                quantity,
                ShipmentDirection::Delivery,
                source.station_id,
                now,
                self.travel_ticks,
            );
            let id = shipping.enqueue(task, quantity);
            created.extend(shipping.tasks().iter().find(|task| task.id == id).cloned());
        }

        if remaining > 0 {
            network.release(item, remaining);
        }
        if created.is_empty() {
            return Err(LogisticsError::Unavailable(item));
        }
        Ok(created)
    }

    fn recycle_surplus(
        &self,
        entry: &DesiredItemEntry,
        held: u32,
        network: &LogisticsNetwork,
        shipping: &mut ShippingManager,
        now: u64,
    ) -> Result<Vec<ShipmentTask>, LogisticsError> {
        if !entry.recycles() {
            return Ok(Vec::new());
        }
        let item = entry.item_id;
        let keeping = held.saturating_sub(shipping.outbound_quantity(item));
        if keeping <= entry.recycle_max {
            return Ok(Vec::new());
        }

        let snapshot = network.snapshot();
        let station = snapshot
            .entry(item)
            .and_then(|indexed| indexed.source_locations.first())
            .map(|source| source.station_id)
            .or_else(|| snapshot.stations().first().copied())
            .ok_or(LogisticsError::Unavailable(item))?;

        let task = ShipmentTask::new(
            self.player_id,
            item,
            keeping - entry.recycle_max,
            ShipmentDirection::Recycle,
            station,
            now,
            self.travel_ticks,
        )
        .keeping(entry.recycle_max);
        let id = shipping.enqueue(task, 0);
        Ok(shipping
            .tasks()
            .iter()
            .filter(|task| task.id == id)
            .cloned()
            .collect())
    }
}

fn queued_claims(shipping: &ShippingManager) -> HashMap<(StationId, ItemId), u32> {
    let mut claims = HashMap::new();
    for task in shipping.tasks() {
        if task.is_delivery() && task.status() == ShipmentStatus::Queued {
            *claims.entry((task.station_id, task.item_id)).or_insert(0) += task.quantity;
        }
    }
    claims
}

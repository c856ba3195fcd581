use std::collections::BTreeMap;

use serde::Serialize;

use super::{ShipmentStatus, ShipmentTask};
use crate::models::{ticks_to_seconds, ItemId};

/// Display projection of inbound shipments for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemLoadState {
    /// Item being delivered.
    pub item_id: ItemId,
    /// Display name of the item.
    pub item_name: String,
    /// Total quantity on the way.
    pub quantity: u32,
    /// Quantity-weighted progress in `0..=100`.
    pub percent_loaded: u8,
    /// Seconds until the slowest shipment arrives.
    pub seconds_remaining: u64,
}

impl ItemLoadState {
    /// Group active deliveries by item, in item order.
    pub fn collect<'a>(
        tasks: impl IntoIterator<Item = &'a ShipmentTask>,
        now: u64,
        item_name: impl Fn(ItemId) -> String,
    ) -> Vec<ItemLoadState> {
        #[derive(Default)]
        struct Totals {
            quantity: u64,
            weighted_percent: u64,
            remaining_ticks: u64,
        }

        let mut grouped: BTreeMap<ItemId, Totals> = BTreeMap::new();
        for task in tasks {
            if !task.is_delivery() || task.status().is_terminal() {
                continue;
            }
            let totals = grouped.entry(task.item_id).or_default();
            let quantity = u64::from(task.quantity);
            totals.quantity += quantity;
            totals.weighted_percent += quantity * u64::from(task.percent_complete(now));
            let remaining = match task.status() {
                ShipmentStatus::Queued => task.travel_ticks,
                _ => task.remaining_ticks(now),
            };
            totals.remaining_ticks = totals.remaining_ticks.max(remaining);
        }

        grouped
            .into_iter()
            .filter(|(_, totals)| totals.quantity > 0)
            .map(|(item_id, totals)| ItemLoadState {
                item_id,
                item_name: item_name(item_id),
                quantity: totals.quantity.min(u64::from(u32::MAX)) as u32,
                percent_loaded: (totals.weighted_percent / totals.quantity).min(100) as u8,
                seconds_remaining: ticks_to_seconds(totals.remaining_ticks),
            })
            .collect()
    }
}

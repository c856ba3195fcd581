use serde::{Deserialize, Serialize};

use crate::{
    error::LogisticsError,
    models::{ItemId, PlayerId, StationId},
};

/// Lifecycle of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    /// Created, waiting for the next processing pass.
    Queued,
    /// Items left their origin and are on the way.
    InTransit,
    /// Completed successfully.
    Delivered,
    /// Abandoned; never retried.
    Failed,
}

impl ShipmentStatus {
    /// `Delivered` and `Failed` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Whether moving to `next` follows the allowed progression.
    pub fn can_transition_to(self, next: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        matches!(
            (self, next),
            (Queued, InTransit) | (Queued, Failed) | (InTransit, Delivered) | (InTransit, Failed)
        )
    }
}

/// Which way the items travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentDirection {
    /// From a station into the player's inventory.
    Delivery,
    /// From the player's inventory back into a station.
    Recycle,
}

/// One item type moving in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentTask {
    /// Unique within the owning shipping manager.
    pub id: u64,
    /// Player the shipment belongs to.
    pub player_id: PlayerId,
    /// Item carried.
    pub item_id: ItemId,
    /// Quantity carried.
    pub quantity: u32,
    /// Delivery or recycle.
    pub direction: ShipmentDirection,
    /// Origin for deliveries, destination for recycles.
    pub station_id: StationId,
    /// Tick at which the task was created.
    pub origin_tick: u64,
    /// Tick at which the items left, once in transit.
    #[serde(default)]
    pub departed_tick: Option<u64>,
    /// Ticks spent travelling.
    pub travel_ticks: u64,
    /// Holdings a recycle must leave with the player when it completes.
    #[serde(default)]
    pub keep_at_least: u32,
    status: ShipmentStatus,
}

impl ShipmentTask {
    /// Create a queued task.
    pub fn new(
        player_id: PlayerId,
        item_id: ItemId,
        quantity: u32,
        direction: ShipmentDirection,
        station_id: StationId,
        origin_tick: u64,
        travel_ticks: u64,
    ) -> Self {
        Self {
            id: 0,
            player_id,
            item_id,
            quantity,
            direction,
            station_id,
            origin_tick,
            departed_tick: None,
            travel_ticks,
            keep_at_least: 0,
            status: ShipmentStatus::Queued,
        }
    }

    /// Never take the player below `floor` items.
    pub fn keeping(mut self, floor: u32) -> Self {
        self.keep_at_least = floor;
        self
    }

    /// Current status.
    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    /// Move to `next`, refusing regressions and exits from terminal states.
    pub fn transition(&mut self, next: ShipmentStatus) -> Result<(), LogisticsError> {
        if !self.status.can_transition_to(next) {
            return Err(LogisticsError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the task departed at `now`.
    pub fn depart(&mut self, now: u64) -> Result<(), LogisticsError> {
        self.transition(ShipmentStatus::InTransit)?;
        self.departed_tick = Some(now);
        Ok(())
    }

    /// Ticks still needed before arrival at `now`.
    pub fn remaining_ticks(&self, now: u64) -> u64 {
        match self.departed_tick {
            Some(departed) => self
                .travel_ticks
                .saturating_sub(now.saturating_sub(departed)),
            None => self.travel_ticks,
        }
    }

    /// Move tick stamps taken on a clock that read `saved_at` onto one that reads `now`.
    ///
    /// Elapsed transit time is preserved; when `now` is too small to hold it
    /// the task restarts from tick zero.
    pub fn rebase(&mut self, saved_at: u64, now: u64) {
        let shift = |tick: u64| now.saturating_sub(saved_at.saturating_sub(tick));
        self.origin_tick = shift(self.origin_tick);
        self.departed_tick = self.departed_tick.map(shift);
    }

    /// Whether an in-transit task has arrived by `now`.
    pub fn has_arrived(&self, now: u64) -> bool {
        self.status == ShipmentStatus::InTransit && self.remaining_ticks(now) == 0
    }

    /// Progress in `0..=100`.
    pub fn percent_complete(&self, now: u64) -> u8 {
        if self.travel_ticks == 0 {
            return if self.departed_tick.is_some() { 100 } else { 0 };
        }
        let travelled = self.travel_ticks - self.remaining_ticks(now);
        ((travelled * 100) / self.travel_ticks).min(100) as u8
    }

    /// Whether items travel towards the player.
    pub fn is_delivery(&self) -> bool {
        self.direction == ShipmentDirection::Delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ShipmentTask {
        ShipmentTask::new(
            PlayerId(1),
            ItemId(42),
            60,
            ShipmentDirection::Delivery,
            StationId(3),
            100,
            600,
        )
    }

    #[test]
    fn terminal_states_are_final() {
        let mut delivered = task();
        delivered.depart(100).expect("depart");
        delivered
            .transition(ShipmentStatus::Delivered)
            .expect("deliver");
        for next in [
            ShipmentStatus::Queued,
            ShipmentStatus::InTransit,
            ShipmentStatus::Failed,
            ShipmentStatus::Delivered,
        ] {
            assert!(delivered.transition(next).is_err());
        }
        assert_eq!(delivered.status(), ShipmentStatus::Delivered);

        let mut failed = task();
        failed.transition(ShipmentStatus::Failed).expect("fail");
        assert!(failed.transition(ShipmentStatus::Queued).is_err());
        assert!(failed.depart(200).is_err());
    }

    #[test]
    fn cannot_skip_transit() {
        let mut queued = task();
        assert!(queued.transition(ShipmentStatus::Delivered).is_err());
        assert_eq!(queued.status(), ShipmentStatus::Queued);
    }

    #[test]
    fn progress_tracks_departure() {
        let mut task = task();
        assert_eq!(task.percent_complete(500), 0);
        assert_eq!(task.remaining_ticks(500), 600);
        task.depart(1000).expect("depart");
        assert_eq!(task.percent_complete(1300), 50);
        assert_eq!(task.remaining_ticks(1300), 300);
        assert!(!task.has_arrived(1599));
        assert!(task.has_arrived(1600));
        assert_eq!(task.percent_complete(5000), 100);
    }

    #[test]
    fn rebase_keeps_elapsed_transit_time() {
        let mut task = task();
        task.depart(1_000_000).expect("depart");
        task.rebase(1_000_400, 0);
        assert_eq!(task.departed_tick, Some(0));
        assert_eq!(task.remaining_ticks(0), 600);

        let mut task = self::task();
        task.depart(1_000_000).expect("depart");
        task.rebase(1_000_400, 1000);
        assert_eq!(task.departed_tick, Some(600));
        assert_eq!(task.remaining_ticks(1000), 200);
        assert!(task.has_arrived(1200));
    }
}

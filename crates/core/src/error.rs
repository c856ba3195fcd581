//! Error taxonomy for the logistics core.
//!
//! None of these are fatal to the host: callers log them and treat the
//! affected feature as inactive until the next cycle.

use thiserror::Error;

use crate::models::{ItemId, StationId};
use crate::shipping::ShipmentStatus;

/// Failures surfaced by the logistics components.
#[derive(Debug, Error)]
pub enum LogisticsError {
    /// The requested item is not present in the network index.
    #[error("item {0} is not available in the logistics network")]
    Unavailable(ItemId),
    /// A shipment's station vanished before the shipment completed.
    #[error("{station} no longer exists (item {item})")]
    StaleSource {
        /// Station that could not be resolved.
        station: StationId,
        /// Item carried by the shipment.
        item: ItemId,
    },
    /// A persisted blob could not be decoded.
    #[error("failed to decode persisted state `{key}`: {source}")]
    Serialization {
        /// Blob key that failed to decode.
        key: String,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// A sync message could not be decoded or made no sense.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A shipment task was asked to move backwards or out of a terminal state.
    #[error("illegal shipment transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: ShipmentStatus,
        /// Requested status.
        to: ShipmentStatus,
    },
    /// Background work was requested outside of a tokio runtime.
    #[error("no async runtime available: {0}")]
    Runtime(String),
}

/// Failures reported by the world collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The station no longer exists.
    #[error("{0} does not exist")]
    StationMissing(StationId),
    /// The trash object was already collected or despawned.
    #[error("trash object {0} does not exist")]
    TrashMissing(u64),
    /// The world could not be read right now.
    #[error("world unavailable: {0}")]
    Unavailable(String),
}

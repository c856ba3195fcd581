#![allow(missing_docs)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    desired::DesiredItemEntry,
    error::LogisticsError,
    models::{ItemId, PlayerId},
};

/// Packets exchanged between peers of a multiplayer session.
///
/// Limits travel as signed integers so a misbehaving peer cannot make
/// decoding fail; receivers clamp them into range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Sent once by a joining client.
    ClientStateRequest { player_id: PlayerId },
    /// The authority's answer to a state request.
    ClientStateResponse {
        player_id: PlayerId,
        #[serde(default)]
        entries: Vec<DesiredItemEntry>,
    },
    /// Full replacement of one item's limits for one player.
    DesiredItemUpdate {
        player_id: PlayerId,
        item_id: ItemId,
        request_min: i64,
        recycle_max: i64,
    },
    /// Observed personal-buffer quantity at a point in game time.
    BufferedItemUpsert {
        player_id: PlayerId,
        item_id: ItemId,
        item_count: u32,
        game_tick: u64,
    },
}

impl SyncMessage {
    pub fn desired_item_update(player_id: PlayerId, entry: DesiredItemEntry) -> Self {
        Self::DesiredItemUpdate {
            player_id,
            item_id: entry.item_id,
            request_min: i64::from(entry.request_min),
            recycle_max: i64::from(entry.recycle_max),
        }
    }

    /// Player the message is about.
    pub fn player_id(&self) -> PlayerId {
        match self {
            Self::ClientStateRequest { player_id }
            | Self::ClientStateResponse { player_id, .. }
            | Self::DesiredItemUpdate { player_id, .. }
            | Self::BufferedItemUpsert { player_id, .. } => *player_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientStateRequest { .. } => "client_state_request",
            Self::ClientStateResponse { .. } => "client_state_response",
            Self::DesiredItemUpdate { .. } => "desired_item_update",
            Self::BufferedItemUpsert { .. } => "buffered_item_upsert",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).with_context(|| format!("failed to encode {}", self.kind()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LogisticsError> {
        serde_json::from_slice(bytes)
            .map_err(|err| LogisticsError::ProtocolViolation(format!("undecodable packet: {err}")))
    }
}

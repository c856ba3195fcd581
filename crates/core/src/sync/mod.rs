//! Multiplayer synchronisation of desired inventory and buffer state.
//!
//! Packets received on transport threads are queued through an
//! [`InboxHandle`] and only decoded and applied by [`SyncLayer::drain`],
//! which runs on the simulation thread.

mod messages;
mod transport;

pub use messages::SyncMessage;
pub use transport::{InboundPacket, InboxHandle, LoopbackHub, LoopbackTransport, Target, Transport};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    cross_seed::{BufferedObservation, PlayerRegistry},
    desired::DesiredItemEntry,
    error::LogisticsError,
    models::{ItemId, PlayerId},
};

/// Part this peer plays in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRole {
    /// Single player; nothing is sent.
    Offline,
    /// Session host holding the canonical cross-player state.
    Authority,
    /// Joined peer.
    Client,
}

/// Counts from one [`SyncLayer::drain`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages that changed local state.
    pub applied: usize,
    /// Messages rejected as protocol violations.
    pub dropped: usize,
    /// Whether the authority's state snapshot arrived.
    pub state_received: bool,
}

/// Encodes outgoing changes and applies incoming ones.
pub struct SyncLayer {
    role: SyncRole,
    local: PlayerId,
    transport: Option<Arc<dyn Transport>>,
    inbox_tx: mpsc::UnboundedSender<InboundPacket>,
    inbox_rx: mpsc::UnboundedReceiver<InboundPacket>,
    state_requested: bool,
}

impl SyncLayer {
    /// Layer for a networked session.
    pub fn new(role: SyncRole, local: PlayerId, transport: Arc<dyn Transport>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            role,
            local,
            transport: Some(transport),
            inbox_tx,
            inbox_rx,
            state_requested: false,
        }
    }

    /// Layer for a single-player session.
    pub fn offline(local: PlayerId) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            role: SyncRole::Offline,
            local,
            transport: None,
            inbox_tx,
            inbox_rx,
            state_requested: false,
        }
    }

    /// Role of this peer.
    pub fn role(&self) -> SyncRole {
        self.role
    }

    /// Player this peer speaks for.
    pub fn local_player(&self) -> PlayerId {
        self.local
    }

    /// Handle for the transport to push received packets into.
    pub fn inbox(&self) -> InboxHandle {
        InboxHandle::new(self.inbox_tx.clone())
    }

    /// Ask the authority for this player's saved state. Sent at most once.
    pub fn request_state_from_host(&mut self) {
        if self.role != SyncRole::Client || self.state_requested {
            return;
        }
        self.state_requested = true;
        info!(player = %self.local, "requesting desired inventory from host");
        self.send(
            Target::Authority,
            &SyncMessage::ClientStateRequest {
                player_id: self.local,
            },
        );
    }

    /// Announce a local desired-entry change to the other peers.
    pub fn send_desired_item_update(&self, entry: DesiredItemEntry) {
        let target = match self.role {
            SyncRole::Offline => return,
            SyncRole::Authority => Target::Broadcast,
            SyncRole::Client => Target::Authority,
        };
        self.send(target, &SyncMessage::desired_item_update(self.local, entry));
    }

    /// Announce the local personal-buffer count for an item.
    pub fn notify_buffer_upsert(&self, item_id: ItemId, item_count: u32, game_tick: u64) {
        let target = match self.role {
            SyncRole::Offline => return,
            SyncRole::Authority => Target::Broadcast,
            SyncRole::Client => Target::Authority,
        };
        self.send(
            target,
            &SyncMessage::BufferedItemUpsert {
                player_id: self.local,
                item_id,
                item_count,
                game_tick,
            },
        );
    }

    fn send(&self, target: Target, message: &SyncMessage) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("{err:#}");
                return;
            }
        };
        if let Err(err) = transport.send(target, bytes) {
            warn!(kind = message.kind(), "failed to send packet: {err:#}");
        }
    }

    /// Apply every queued packet to `registry`.
    pub fn drain(&mut self, registry: &mut PlayerRegistry) -> DrainReport {
        let mut report = DrainReport::default();
        while let Ok(packet) = self.inbox_rx.try_recv() {
            let outcome = SyncMessage::decode(&packet.bytes)
                .and_then(|message| self.handle(packet.from, message, registry, &mut report));
            match outcome {
                Ok(true) => report.applied += 1,
                Ok(false) => {}
                Err(err) => {
                    report.dropped += 1;
                    warn!(from = %packet.from, "dropping packet: {err}");
                }
            }
        }
        report
    }

    fn handle(
        &self,
        from: PlayerId,
        message: SyncMessage,
        registry: &mut PlayerRegistry,
        report: &mut DrainReport,
    ) -> Result<bool, LogisticsError> {
        if self.role == SyncRole::Authority && message.player_id() != from {
            return Err(LogisticsError::ProtocolViolation(format!(
                "{} for {} sent by {from}",
                message.kind(),
                message.player_id()
            )));
        }

        match message {
            SyncMessage::ClientStateRequest { player_id } => {
                if self.role != SyncRole::Authority {
                    return Err(LogisticsError::ProtocolViolation(
                        "state request sent to a non-authority peer".to_string(),
                    ));
                }
                let entries = registry.entries_for(player_id);
                debug!(player = %player_id, entries = entries.len(), "answering state request");
                self.send(
                    Target::Player(player_id),
                    &SyncMessage::ClientStateResponse { player_id, entries },
                );
                Ok(false)
            }
            SyncMessage::ClientStateResponse { player_id, entries } => {
                if self.role != SyncRole::Client || player_id != self.local {
                    return Err(LogisticsError::ProtocolViolation(format!(
                        "unexpected state response for {player_id}"
                    )));
                }
                info!(entries = entries.len(), "received desired inventory from host");
                registry.replace(player_id, entries);
                report.state_received = true;
                Ok(true)
            }
            SyncMessage::DesiredItemUpdate {
                player_id,
                item_id,
                request_min,
                recycle_max,
            } => {
                let entry = DesiredItemEntry::clamped(item_id, request_min, recycle_max);
                let changed = registry.apply(player_id, entry);
                if self.role == SyncRole::Authority {
                    self.send(
                        Target::BroadcastExcept(from),
                        &SyncMessage::desired_item_update(player_id, entry),
                    );
                }
                Ok(changed)
            }
            SyncMessage::BufferedItemUpsert {
                player_id,
                item_id,
                item_count,
                game_tick,
            } => {
                let changed = registry.observe_buffer(
                    player_id,
                    item_id,
                    BufferedObservation {
                        item_count,
                        game_tick,
                    },
                );
                if changed && self.role == SyncRole::Authority {
                    self.send(
                        Target::BroadcastExcept(from),
                        &SyncMessage::BufferedItemUpsert {
                            player_id,
                            item_id,
                            item_count,
                            game_tick,
                        },
                    );
                }
                Ok(changed)
            }
        }
    }
}

impl std::fmt::Debug for SyncLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLayer")
            .field("role", &self.role)
            .field("local", &self.local)
            .field("state_requested", &self.state_requested)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: PlayerId = PlayerId(1);
    const GUEST: PlayerId = PlayerId(2);
    const THIRD: PlayerId = PlayerId(3);

    fn peer(hub: &Arc<LoopbackHub>, player: PlayerId, role: SyncRole) -> SyncLayer {
        let layer = SyncLayer::new(role, player, hub.transport_for(player));
        hub.connect(player, layer.inbox(), role == SyncRole::Authority);
        layer
    }

    #[test]
    fn state_request_without_record_returns_empty_set() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, HOST, SyncRole::Authority);
        let mut guest = peer(&hub, GUEST, SyncRole::Client);
        let mut host_registry = PlayerRegistry::default();
        let mut guest_registry = PlayerRegistry::default();
        guest_registry.apply(GUEST, DesiredItemEntry::clamped(ItemId(1), 5, 10));

        guest.request_state_from_host();
        guest.request_state_from_host();
        let report = host.drain(&mut host_registry);
        assert_eq!(report.dropped, 0);

        let report = guest.drain(&mut guest_registry);
        assert!(report.state_received);
        assert!(guest_registry.entries_for(GUEST).is_empty());
    }

    #[test]
    fn state_request_returns_recorded_entries() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, HOST, SyncRole::Authority);
        let mut guest = peer(&hub, GUEST, SyncRole::Client);
        let mut host_registry = PlayerRegistry::default();
        host_registry.apply(GUEST, DesiredItemEntry::clamped(ItemId(42), 100, 150));
        let mut guest_registry = PlayerRegistry::default();

        guest.request_state_from_host();
        host.drain(&mut host_registry);
        guest.drain(&mut guest_registry);
        assert_eq!(
            guest_registry.entries_for(GUEST),
            vec![DesiredItemEntry::clamped(ItemId(42), 100, 150)]
        );
    }

    #[test]
    fn updates_are_idempotent_and_clamped() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, HOST, SyncRole::Authority);
        let guest = peer(&hub, GUEST, SyncRole::Client);
        let mut registry = PlayerRegistry::default();

        let raw = SyncMessage::DesiredItemUpdate {
            player_id: GUEST,
            item_id: ItemId(9),
            request_min: 80,
            recycle_max: 10,
        }
        .encode()
        .expect("encode");
        host.inbox().deliver(GUEST, raw.clone());
        let first = host.drain(&mut registry);
        let after_once = registry.entries_for(GUEST);
        host.inbox().deliver(GUEST, raw);
        let second = host.drain(&mut registry);

        assert_eq!(first.applied, 1);
        assert_eq!(second.applied, 0);
        assert_eq!(registry.entries_for(GUEST), after_once);
        assert_eq!(after_once[0].recycle_max, 80);
        drop(guest);
    }

    #[test]
    fn disjoint_updates_converge_across_peers() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, HOST, SyncRole::Authority);
        let mut guest = peer(&hub, GUEST, SyncRole::Client);
        let mut third = peer(&hub, THIRD, SyncRole::Client);
        let mut registries = [
            PlayerRegistry::default(),
            PlayerRegistry::default(),
            PlayerRegistry::default(),
        ];

        let host_entry = DesiredItemEntry::clamped(ItemId(1), 10, 20);
        registries[0].apply(HOST, host_entry);
        host.send_desired_item_update(host_entry);

        let guest_entry = DesiredItemEntry::clamped(ItemId(2), 30, 40);
        registries[1].apply(GUEST, guest_entry);
        guest.send_desired_item_update(guest_entry);

        host.drain(&mut registries[0]);
        guest.drain(&mut registries[1]);
        third.drain(&mut registries[2]);

        for registry in &registries {
            assert_eq!(registry.entries_for(HOST), vec![host_entry]);
            assert_eq!(registry.entries_for(GUEST), vec![guest_entry]);
        }
    }

    #[test]
    fn authority_rejects_spoofed_and_malformed_packets() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, HOST, SyncRole::Authority);
        let mut registry = PlayerRegistry::default();

        let spoofed = SyncMessage::DesiredItemUpdate {
            player_id: THIRD,
            item_id: ItemId(1),
            request_min: 1,
            recycle_max: 1,
        }
        .encode()
        .expect("encode");
        host.inbox().deliver(GUEST, spoofed);
        host.inbox().deliver(GUEST, b"\x00\x01".to_vec());

        let report = host.drain(&mut registry);
        assert_eq!(report.dropped, 2);
        assert!(registry.entries_for(THIRD).is_empty());
    }

    #[test]
    fn buffer_upserts_are_relayed() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, HOST, SyncRole::Authority);
        let guest = peer(&hub, GUEST, SyncRole::Client);
        let mut third = peer(&hub, THIRD, SyncRole::Client);
        let mut host_registry = PlayerRegistry::default();
        let mut third_registry = PlayerRegistry::default();

        guest.notify_buffer_upsert(ItemId(42), 12, 3600);
        host.drain(&mut host_registry);
        third.drain(&mut third_registry);

        for registry in [&host_registry, &third_registry] {
            assert_eq!(
                registry.buffered(GUEST, ItemId(42)),
                Some(BufferedObservation {
                    item_count: 12,
                    game_tick: 3600
                })
            );
        }
    }

    #[test]
    fn offline_layer_sends_nothing() {
        let mut layer = SyncLayer::offline(HOST);
        layer.request_state_from_host();
        layer.send_desired_item_update(DesiredItemEntry::clamped(ItemId(1), 1, 1));
        assert_eq!(layer.drain(&mut PlayerRegistry::default()), DrainReport::default());
    }
}

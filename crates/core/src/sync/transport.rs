use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::PlayerId;

/// Where an outgoing packet should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The session host.
    Authority,
    /// A single peer.
    Player(PlayerId),
    /// Every other peer.
    Broadcast,
    /// Every other peer except one.
    BroadcastExcept(PlayerId),
}

/// Reliable, per-sender ordered packet transport provided by the host.
pub trait Transport: Send + Sync {
    /// Queue `bytes` for delivery to `target`.
    fn send(&self, target: Target, bytes: Vec<u8>) -> Result<()>;
}

/// Raw packet waiting to be applied on the simulation thread.
#[derive(Debug)]
pub struct InboundPacket {
    /// Peer that sent the packet.
    pub from: PlayerId,
    /// Encoded message.
    pub bytes: Vec<u8>,
}

/// Thread-safe entry point the transport uses to hand over received packets.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    tx: mpsc::UnboundedSender<InboundPacket>,
}

impl InboxHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<InboundPacket>) -> Self {
        Self { tx }
    }

    /// Queue a received packet. Returns `false` once the session is gone.
    pub fn deliver(&self, from: PlayerId, bytes: Vec<u8>) -> bool {
        self.tx.send(InboundPacket { from, bytes }).is_ok()
    }
}

/// In-process transport joining several peers, for tests and the headless driver.
#[derive(Debug, Default)]
pub struct LoopbackHub {
    peers: RwLock<HashMap<PlayerId, InboxHandle>>,
    authority: RwLock<Option<PlayerId>>,
}

impl LoopbackHub {
    /// Create a hub with no peers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport that sends as `player`.
    pub fn transport_for(self: &Arc<Self>, player: PlayerId) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport {
            hub: Arc::clone(self),
            player,
        })
    }

    /// Attach a peer's inbox; the first peer marked `authority` hosts the session.
    pub fn connect(&self, player: PlayerId, inbox: InboxHandle, authority: bool) {
        self.peers.write().insert(player, inbox);
        if authority {
            self.authority.write().get_or_insert(player);
        }
    }

    /// Detach a peer.
    pub fn disconnect(&self, player: PlayerId) {
        self.peers.write().remove(&player);
        let mut authority = self.authority.write();
        if *authority == Some(player) {
            *authority = None;
        }
    }

    fn route(&self, from: PlayerId, target: Target, bytes: Vec<u8>) -> Result<()> {
        let peers = self.peers.read();
        let recipients: Vec<PlayerId> = match target {
            Target::Authority => {
                let authority = (*self.authority.read())
                    .ok_or_else(|| anyhow!("no authority connected"))?;
                vec![authority]
            }
            Target::Player(player) => vec![player],
            Target::Broadcast => peers.keys().copied().filter(|p| *p != from).collect(),
            Target::BroadcastExcept(excluded) => peers
                .keys()
                .copied()
                .filter(|p| *p != from && *p != excluded)
                .collect(),
        };

        for recipient in recipients {
            let inbox = peers
                .get(&recipient)
                .ok_or_else(|| anyhow!("peer {recipient} not connected"))?;
            if !inbox.deliver(from, bytes.clone()) {
                debug!(%recipient, "dropping packet for closed inbox");
            }
        }
        Ok(())
    }
}

/// Sending half of a [`LoopbackHub`] for one peer.
#[derive(Debug)]
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
    player: PlayerId,
}

impl Transport for LoopbackTransport {
    fn send(&self, target: Target, bytes: Vec<u8>) -> Result<()> {
        self.hub.route(self.player, target, bytes)
    }
}

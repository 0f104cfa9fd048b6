//! Server-side view of one connected player.

use log::debug;
use shared::{EntityId, SessionPacket};
use tokio::sync::mpsc;

/// Identifier the map server gives each accepted connection.
pub type ConnectionId = u32;

/// One map connection: who it belongs to, where that player stands and how
/// to reach them. A session starts anonymous and learns its name from the
/// token in `MapConnect`.
#[derive(Debug)]
pub struct PlayerSession {
    pub id: ConnectionId,
    name: Option<String>,
    pub map: Option<String>,
    pub entity_id: Option<EntityId>,
    sender: mpsc::UnboundedSender<SessionPacket>,
}

impl PlayerSession {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<SessionPacket>) -> Self {
        Self {
            id,
            name: None,
            map: None,
            entity_id: None,
            sender,
        }
    }

    /// Binds the session to a player. Tokens are taken at face value.
    pub fn login(&mut self, token: &str) {
        debug!("Connection {} logged in as {}", self.id, token);
        self.name = Some(token.to_string());
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.name.is_some()
    }

    pub fn is_on(&self, map_id: &str) -> bool {
        self.map.as_deref() == Some(map_id)
    }

    /// Queues a packet for the connection's writer task. Returns false once
    /// the connection has gone away.
    pub fn send_event(&self, packet: SessionPacket) -> bool {
        self.sender.send(packet).is_ok()
    }

    /// Forgets the map placement, e.g. after walking through an exit.
    pub fn leave_map(&mut self) -> Option<(String, EntityId)> {
        let map = self.map.take();
        let entity = self.entity_id.take();
        map.zip(entity)
    }
}

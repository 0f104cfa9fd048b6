//! Map connection bookkeeping for the map server
//!
//! This module tracks every open map session, including:
//! - Connection lifecycle (accept, disconnect)
//! - Which map each session currently stands on
//! - Fan-out of pushes to every session on a map
//!
//! Only the map server's main loop touches the manager, so it needs no
//! locking of its own.

use crate::session::{ConnectionId, PlayerSession};
use log::{info, warn};
use shared::SessionPacket;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Manages all connected map sessions
///
/// Connection ids start at 1 and are never reused while the server runs.
/// A capacity limit keeps a misbehaving client from opening sessions
/// without bound.
pub struct ClientManager {
    /// Open sessions indexed by connection id
    sessions: HashMap<ConnectionId, PlayerSession>,
    /// Next id handed to an accepted connection
    next_connection_id: ConnectionId,
    /// Maximum number of concurrent sessions
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_connection_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns the connection id, or None when the server is at capacity.
    /// The session starts anonymous and off-map until its `MapConnect`.
    pub fn add_client(&mut self, sender: mpsc::UnboundedSender<SessionPacket>) -> Option<ConnectionId> {
        if self.sessions.len() >= self.max_clients {
            warn!("Rejecting connection, {} sessions open", self.sessions.len());
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.sessions.insert(id, PlayerSession::new(id, sender));
        info!("Connection {} opened", id);
        Some(id)
    }

    /// Removes a connection and hands back its session so the caller can
    /// clean up whatever the player left on a map.
    pub fn remove_client(&mut self, id: ConnectionId) -> Option<PlayerSession> {
        let session = self.sessions.remove(&id)?;
        info!(
            "Connection {} closed ({})",
            id,
            session.name().unwrap_or("anonymous")
        );
        Some(session)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&id)
    }

    /// Finds another open session already placed on a map under `token`.
    pub fn find_placed(&self, token: &str, except: ConnectionId) -> Option<ConnectionId> {
        self.sessions
            .values()
            .find(|session| {
                session.id != except && session.map.is_some() && session.name() == Some(token)
            })
            .map(|session| session.id)
    }

    /// Sends `packet` to every session on `map_id` except `exclude`.
    ///
    /// Returns how many sessions the packet was queued for. Sessions whose
    /// writer has already gone are skipped; their disconnect arrives
    /// through the main loop separately.
    pub fn broadcast(&self, map_id: &str, packet: &SessionPacket, exclude: Option<ConnectionId>) -> usize {
        self.sessions
            .values()
            .filter(|session| session.is_on(map_id) && Some(session.id) != exclude)
            .filter(|session| session.send_event(packet.clone()))
            .count()
    }

    /// Number of sessions currently placed on `map_id`.
    pub fn count_on(&self, map_id: &str) -> usize {
        self.sessions.values().filter(|session| session.is_on(map_id)).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

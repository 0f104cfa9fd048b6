//! The seam between the world and the outside: request/response fetches of
//! assets, images and player state, plus the persistent map session.

use crate::error::ClientError;
use shared::{
    Asset, AssetType, EntityId, EntityStateUpdate, EntityStub, InitialMapState, PlayerState,
    SessionPacket,
};
use tokio::sync::mpsc;

/// A push received on the map session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MapState(InitialMapState),
    PlayerEntityId(EntityId),
    EntityUpdated(EntityStateUpdate),
    EntityCreated(EntityStub),
    EntityDestroyed(EntityId),
    PlayerState(PlayerState),
    /// The server ended the session, with its reason if it refused it.
    Closed { reason: Option<String> },
    /// The connection failed underneath the session.
    Lost { reason: String },
}

impl SessionEvent {
    /// Maps a server push onto an event. Client-bound packets only; anything
    /// the client itself sends yields `None`.
    pub fn from_packet(packet: SessionPacket) -> Option<Self> {
        match packet {
            SessionPacket::MapState(state) => Some(SessionEvent::MapState(state)),
            SessionPacket::PlayerEntityId(id) => Some(SessionEvent::PlayerEntityId(id)),
            SessionPacket::EntityUpdated(update) => Some(SessionEvent::EntityUpdated(update)),
            SessionPacket::EntityCreated(stub) => Some(SessionEvent::EntityCreated(stub)),
            SessionPacket::EntityDestroyed(id) => Some(SessionEvent::EntityDestroyed(id)),
            SessionPacket::PlayerState(state) => Some(SessionEvent::PlayerState(state)),
            SessionPacket::Rejected { reason } => Some(SessionEvent::Closed {
                reason: Some(reason),
            }),
            SessionPacket::MapConnect { .. } | SessionPacket::EntityStateUpdate(_) => None,
        }
    }
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

#[allow(async_fn_in_trait)]
pub trait DataSource {
    async fn fetch_asset(&self, asset_type: AssetType, asset_id: &str) -> Result<Asset, ClientError>;

    async fn fetch_image(&self, uri: &str) -> Result<Vec<u8>, ClientError>;

    async fn fetch_player_state(&self, token: &str) -> Result<PlayerState, ClientError>;

    /// Opens the one persistent session for `map_id`, closing any previous
    /// session first, and sends the join request.
    async fn open_map_session(&self, map_id: &str, token: &str) -> Result<SessionEvents, ClientError>;

    fn close_map_session(&self);

    fn push_entity_state(&self, update: EntityStateUpdate) -> Result<(), ClientError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::images::{ImageDecoder, ImageHandle};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory data source. Assets resolve after an optional per-id delay;
    /// sessions replay a scripted list of events on open and stay open so
    /// tests can push more through `session_sender`.
    #[derive(Default)]
    pub struct MockDataSource {
        assets: HashMap<(AssetType, String), Asset>,
        delays: HashMap<String, Duration>,
        players: HashMap<String, PlayerState>,
        scripts: HashMap<String, Vec<SessionEvent>>,
        fetches: Mutex<HashMap<(AssetType, String), usize>>,
        opened: Mutex<Vec<(String, String)>>,
        senders: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
        closes: Mutex<usize>,
        pushed: Mutex<Vec<EntityStateUpdate>>,
    }

    impl MockDataSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_asset(mut self, asset: Asset) -> Self {
            let id = match &asset {
                Asset::Map(map) => map.id.clone(),
                Asset::Tile(tile) => tile.id.clone(),
                Asset::Entity(entity) => entity.id.clone(),
            };
            self.assets.insert((asset.asset_type(), id), asset);
            self
        }

        pub fn with_delay(mut self, asset_id: &str, delay: Duration) -> Self {
            self.delays.insert(asset_id.to_string(), delay);
            self
        }

        pub fn with_player(mut self, token: &str, state: PlayerState) -> Self {
            self.players.insert(token.to_string(), state);
            self
        }

        pub fn with_session_script(mut self, map_id: &str, events: Vec<SessionEvent>) -> Self {
            self.scripts.insert(map_id.to_string(), events);
            self
        }

        pub fn fetch_count(&self, asset_type: AssetType, asset_id: &str) -> usize {
            let fetches = self.fetches.lock().unwrap();
            fetches
                .get(&(asset_type, asset_id.to_string()))
                .copied()
                .unwrap_or(0)
        }

        pub fn opened_sessions(&self) -> Vec<(String, String)> {
            self.opened.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            *self.closes.lock().unwrap()
        }

        pub fn pushed(&self) -> Vec<EntityStateUpdate> {
            self.pushed.lock().unwrap().clone()
        }

        /// Sender feeding the most recently opened session.
        pub fn session_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
            self.senders.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl DataSource for MockDataSource {
        async fn fetch_asset(
            &self,
            asset_type: AssetType,
            asset_id: &str,
        ) -> Result<Asset, ClientError> {
            *self
                .fetches
                .lock()
                .unwrap()
                .entry((asset_type, asset_id.to_string()))
                .or_insert(0) += 1;

            if let Some(delay) = self.delays.get(asset_id) {
                tokio::time::sleep(*delay).await;
            }

            self.assets
                .get(&(asset_type, asset_id.to_string()))
                .cloned()
                .ok_or_else(|| ClientError::NotFound {
                    path: shared::protocol::asset_path(asset_type, asset_id),
                })
        }

        async fn fetch_image(&self, uri: &str) -> Result<Vec<u8>, ClientError> {
            Ok(uri.as_bytes().to_vec())
        }

        async fn fetch_player_state(&self, token: &str) -> Result<PlayerState, ClientError> {
            self.players
                .get(token)
                .cloned()
                .ok_or_else(|| ClientError::NotFound {
                    path: shared::protocol::login_path(token),
                })
        }

        async fn open_map_session(
            &self,
            map_id: &str,
            token: &str,
        ) -> Result<SessionEvents, ClientError> {
            self.close_map_session();
            self.opened
                .lock()
                .unwrap()
                .push((map_id.to_string(), token.to_string()));

            let (tx, rx) = mpsc::unbounded_channel();
            for event in self.scripts.get(map_id).cloned().unwrap_or_default() {
                let _ = tx.send(event);
            }
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }

        fn close_map_session(&self) {
            let mut senders = self.senders.lock().unwrap();
            if senders.pop().is_some() {
                *self.closes.lock().unwrap() += 1;
            }
        }

        fn push_entity_state(&self, update: EntityStateUpdate) -> Result<(), ClientError> {
            self.pushed.lock().unwrap().push(update);
            Ok(())
        }
    }

    /// Accepts any bytes as a 1x1 image.
    pub struct StubDecoder;

    impl ImageDecoder for StubDecoder {
        fn decode(&self, uri: &str, _bytes: &[u8]) -> Result<ImageHandle, ClientError> {
            Ok(ImageHandle::new(uri, 1, 1, vec![0; 4]))
        }
    }
}

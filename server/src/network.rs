//! Map server: persistent TCP sessions and the world loop.

use crate::client_manager::ClientManager;
use crate::game::GameState;
use crate::players::PlayerDirectory;
use crate::session::ConnectionId;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::protocol::{read_frame, write_frame};
use shared::{EntityStateUpdate, MapExit, SessionPacket};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        connection_id: ConnectionId,
        packet: SessionPacket,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub tick_rate: u32,
    pub wanderers: usize,
    pub max_clients: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            wanderers: 2,
            max_clients: 64,
        }
    }
}

/// Main server coordinating map sessions and the world simulation
pub struct MapServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    players: Arc<RwLock<PlayerDirectory>>,
    game_state: GameState,
    tick_duration: Duration,
    rng: StdRng,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl MapServer {
    pub async fn bind(
        addr: &str,
        mut game_state: GameState,
        players: Arc<RwLock<PlayerDirectory>>,
        settings: ServerSettings,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Map server listening on {}", local_addr);

        let mut rng = StdRng::from_entropy();
        game_state.populate_wanderers(settings.wanderers, &mut rng);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let tick_rate = settings.tick_rate.max(1);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(settings.max_clients))),
            players,
            game_state,
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
            rng,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task accepting new map connections
    fn spawn_acceptor(listener: TcpListener, clients: Arc<RwLock<ClientManager>>, server_tx: mpsc::UnboundedSender<ServerMessage>) {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Map connection from {}", addr);
                        Self::register_connection(stream, &clients, &server_tx).await;
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Adds the connection to the manager and starts its reader and writer
    async fn register_connection(
        mut stream: TcpStream,
        clients: &RwLock<ClientManager>,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let (packet_tx, mut packet_rx) = mpsc::unbounded_channel::<SessionPacket>();
        let added = clients.write().await.add_client(packet_tx);
        let Some(connection_id) = added else {
            let rejected = SessionPacket::Rejected {
                reason: "Server full".to_string(),
            };
            if let Err(e) = write_frame(&mut stream, &rejected).await {
                debug!("Failed to send rejection: {}", e);
            }
            return;
        };

        let (mut reader, mut writer) = stream.into_split();

        let server_tx = server_tx.clone();
        tokio::spawn(async move {
            loop {
                match read_frame::<_, SessionPacket>(&mut reader).await {
                    Ok(Some(packet)) => {
                        if server_tx
                            .send(ServerMessage::PacketReceived { connection_id, packet })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Connection {} sent a bad frame: {}", connection_id, e);
                        break;
                    }
                }
            }
            let _ = server_tx.send(ServerMessage::Disconnected { connection_id });
        });

        tokio::spawn(async move {
            while let Some(packet) = packet_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &packet).await {
                    debug!("Connection {} write failed: {}", connection_id, e);
                    break;
                }
            }
        });
    }

    /// Processes one packet from a connection
    async fn handle_packet(&mut self, connection_id: ConnectionId, packet: SessionPacket) {
        match packet {
            SessionPacket::MapConnect { map_id, token } => {
                self.handle_map_connect(connection_id, &map_id, &token).await;
            }
            SessionPacket::EntityStateUpdate(update) => {
                self.handle_entity_update(connection_id, update).await;
            }
            other => {
                warn!("Unexpected packet from connection {}: {:?}", connection_id, other);
            }
        }
    }

    async fn handle_map_connect(&mut self, connection_id: ConnectionId, map_id: &str, token: &str) {
        info!("Connection {} joining {} as {}", connection_id, map_id, token);

        // A repeated MapConnect on one connection moves the player.
        self.leave_map(connection_id).await;

        let clients = Arc::clone(&self.clients);
        let mut clients = clients.write().await;
        let Some(session) = clients.get(connection_id) else {
            return;
        };

        let Some(world) = self.game_state.world(map_id) else {
            warn!("Connection {} asked for unknown map {}", connection_id, map_id);
            session.send_event(SessionPacket::Rejected {
                reason: format!("Unknown map '{}'", map_id),
            });
            return;
        };
        let spawn = world.map.spawn;

        if let Some(previous) = clients.find_placed(token, connection_id) {
            info!("{} logged in again, removing connection {}'s avatar", token, previous);
            if let Some(old) = clients.get_mut(previous) {
                let placement = old.leave_map();
                old.send_event(SessionPacket::Rejected {
                    reason: "Logged in from another connection".to_string(),
                });
                if let Some((old_map, entity_id)) = placement {
                    self.game_state.remove_entity(&old_map, entity_id);
                    clients.broadcast(&old_map, &SessionPacket::EntityDestroyed(entity_id), None);
                }
            }
        }

        let state = {
            let mut players = self.players.write().await;
            let state = players.login(token);
            if state.location_info.location_id == map_id {
                state
            } else {
                players.relocate(token, map_id, spawn)
            }
        };

        let Some(stub) = self.game_state.spawn_player(
            map_id,
            &state.player_info.name,
            state.location_info.tile,
        ) else {
            return;
        };
        let entity_id = stub.entity_id;
        self.players.write().await.set_entity(token, Some(entity_id));

        let Some(snapshot) = self.game_state.snapshot(map_id) else {
            return;
        };
        if let Some(session) = clients.get_mut(connection_id) {
            session.login(token);
            session.map = Some(map_id.to_string());
            session.entity_id = Some(entity_id);
            session.send_event(SessionPacket::PlayerEntityId(entity_id));
            session.send_event(SessionPacket::MapState(snapshot));
        }

        let notified = clients.broadcast(map_id, &SessionPacket::EntityCreated(stub), Some(connection_id));
        debug!("Announced entity {} to {} sessions", entity_id, notified);
    }

    /// Applies a client's own entity update and relays it to the map
    async fn handle_entity_update(&mut self, connection_id: ConnectionId, update: EntityStateUpdate) {
        let (map_id, name) = {
            let clients = self.clients.read().await;
            let Some(session) = clients.get(connection_id) else {
                return;
            };
            match (&session.map, session.entity_id, session.name()) {
                (Some(map_id), Some(entity_id), Some(name)) if entity_id == update.entity_id => {
                    (map_id.clone(), name.to_string())
                }
                _ => {
                    warn!(
                        "Connection {} tried to update entity {} it does not own",
                        connection_id, update.entity_id
                    );
                    return;
                }
            }
        };

        if self
            .game_state
            .apply_update(&map_id, update.entity_id, &update.state)
            .is_none()
        {
            warn!("Update for missing entity {} on {}", update.entity_id, map_id);
            return;
        }

        let entity_id = update.entity_id;
        self.clients
            .read()
            .await
            .broadcast(&map_id, &SessionPacket::EntityUpdated(update), Some(connection_id));

        if let Some(tile) = self.game_state.player_tile(&map_id, entity_id) {
            self.players.write().await.remember_tile(&name, tile);
        }
        if let Some(exit) = self.game_state.exit_under(&map_id, entity_id) {
            self.move_through_exit(connection_id, &name, exit).await;
        }
    }

    /// Takes the player off its map and tells the client where it went.
    async fn move_through_exit(&mut self, connection_id: ConnectionId, name: &str, exit: MapExit) {
        info!("{} takes the exit to {}", name, exit.target_map);
        self.leave_map(connection_id).await;

        let state = self
            .players
            .write()
            .await
            .relocate(name, &exit.target_map, exit.target);
        if let Some(session) = self.clients.read().await.get(connection_id) {
            session.send_event(SessionPacket::PlayerState(state));
        }
    }

    /// Removes the connection's avatar from its map, if it has one
    async fn leave_map(&mut self, connection_id: ConnectionId) {
        let mut clients = self.clients.write().await;
        let Some(session) = clients.get_mut(connection_id) else {
            return;
        };
        let name = session.name().map(str::to_string);
        let Some((map_id, entity_id)) = session.leave_map() else {
            return;
        };

        self.game_state.remove_entity(&map_id, entity_id);
        clients.broadcast(&map_id, &SessionPacket::EntityDestroyed(entity_id), Some(connection_id));
        if let Some(name) = name {
            self.players.write().await.set_entity(&name, None);
        }
    }

    async fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        self.leave_map(connection_id).await;
        self.clients.write().await.remove_client(connection_id);
    }

    /// Moves wanderers and relays their new positions
    async fn tick(&mut self) {
        let moved = self.game_state.step_wanderers(&mut self.rng);
        if moved.is_empty() {
            return;
        }

        let clients = self.clients.read().await;
        for (map_id, update) in moved {
            clients.broadcast(&map_id, &SessionPacket::EntityUpdated(update), None);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(mut self) -> std::io::Result<()> {
        if let Some(listener) = self.listener.take() {
            Self::spawn_acceptor(listener, Arc::clone(&self.clients), self.server_tx.clone());
        }

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Map server started");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { connection_id, packet }) => {
                            self.handle_packet(connection_id, packet).await;
                        }
                        Some(ServerMessage::Disconnected { connection_id }) => {
                            self.handle_disconnect(connection_id).await;
                        }
                        None => {
                            info!("Map server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick().await;

                    if self.game_state.tick % 200 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} connections", self.game_state.tick, client_count);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

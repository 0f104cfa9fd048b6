//! Request/response service for assets, images and login.
//!
//! Each connection carries exactly one `ResourceRequest` and one
//! `ResourceResponse`.

use crate::assets::AssetStore;
use crate::players::PlayerDirectory;
use log::{debug, error, info, warn};
use shared::protocol::{parse_route, read_frame, write_frame};
use shared::{ResourceRequest, ResourceResponse, ResourceRoute};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

/// How long a connection may take to send its request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ResourceService {
    listener: TcpListener,
    assets: Arc<AssetStore>,
    players: Arc<RwLock<PlayerDirectory>>,
}

impl ResourceService {
    pub async fn bind(
        addr: &str,
        assets: Arc<AssetStore>,
        players: Arc<RwLock<PlayerDirectory>>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Resource service listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            assets,
            players,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let assets = Arc::clone(&self.assets);
            let players = Arc::clone(&self.players);

            tokio::spawn(async move {
                if let Err(e) = serve_one(stream, &assets, &players).await {
                    warn!("Resource request from {} failed: {}", addr, e);
                }
            });
        }
    }
}

async fn serve_one(
    mut stream: TcpStream,
    assets: &AssetStore,
    players: &RwLock<PlayerDirectory>,
) -> std::io::Result<()> {
    let request = match tokio::time::timeout(REQUEST_TIMEOUT, read_frame::<_, ResourceRequest>(&mut stream)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            debug!("Resource connection idle, closing");
            return Ok(());
        }
    };

    let response = respond(&request.path, assets, players).await;
    write_frame(&mut stream, &response).await
}

/// Answers one resource path.
pub async fn respond(path: &str, assets: &AssetStore, players: &RwLock<PlayerDirectory>) -> ResourceResponse {
    let not_found = || ResourceResponse::NotFound {
        path: path.to_string(),
    };

    let Some(route) = parse_route(path) else {
        debug!("No route for {}", path);
        return not_found();
    };

    let body = match route {
        ResourceRoute::Asset { asset_type, asset_id } => assets.read_asset(asset_type, &asset_id).await,
        ResourceRoute::Image { file } => assets.read_image(&file).await,
        ResourceRoute::Login { token } => {
            let state = players.write().await.login(&token);
            return match serde_json::to_vec(&state) {
                Ok(body) => ResourceResponse::Ok { body },
                Err(e) => {
                    error!("Failed to encode player state for {}: {}", token, e);
                    ResourceResponse::Error {
                        reason: e.to_string(),
                    }
                }
            };
        }
    };

    match body {
        Ok(Some(body)) => ResourceResponse::Ok { body },
        Ok(None) => not_found(),
        Err(e) => {
            error!("Failed to read {}: {}", path, e);
            ResourceResponse::Error {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::ScratchAssets;
    use shared::{PlayerState, TilePoint};

    fn fixtures() -> (ScratchAssets, AssetStore, RwLock<PlayerDirectory>) {
        let scratch = ScratchAssets::new().with_town_and_forest();
        let assets = AssetStore::load(scratch.path()).unwrap();
        let players = RwLock::new(PlayerDirectory::new("town", TilePoint { x: 0, y: 2 }));
        (scratch, assets, players)
    }

    #[tokio::test]
    async fn test_asset_route_serves_json() {
        let (_scratch, assets, players) = fixtures();
        match respond("/assets/map/town.json", &assets, &players).await {
            ResourceResponse::Ok { body } => {
                let map: shared::MapAsset = serde_json::from_slice(&body).unwrap();
                assert_eq!(map.id, "town");
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_and_unknown_paths() {
        let (_scratch, assets, players) = fixtures();
        assert_eq!(
            respond("/assets/map/castle.json", &assets, &players).await,
            ResourceResponse::NotFound {
                path: "/assets/map/castle.json".to_string()
            }
        );
        assert!(matches!(
            respond("/assets/map/../../secret.json", &assets, &players).await,
            ResourceResponse::NotFound { .. }
        ));
        assert!(matches!(
            respond("/favicon.ico", &assets, &players).await,
            ResourceResponse::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_login_creates_player() {
        let (_scratch, assets, players) = fixtures();
        let body = match respond("/login/alice", &assets, &players).await {
            ResourceResponse::Ok { body } => body,
            other => panic!("Unexpected response: {:?}", other),
        };
        let state: PlayerState = serde_json::from_slice(&body).unwrap();
        assert_eq!(state.location_info.location_id, "town");
        assert_eq!(state.location_info.tile, TilePoint { x: 0, y: 2 });
        assert_eq!(state.player_info.token, "alice");
        assert_eq!(players.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_image_route_serves_bytes() {
        let (_scratch, assets, players) = fixtures();
        assert_eq!(
            respond("/images/grass.png", &assets, &players).await,
            ResourceResponse::Ok {
                body: b"not really a png".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn test_service_answers_over_tcp() {
        let (_scratch, assets, players) = fixtures();
        let service = ResourceService::bind("127.0.0.1:0", Arc::new(assets), Arc::new(players))
            .await
            .unwrap();
        let addr = service.local_addr().unwrap();
        tokio::spawn(service.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(
            &mut stream,
            &ResourceRequest {
                path: "/assets/tile/wall.json".to_string(),
            },
        )
        .await
        .unwrap();
        let response: ResourceResponse = read_frame(&mut stream).await.unwrap().unwrap();
        match response {
            ResourceResponse::Ok { body } => {
                let tile: shared::TileAsset = serde_json::from_slice(&body).unwrap();
                assert!(tile.solid);
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }
}

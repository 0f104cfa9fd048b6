use crate::data_source::{DataSource, SessionEvent, SessionEvents};
use crate::error::ClientError;
use log::{debug, error, info, warn};
use shared::protocol::{asset_path, login_path, read_frame, write_frame};
use shared::{
    Asset, AssetType, EntityStateUpdate, PlayerState, ResourceRequest, ResourceResponse,
    SessionPacket,
};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// The open map session: an outbound queue drained by the writer task and a
/// reader task feeding decoded pushes to the world.
struct ActiveSession {
    map_id: String,
    outbound: mpsc::UnboundedSender<SessionPacket>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Talks to the resource service (one TCP connection per request) and to the
/// map server (one persistent connection at a time).
pub struct NetworkDataSource {
    server_addr: String,
    resource_addr: String,
    request_timeout: Duration,
    session: Mutex<Option<ActiveSession>>,
}

impl NetworkDataSource {
    pub fn new(server_addr: &str, resource_addr: &str, request_timeout: Duration) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            resource_addr: resource_addr.to_string(),
            request_timeout,
            session: Mutex::new(None),
        }
    }

    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout {
                what: what.to_string(),
                after: self.request_timeout,
            })?
    }

    /// Sends one request and waits for its single response.
    async fn request(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        debug!("Requesting {}", path);

        let exchange = async {
            let mut stream = TcpStream::connect(&self.resource_addr).await?;
            write_frame(
                &mut stream,
                &ResourceRequest {
                    path: path.to_string(),
                },
            )
            .await?;
            Ok::<_, ClientError>(read_frame::<_, ResourceResponse>(&mut stream).await?)
        };

        match self.with_timeout(path, exchange).await? {
            Some(ResourceResponse::Ok { body }) => Ok(body),
            Some(ResourceResponse::NotFound { path }) => Err(ClientError::NotFound { path }),
            Some(ResourceResponse::Error { reason }) => Err(ClientError::Server {
                path: path.to_string(),
                reason,
            }),
            None => Err(ClientError::Server {
                path: path.to_string(),
                reason: "connection closed before a response".to_string(),
            }),
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<ActiveSession>> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DataSource for NetworkDataSource {
    async fn fetch_asset(&self, asset_type: AssetType, asset_id: &str) -> Result<Asset, ClientError> {
        let body = self.request(&asset_path(asset_type, asset_id)).await?;
        Asset::from_json(asset_type, &body).map_err(|e| ClientError::Decode {
            what: format!("{} asset {}", asset_type, asset_id),
            reason: e.to_string(),
        })
    }

    async fn fetch_image(&self, uri: &str) -> Result<Vec<u8>, ClientError> {
        self.request(uri).await
    }

    async fn fetch_player_state(&self, token: &str) -> Result<PlayerState, ClientError> {
        info!("Logging in as {}", token);
        let body = self.request(&login_path(token)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn open_map_session(&self, map_id: &str, token: &str) -> Result<SessionEvents, ClientError> {
        self.close_map_session();

        info!("Connecting to map server for {}...", map_id);
        let stream = self
            .with_timeout("map server connect", async {
                Ok(TcpStream::connect(&self.server_addr).await?)
            })
            .await?;
        stream.set_nodelay(true)?;
        let (mut read_half, mut write_half) = stream.into_split();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SessionPacket>();

        let reader = tokio::spawn(async move {
            loop {
                match read_frame::<_, SessionPacket>(&mut read_half).await {
                    Ok(Some(packet)) => {
                        let Some(event) = SessionEvent::from_packet(packet) else {
                            warn!("Unexpected packet from map server");
                            continue;
                        };
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Map server closed the session");
                        let _ = event_tx.send(SessionEvent::Closed { reason: None });
                        break;
                    }
                    Err(e) => {
                        error!("Error reading from map server: {}", e);
                        let _ = event_tx.send(SessionEvent::Lost {
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(packet) = outbound_rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &packet).await {
                    error!("Error sending to map server: {}", e);
                    break;
                }
            }
        });

        outbound_tx
            .send(SessionPacket::MapConnect {
                map_id: map_id.to_string(),
                token: token.to_string(),
            })
            .map_err(|_| ClientError::SessionClosed)?;

        *self.lock_session() = Some(ActiveSession {
            map_id: map_id.to_string(),
            outbound: outbound_tx,
            reader,
            writer,
        });

        Ok(event_rx)
    }

    fn close_map_session(&self) {
        if let Some(session) = self.lock_session().take() {
            info!("Closing map session for {}", session.map_id);
        }
    }

    fn push_entity_state(&self, update: EntityStateUpdate) -> Result<(), ClientError> {
        let session = self.lock_session();
        let session = session.as_ref().ok_or(ClientError::NoSession)?;
        session
            .outbound
            .send(SessionPacket::EntityStateUpdate(update))
            .map_err(|_| ClientError::SessionClosed)
    }
}

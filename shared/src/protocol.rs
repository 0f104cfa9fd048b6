//! Wire protocol between client and server.
//!
//! Two kinds of TCP conversations exist:
//! - request/response: one `ResourceRequest` answered by one
//!   `ResourceResponse`, after which the connection is closed;
//! - the map session: a long-lived stream of `SessionPacket`s in both
//!   directions, opened by `SessionPacket::MapConnect`.
//!
//! Every message is a bincode payload preceded by its length as a
//! big-endian `u32`.

use crate::model::{AssetType, EntityId, EntityState, EntityStub, PlayerState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; larger length prefixes are rejected.
pub const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStateUpdate {
    pub entity_id: EntityId,
    pub state: EntityState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialMapState {
    pub entities: Vec<EntityStub>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionPacket {
    // Client -> server
    MapConnect { map_id: String, token: String },
    EntityStateUpdate(EntityStateUpdate),

    // Server -> client
    MapState(InitialMapState),
    PlayerEntityId(EntityId),
    EntityUpdated(EntityStateUpdate),
    EntityCreated(EntityStub),
    EntityDestroyed(EntityId),
    PlayerState(PlayerState),
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceResponse {
    Ok { body: Vec<u8> },
    NotFound { path: String },
    Error { reason: String },
}

/// Resource paths the request/response service understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoute {
    Asset { asset_type: AssetType, asset_id: String },
    Login { token: String },
    Image { file: String },
}

pub fn asset_path(asset_type: AssetType, asset_id: &str) -> String {
    format!("/assets/{}/{}.json", asset_type, asset_id)
}

pub fn login_path(token: &str) -> String {
    format!("/login/{}", token)
}

/// Splits a request path into a route. Path segments may not climb out of
/// their directory.
pub fn parse_route(path: &str) -> Option<ResourceRoute> {
    let mut parts = path.trim_start_matches('/').splitn(3, '/');
    let route = match (parts.next()?, parts.next(), parts.next()) {
        ("assets", Some(kind), Some(file)) => {
            let asset_type = kind.parse().ok()?;
            let asset_id = file.strip_suffix(".json")?;
            ResourceRoute::Asset {
                asset_type,
                asset_id: asset_id.to_string(),
            }
        }
        ("login", Some(token), None) => ResourceRoute::Login {
            token: token.to_string(),
        },
        ("images", Some(file), None) => ResourceRoute::Image {
            file: file.to_string(),
        },
        _ => return None,
    };

    let segment_ok = |s: &str| !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\']);
    let valid = match &route {
        ResourceRoute::Asset { asset_id, .. } => segment_ok(asset_id),
        ResourceRoute::Login { token } => segment_ok(token),
        ResourceRoute::Image { file } => segment_ok(file),
    };
    valid.then_some(route)
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message).map_err(invalid_data)?;
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| invalid_data(format!("frame of {} bytes is too large", data.len())))?;

    writer.write_u32(len).await?;
    writer.write_all(&data).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame. Returns `Ok(None)` when the peer closed
/// the connection cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    if len > MAX_FRAME_LEN {
        return Err(invalid_data(format!("frame length {} exceeds limit", len)));
    }

    let mut buffer = vec![0u8; len as usize];
    reader.read_exact(&mut buffer).await?;
    bincode::deserialize(&buffer).map(Some).map_err(invalid_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StateValue;

    #[test]
    fn test_asset_path_layout() {
        assert_eq!(asset_path(AssetType::Map, "town"), "/assets/map/town.json");
        assert_eq!(login_path("alice"), "/login/alice");
    }

    #[test]
    fn test_parse_routes() {
        assert_eq!(
            parse_route("/assets/tile/grass.json"),
            Some(ResourceRoute::Asset {
                asset_type: AssetType::Tile,
                asset_id: "grass".to_string()
            })
        );
        assert_eq!(
            parse_route("/login/alice"),
            Some(ResourceRoute::Login {
                token: "alice".to_string()
            })
        );
        assert_eq!(
            parse_route("/images/grass.png"),
            Some(ResourceRoute::Image {
                file: "grass.png".to_string()
            })
        );
    }

    #[test]
    fn test_parse_route_rejects_bad_paths() {
        assert_eq!(parse_route("/assets/sound/boom.json"), None);
        assert_eq!(parse_route("/assets/map/town"), None);
        assert_eq!(parse_route("/assets/map/../secret.json"), None);
        assert_eq!(parse_route("/images/.."), None);
        assert_eq!(parse_route("/login/"), None);
        assert_eq!(parse_route("/other"), None);
        assert_eq!(parse_route(""), None);
    }

    #[tokio::test]
    async fn test_frames_preserve_order_on_one_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let mut state = EntityState::new();
        state.insert("X".to_string(), StateValue::Float(64.0));

        let sent = vec![
            SessionPacket::PlayerEntityId(7),
            SessionPacket::MapState(InitialMapState { entities: vec![] }),
            SessionPacket::EntityUpdated(EntityStateUpdate { entity_id: 7, state }),
            SessionPacket::EntityDestroyed(7),
        ];

        for packet in &sent {
            write_frame(&mut client, packet).await.unwrap();
        }
        drop(client);

        let mut received = Vec::new();
        while let Some(packet) = read_frame::<_, SessionPacket>(&mut server).await.unwrap() {
            received.push(packet);
        }

        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(MAX_FRAME_LEN + 1).await.unwrap();

        let result = read_frame::<_, ResourceRequest>(&mut server).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_clean_eof_reads_as_none() {
        let result: io::Result<Option<ResourceResponse>> =
            tokio_test::block_on(async { read_frame(&mut tokio::io::empty()).await });
        assert!(matches!(result, Ok(None)));
    }
}

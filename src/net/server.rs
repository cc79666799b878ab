//! TCP game server
//!
//! Clients exchange newline-delimited JSON messages. Each connection runs
//! two duties: an inbound reader applying client messages, and an outbound
//! writer draining the direct lane, the entity snapshot slot and the shared
//! broadcast queue. When either duty ends the connection is torn down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::broadcast::{ConnectionId, Delivery};
use crate::core::{Error, Result};
use crate::session::{EntitySync, Line, SessionHandle};
use super::handler::ServerState;

/// Server handle - keep this alive to keep the server running
pub struct GameServer {
    local_addr: SocketAddr,
    accept: tokio::task::JoinHandle<()>,
    _sync: EntitySync,
}

impl GameServer {
    /// Bind the configured address and start accepting connections.
    /// Returns once the listener is bound; the server runs in background.
    pub async fn bind(state: Arc<ServerState>) -> Result<Self> {
        let listener = TcpListener::bind(&state.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Game server listening on {}", local_addr);

        let sync = EntitySync::start(state.sessions.clone(), state.config.entity_sync_period());

        let accept = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, state).await;
                        });
                    }
                    Err(e) => {
                        log::error!("Game server accept error: {}", e);
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            accept,
            _sync: sync,
        })
    }

    /// Address actually bound, useful when the configured port is 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for GameServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    let session = match state.connect() {
        Ok(session) => session,
        Err(e) => {
            log::error!("Failed to open session for {}: {}", peer, e);
            return;
        }
    };
    let id = session.id;
    log::info!("Client {} connected as {} ({})", peer, session.name, id);
    let _teardown = Teardown { state: &state, id };

    let (reader, writer) = stream.into_split();
    let result = tokio::select! {
        res = inbound(reader, id, &state) => res,
        res = outbound(writer, session, &state) => res,
    };

    match result {
        Ok(()) => log::info!("Client {} ({}) disconnected", peer, id),
        Err(e) => log::warn!("Client {} ({}) dropped: {}", peer, id, e),
    }
}

/// Closes the session when the connection task ends, including by panic,
/// so other players always see the entity deleted
struct Teardown<'a> {
    state: &'a ServerState,
    id: ConnectionId,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("Connection task for {} panicked, closing session", self.id);
        }
        self.state.disconnect(self.id);
    }
}

/// Read and apply client messages until EOF or the first bad message.
///
/// `max_line_bytes` bounds the message itself; a trailing `\n` or `\r\n`
/// is not counted.
async fn inbound<R: AsyncRead + Unpin>(reader: R, id: ConnectionId, state: &ServerState) -> Result<()> {
    let limit = state.config.max_line_bytes;
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = (&mut reader).take(limit as u64 + 2).read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }
        let content = line.trim_end_matches(['\n', '\r']);
        if content.len() > limit || (n > limit && !line.ends_with('\n')) {
            return Err(Error::Malformed(format!("message exceeds {} bytes", limit)));
        }

        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }
        state.handle_line(id, trimmed)?;
    }
}

/// Write everything addressed to this session until the peer goes away
async fn outbound(mut writer: OwnedWriteHalf, mut session: SessionHandle, state: &ServerState) -> Result<()> {
    let idle = state.config.idle_poll();
    let mut snapshots_open = true;

    loop {
        let line: Line = tokio::select! {
            biased;

            direct = session.direct.recv() => match direct {
                Some(line) => line,
                None => return Ok(()),
            },

            changed = session.snapshot.changed(), if snapshots_open => {
                if changed.is_err() {
                    snapshots_open = false;
                    continue;
                }
                let latest = session.snapshot.borrow_and_update().clone();
                match latest {
                    Some(line) => line,
                    None => continue,
                }
            }

            delivery = state.tracker.next_for(session.id, idle) => match delivery {
                Delivery::Message(line) => line,
                Delivery::Idle => continue,
                Delivery::Unsubscribed => return Ok(()),
            },
        };

        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, BufReader};

    use crate::core::ServerConfig;
    use crate::voxel::{Chunk, ChunkCoord, FlatGenerator, MapGenerator};

    /// Flat world whose generator blows up east of x = 98
    struct FaultyGenerator;

    impl MapGenerator for FaultyGenerator {
        fn generate(&self, coord: ChunkCoord) -> Chunk {
            if coord.x > 98 {
                panic!("generator fault at {:?}", coord);
            }
            FlatGenerator::default().generate(coord)
        }
    }

    fn small_lines(limit: usize) -> Arc<ServerState> {
        let config = ServerConfig {
            max_line_bytes: limit,
            ..ServerConfig::default()
        };
        ServerState::new(config)
    }

    /// A `send_chat` line whose JSON text is exactly `len` bytes long
    fn chat_of_len(len: usize) -> String {
        let base = json!({"type":"send_chat","channel":"global","message":""}).to_string();
        json!({"type":"send_chat","channel":"global","message":"x".repeat(len - base.len())}).to_string()
    }

    #[tokio::test]
    async fn test_line_at_limit_accepted() {
        let state = small_lines(80);
        let session = state.connect().unwrap();

        let input = format!("{}\n{}\r\n", chat_of_len(80), chat_of_len(80));
        inbound(input.as_bytes(), session.id, &state).await.unwrap();

        assert!(state.tracker.try_next(session.id).is_some());
        assert!(state.tracker.try_next(session.id).is_some());
    }

    #[tokio::test]
    async fn test_line_over_limit_rejected() {
        let state = small_lines(80);
        let session = state.connect().unwrap();

        let input = format!("{}\n", chat_of_len(81));
        let res = inbound(input.as_bytes(), session.id, &state).await;

        assert!(matches!(res, Err(Error::Malformed(_))));
        assert!(state.tracker.try_next(session.id).is_none());
    }

    #[tokio::test]
    async fn test_panicking_connection_still_leaves() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            idle_poll_ms: 20,
            view_distance: None,
            ..ServerConfig::default()
        };
        let state = Arc::new(ServerState::with_generator(config, FaultyGenerator));
        let server = GameServer::bind(state.clone()).await.unwrap();

        let mut a = TcpStream::connect(server.local_addr()).await.unwrap();
        let b = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut b_lines = BufReader::new(b).lines();

        // B hears about A either in its initial roster or as a later create
        let a_name = loop {
            let line = tokio::time::timeout(Duration::from_secs(5), b_lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let msg: Value = serde_json::from_str(&line).unwrap();
            if msg["actions"][0]["type"] == "create" {
                break msg["actions"][0]["data"]["id"].as_str().unwrap().to_string();
            }
        };

        a.write_all(b"{\"type\":\"req_mapblock\",\"pos\":{\"x\":99,\"y\":0,\"z\":0}}\n")
            .await
            .unwrap();

        let deleted = loop {
            let line = tokio::time::timeout(Duration::from_secs(5), b_lines.next_line())
                .await
                .expect("no delete announced after the panic")
                .unwrap()
                .unwrap();
            let msg: Value = serde_json::from_str(&line).unwrap();
            if msg["actions"][0]["type"] == "delete" {
                break msg["actions"][0]["data"]["id"].as_str().unwrap().to_string();
            }
        };

        assert_eq!(deleted, a_name);
        assert_eq!(state.tracker.subscriber_count(), 1);
        assert_eq!(state.sessions.names().len(), 1);
    }
}

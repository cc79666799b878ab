//! Shared server state and client message dispatch

use std::sync::Arc;

use glam::IVec3;

use blockcast_protocol::{decode_line, encode_line, ClientMessage, ServerMessage};

use crate::broadcast::{BroadcastTracker, ConnectionId};
use crate::core::{Error, Result, ServerConfig};
use crate::session::{Line, SessionHandle, SessionRegistry};
use crate::voxel::{coords, node, Chunk, ChunkCoord, ChunkStore, FlatGenerator, MapGenerator, UpdateSink};
use super::commands;

/// Publishes every chunk mutation to the broadcast queue as a
/// `req_mapblock` line
pub struct BroadcastSink {
    tracker: Arc<BroadcastTracker<Line>>,
    echo_to_origin: bool,
}

impl BroadcastSink {
    pub fn new(tracker: Arc<BroadcastTracker<Line>>, echo_to_origin: bool) -> Self {
        Self {
            tracker,
            echo_to_origin,
        }
    }
}

impl UpdateSink for BroadcastSink {
    fn chunk_updated(&self, chunk: &Chunk, origin: Option<ConnectionId>) {
        let line = match encode_line(&ServerMessage::mapblock(chunk.to_record())) {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to encode chunk {:?}: {}", chunk.coord, e);
                return;
            }
        };

        let exclude: Vec<ConnectionId> = origin.filter(|_| !self.echo_to_origin).into_iter().collect();
        self.tracker.publish(line.into(), &exclude);
    }
}

/// Everything a connection needs: the world, the broadcast queue and the
/// session roster
pub struct ServerState {
    pub config: ServerConfig,
    pub store: ChunkStore,
    pub tracker: Arc<BroadcastTracker<Line>>,
    pub sessions: Arc<SessionRegistry>,
}

impl ServerState {
    /// State with the default flat world
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self::with_generator(config, FlatGenerator::default()))
    }

    pub fn with_generator(config: ServerConfig, generator: impl MapGenerator) -> Self {
        let tracker = Arc::new(BroadcastTracker::with_warn_threshold(config.pending_warn_threshold));
        let sink = Arc::new(BroadcastSink::new(tracker.clone(), config.echo_edits_to_origin));
        Self {
            store: ChunkStore::new(generator, sink),
            tracker,
            sessions: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    /// Open a session: subscribe it to broadcasts and announce it
    pub fn connect(&self) -> Result<SessionHandle> {
        let id = self.sessions.next_connection_id();
        self.tracker.subscribe(id);
        match self.sessions.register(id) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.tracker.unsubscribe(id);
                Err(e)
            }
        }
    }

    /// Tear a session down so nothing pending waits on it any more
    pub fn disconnect(&self, id: ConnectionId) {
        let evicted = self.tracker.unsubscribe(id);
        if evicted > 0 {
            log::debug!("{} left with {} undelivered messages", id, evicted);
        }
        self.sessions.remove(id);
    }

    /// Parse and apply one inbound line
    pub fn handle_line(&self, id: ConnectionId, line: &str) -> Result<()> {
        let msg: ClientMessage =
            decode_line(line).map_err(|e| Error::Malformed(format!("invalid message from {}: {}", id, e)))?;
        self.handle_message(id, msg)
    }

    pub fn handle_message(&self, id: ConnectionId, msg: ClientMessage) -> Result<()> {
        match msg {
            ClientMessage::ReqMapblock { pos } => {
                log::debug!("> {} req_mapblock {:?}", id, pos);
                let coord = ChunkCoord::from(pos);
                if !self.within_view(id, coord) {
                    log::info!("{} requested out of bounds mapblock {:?}", id, coord);
                    return Ok(());
                }
                let record = self.store.with_chunk(coord, Chunk::to_record)?;
                let line: Line = encode_line(&ServerMessage::mapblock(record))?.into();
                self.sessions.send_direct(id, line);
            }
            ClientMessage::SetMapblock { data } => {
                log::debug!("> {} set_mapblock {:?}", id, data.pos);
                let chunk = Chunk::from_record(data)?;
                self.store.put(chunk, Some(id))?;
            }
            ClientMessage::SetNode { pos, data } => {
                log::debug!("> {} set_node {:?} {} rot {}", id, pos, data.itemstring, data.rot);
                let world = IVec3::new(pos.x, pos.y, pos.z);
                if !self.within_reach(id, world) {
                    log::info!("{} attempted to set node '{}' far away at {}", id, data.itemstring, world);
                    return Ok(());
                }
                let rot = node::wrap_rotation(data.rot);
                self.store.set_node(world, &data.itemstring, rot, Some(id))?;
            }
            ClientMessage::SetPlayerPos { pos, vel, rot } => {
                self.sessions.update_transform(id, pos, vel, rot);
            }
            ClientMessage::SendChat { channel, message } => {
                let from = self.sessions.name_of(id).unwrap_or_else(|| id.to_string());
                log::debug!("> [#{}] <{}> {}", channel, from, message);
                let line: Line = encode_line(&ServerMessage::chat(from, channel, message))?.into();
                self.tracker.publish(line, &[]);
            }
            ClientMessage::ChatCommand { command } => {
                log::debug!("> {} command {}", id, command);
                commands::run(self, id, &command)?;
            }
        }
        Ok(())
    }

    /// Whether `coord` lies within the configured view distance of the
    /// player's own chunk
    fn within_view(&self, id: ConnectionId, coord: ChunkCoord) -> bool {
        let Some(limit) = self.config.view_distance else {
            return true;
        };
        let Some(entity) = self.sessions.entity(id) else {
            return false;
        };
        let own = coords::to_chunk_coord(entity.pos.floor().as_ivec3());
        axis_distance(IVec3::new(coord.x, coord.y, coord.z), IVec3::new(own.x, own.y, own.z)) <= i64::from(limit)
    }

    /// Whether `world` lies within the configured reach of the player
    fn within_reach(&self, id: ConnectionId, world: IVec3) -> bool {
        let Some(limit) = self.config.reach_distance else {
            return true;
        };
        let Some(entity) = self.sessions.entity(id) else {
            return false;
        };
        axis_distance(world, entity.pos.round().as_ivec3()) <= i64::from(limit)
    }
}

/// Largest per-axis distance, widened so extreme coordinates cannot overflow
fn axis_distance(a: IVec3, b: IVec3) -> i64 {
    [(a.x, b.x), (a.y, b.y), (a.z, b.z)]
        .into_iter()
        .map(|(a, b)| (i64::from(a) - i64::from(b)).abs())
        .max()
        .unwrap_or(0)
}

//! Shared chunk store with on-demand generation
//!
//! Locking is two-level: a short-lived map lock hands out one slot per
//! chunk coordinate, and all loading, generation and mutation happen under
//! that slot's own lock. Edits to different chunks never wait on each
//! other, and two requests for the same missing chunk generate it once.

use std::collections::HashMap;
use std::sync::Arc;

use glam::IVec3;
use parking_lot::Mutex;

use crate::broadcast::ConnectionId;
use crate::core::{Error, Result};
use super::chunk::{Chunk, ChunkCoord, LightUpdate};
use super::coords;
use super::generator::MapGenerator;

/// Where chunks live when they are not cached.
///
/// `load` is consulted before the generator on a cache miss; `save` is
/// called after every mutation.
pub trait ChunkBackend: Send + Sync + 'static {
    fn load(&self, coord: ChunkCoord) -> Result<Option<Chunk>>;
    fn save(&self, chunk: &Chunk) -> Result<()>;
}

/// Memory-only backend: the cache is the only copy
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryBackend;

impl ChunkBackend for MemoryBackend {
    fn load(&self, _coord: ChunkCoord) -> Result<Option<Chunk>> {
        Ok(None)
    }

    fn save(&self, _chunk: &Chunk) -> Result<()> {
        Ok(())
    }
}

/// Receives every chunk mutation, in mutation order per chunk.
///
/// Called with the chunk still locked, so implementations must not call
/// back into the store.
pub trait UpdateSink: Send + Sync + 'static {
    fn chunk_updated(&self, chunk: &Chunk, origin: Option<ConnectionId>);
}

/// Sink that drops every update
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn chunk_updated(&self, _chunk: &Chunk, _origin: Option<ConnectionId>) {}
}

type Slot = Arc<Mutex<Option<Chunk>>>;

/// Mark a chunk as changed: next revision, full light recompute
fn bump_revision(chunk: &mut Chunk) -> Result<()> {
    let Some(next) = chunk.update_num.checked_add(1) else {
        return Err(Error::Malformed(format!("chunk {:?} has exhausted its updateNum", chunk.coord)));
    };
    chunk.update_num = next;
    chunk.light_needs_update = LightUpdate::FullRecompute;
    Ok(())
}

/// Owns all chunk data for the world
pub struct ChunkStore {
    slots: Mutex<HashMap<ChunkCoord, Slot>>,
    generator: Box<dyn MapGenerator>,
    backend: Box<dyn ChunkBackend>,
    sink: Arc<dyn UpdateSink>,
}

impl ChunkStore {
    /// Memory-only store
    pub fn new(generator: impl MapGenerator, sink: Arc<dyn UpdateSink>) -> Self {
        Self::with_backend(generator, MemoryBackend, sink)
    }

    pub fn with_backend(
        generator: impl MapGenerator,
        backend: impl ChunkBackend,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            generator: Box::new(generator),
            backend: Box::new(backend),
            sink,
        }
    }

    fn slot(&self, coord: ChunkCoord) -> Slot {
        self.slots.lock().entry(coord).or_default().clone()
    }

    /// Fill an empty slot from the backend or the generator
    fn resolve<'a>(&self, coord: ChunkCoord, slot: &'a mut Option<Chunk>) -> Result<&'a mut Chunk> {
        let chunk = match slot.take() {
            Some(chunk) => chunk,
            None => match self.backend.load(coord)? {
                Some(chunk) => {
                    log::debug!("Loaded chunk {:?} from backend", coord);
                    chunk
                }
                None => {
                    log::debug!("Generating chunk {:?}", coord);
                    self.generator.generate(coord)
                }
            },
        };
        Ok(slot.insert(chunk))
    }

    /// Run `f` against a chunk, loading or generating it first
    pub fn with_chunk<R>(&self, coord: ChunkCoord, f: impl FnOnce(&Chunk) -> R) -> Result<R> {
        let slot = self.slot(coord);
        let mut guard = slot.lock();
        let chunk = self.resolve(coord, &mut guard)?;
        Ok(f(chunk))
    }

    /// Snapshot of a chunk, loading or generating it first
    pub fn get(&self, coord: ChunkCoord) -> Result<Chunk> {
        self.with_chunk(coord, Chunk::clone)
    }

    /// Material identifier and rotation at a world position
    pub fn get_node(&self, world: IVec3) -> Result<(String, u32)> {
        let (coord, local) = coords::split(world);
        self.with_chunk(coord, |chunk| {
            let (ident, rot) = chunk.node_identifier(local);
            (ident.to_string(), rot)
        })
    }

    /// Replace a chunk wholesale, as when a client uploads one.
    ///
    /// Returns the chunk's new `update_num`. If the backend refuses the
    /// save, the previous chunk stays in place and nothing is published.
    pub fn put(&self, mut chunk: Chunk, origin: Option<ConnectionId>) -> Result<u64> {
        let coord = chunk.coord;
        let slot = self.slot(coord);
        let mut guard = slot.lock();

        bump_revision(&mut chunk)?;
        if let Err(e) = self.backend.save(&chunk) {
            log::error!("Failed to save chunk {:?}: {}", coord, e);
            return Err(e);
        }
        let chunk = guard.insert(chunk);

        self.publish(chunk, origin)
    }

    /// Write one node at a world position.
    ///
    /// Returns the containing chunk's new `update_num`.
    pub fn set_node(
        &self,
        world: IVec3,
        identifier: &str,
        rotation: u32,
        origin: Option<ConnectionId>,
    ) -> Result<u64> {
        let (coord, local) = coords::split(world);
        self.mutate(coord, origin, |chunk| chunk.place(local, identifier, rotation))
    }

    /// Apply an arbitrary edit to one chunk under its lock.
    ///
    /// The edit is rolled back if the revision counter is exhausted or the
    /// backend refuses the save.
    pub fn mutate(
        &self,
        coord: ChunkCoord,
        origin: Option<ConnectionId>,
        edit: impl FnOnce(&mut Chunk),
    ) -> Result<u64> {
        let slot = self.slot(coord);
        let mut guard = slot.lock();
        let chunk = self.resolve(coord, &mut guard)?;

        let mut edited = chunk.clone();
        edit(&mut edited);
        bump_revision(&mut edited)?;
        if let Err(e) = self.backend.save(&edited) {
            log::error!("Failed to save chunk {:?}: {}", coord, e);
            return Err(e);
        }
        *chunk = edited;

        self.publish(chunk, origin)
    }

    fn publish(&self, chunk: &Chunk, origin: Option<ConnectionId>) -> Result<u64> {
        self.sink.chunk_updated(chunk, origin);
        Ok(chunk.update_num)
    }

    /// Whether a chunk is currently held in memory
    pub fn is_cached(&self, coord: ChunkCoord) -> bool {
        let slot = self.slots.lock().get(&coord).cloned();
        slot.is_some_and(|slot| slot.lock().is_some())
    }

    /// Number of chunks held in memory
    pub fn cached_count(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }
}

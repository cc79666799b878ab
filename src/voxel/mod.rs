//! Voxel data structures: node codec, chunks, coordinate mapping and the chunk store

pub mod node;
pub mod chunk;
pub mod coords;
pub mod generator;
pub mod store;

pub use chunk::{Chunk, ChunkCoord, LightUpdate, CHUNK_EDGE, CHUNK_VOLUME};
pub use generator::{FlatGenerator, MapGenerator};
pub use node::NodeTable;
pub use store::{ChunkBackend, ChunkStore, MemoryBackend, NullSink, UpdateSink};

//! World-space to chunk-space coordinate mapping
//!
//! Uses floor semantics so negative world coordinates land in the chunk
//! below zero: world x = -1 is chunk -1, local 15.

use glam::{IVec3, UVec3};

use super::chunk::{CHUNK_EDGE, ChunkCoord};

/// Chunk containing a world position
pub fn to_chunk_coord(world: IVec3) -> ChunkCoord {
    let edge = CHUNK_EDGE as i32;
    ChunkCoord::new(
        world.x.div_euclid(edge),
        world.y.div_euclid(edge),
        world.z.div_euclid(edge),
    )
}

/// Offset of a world position inside its chunk, each component in `[0, 16)`
pub fn to_local_coord(world: IVec3) -> UVec3 {
    let edge = CHUNK_EDGE as i32;
    UVec3::new(
        world.x.rem_euclid(edge) as u32,
        world.y.rem_euclid(edge) as u32,
        world.z.rem_euclid(edge) as u32,
    )
}

/// Both halves of the mapping at once
pub fn split(world: IVec3) -> (ChunkCoord, UVec3) {
    (to_chunk_coord(world), to_local_coord(world))
}

/// Inverse of [`split`]
pub fn to_world(chunk: ChunkCoord, local: UVec3) -> IVec3 {
    chunk.world_origin() + local.as_ivec3()
}

//! Procedural chunk generation

use super::chunk::{Chunk, ChunkCoord, LightUpdate, CHUNK_EDGE};
use super::node::{self, NodeTable, AIR};

/// Pure function from chunk coordinate to initial chunk content.
///
/// Must be deterministic: the store calls it at most once per coordinate,
/// but a durable backend may drop and regenerate untouched chunks.
pub trait MapGenerator: Send + Sync + 'static {
    fn generate(&self, coord: ChunkCoord) -> Chunk;
}

/// Flat world: a grass/dirt/stone floor in one chunk row, air everywhere else.
#[derive(Clone, Debug)]
pub struct FlatGenerator {
    /// Vertical chunk index that holds the floor
    pub floor_chunk_y: i32,
    /// Chunk rows at or above this index start out sunlit
    pub sunlit_from_y: i32,
}

impl Default for FlatGenerator {
    fn default() -> Self {
        Self {
            floor_chunk_y: -1,
            sunlit_from_y: 1,
        }
    }
}

pub const DIRT: &str = "default:dirt";
pub const GRASS: &str = "default:grass";
pub const STONE: &str = "default:stone";

/// Seed table shared by every generated chunk: air, dirt, grass, stone
fn seed_table() -> NodeTable {
    let mut table = NodeTable::new();
    for ident in [AIR, DIRT, GRASS, STONE] {
        table.intern(ident);
    }
    table
}

impl MapGenerator for FlatGenerator {
    fn generate(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::with_table(coord, seed_table());
        chunk.update_num = 1;
        chunk.light_update_num = 0;
        chunk.light_needs_update = LightUpdate::Recompute;
        chunk.sunlit = coord.y >= self.sunlit_from_y;

        if coord.y == self.floor_chunk_y {
            let grass = node::encode(chunk.intern_id(GRASS), 0);
            let dirt = node::encode(chunk.intern_id(DIRT), 0);
            let stone = node::encode(chunk.intern_id(STONE), 0);
            for y in 0..CHUNK_EDGE {
                let value = match y {
                    15 => grass,
                    13 | 14 => dirt,
                    _ => stone,
                };
                chunk.fill_layer(y, value);
            }
        }

        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec3;

    #[test]
    fn test_floor_chunk_layers() {
        let chunk = FlatGenerator::default().generate(ChunkCoord::new(0, -1, 0));
        for x in 0..16 {
            for z in 0..16 {
                assert_eq!(chunk.node_identifier(UVec3::new(x, 15, z)).0, GRASS);
                assert_eq!(chunk.node_identifier(UVec3::new(x, 14, z)).0, DIRT);
                assert_eq!(chunk.node_identifier(UVec3::new(x, 13, z)).0, DIRT);
                for y in 0..=12 {
                    assert_eq!(chunk.node_identifier(UVec3::new(x, y, z)).0, STONE);
                }
            }
        }
        assert!(!chunk.sunlit);
    }

    #[test]
    fn test_empty_chunk_is_air() {
        let chunk = FlatGenerator::default().generate(ChunkCoord::new(0, 0, 0));
        for x in 0..16 {
            for y in 0..16 {
                for z in 0..16 {
                    assert_eq!(chunk.node_identifier(UVec3::new(x, y, z)), (AIR, 0));
                }
            }
        }
    }

    #[test]
    fn test_fresh_chunk_bookkeeping() {
        let chunk = FlatGenerator::default().generate(ChunkCoord::new(3, 1, -4));
        assert_eq!(chunk.update_num, 1);
        assert_eq!(chunk.light_update_num, 0);
        assert_eq!(chunk.light_needs_update, LightUpdate::Recompute);
        assert!(chunk.sunlit);
        assert_eq!(chunk.table().identifiers(), &[AIR, DIRT, GRASS, STONE]);
    }

    #[test]
    fn test_sunlit_threshold() {
        let generator = FlatGenerator::default();
        assert!(!generator.generate(ChunkCoord::new(0, 0, 0)).sunlit);
        assert!(generator.generate(ChunkCoord::new(0, 1, 0)).sunlit);
        assert!(generator.generate(ChunkCoord::new(0, 7, 0)).sunlit);
    }
}

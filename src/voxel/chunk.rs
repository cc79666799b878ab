//! Chunk system for managing cubic regions of voxel space

use glam::{IVec3, UVec3};
use serde_json::{Map, Value};

use blockcast_protocol::{MapblockProps, MapblockRecord, Xyz};

use crate::core::{Error, Result};
use super::node::{self, NodeTable, AIR};

/// Number of nodes per chunk side
pub const CHUNK_EDGE: u32 = 16;

/// Number of nodes in a chunk
pub const CHUNK_VOLUME: usize = (CHUNK_EDGE * CHUNK_EDGE * CHUNK_EDGE) as usize;

/// Integer coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// World-space position of this chunk's minimum corner
    pub fn world_origin(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * CHUNK_EDGE as i32
    }
}

impl From<Xyz<i32>> for ChunkCoord {
    fn from(p: Xyz<i32>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl From<ChunkCoord> for Xyz<i32> {
    fn from(c: ChunkCoord) -> Self {
        Xyz::new(c.x, c.y, c.z)
    }
}

/// Lighting state a chunk asks of the (external) lighting pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightUpdate {
    #[default]
    None,
    Recompute,
    FullRecompute,
}

impl LightUpdate {
    pub fn as_u8(self) -> u8 {
        match self {
            LightUpdate::None => 0,
            LightUpdate::Recompute => 1,
            LightUpdate::FullRecompute => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LightUpdate::None),
            1 => Some(LightUpdate::Recompute),
            2 => Some(LightUpdate::FullRecompute),
            _ => None,
        }
    }
}

/// A 16x16x16 block of packed node values plus its bookkeeping
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Coordinate of this chunk in the world grid
    pub coord: ChunkCoord,
    /// Bumped on every mutation
    pub update_num: u64,
    pub light_update_num: u64,
    pub light_needs_update: LightUpdate,
    /// Open sky above this chunk
    pub sunlit: bool,
    /// Generation metadata other than `sunlit`, carried through untouched
    pub extra_props: Map<String, Value>,
    table: NodeTable,
    nodes: Vec<u32>,
}

impl Chunk {
    /// Create an all-air chunk; air is interned as ID 0
    pub fn new(coord: ChunkCoord) -> Self {
        let mut table = NodeTable::new();
        table.intern(AIR);
        Self {
            coord,
            update_num: 0,
            light_update_num: 0,
            light_needs_update: LightUpdate::None,
            sunlit: false,
            extra_props: Map::new(),
            table,
            nodes: vec![0; CHUNK_VOLUME],
        }
    }

    /// Create a chunk with a pre-seeded identifier table, filled with ID 0
    pub fn with_table(coord: ChunkCoord, table: NodeTable) -> Self {
        Self {
            table,
            ..Self::new(coord)
        }
    }

    #[inline]
    fn index(local: UVec3) -> usize {
        debug_assert!(local.x < CHUNK_EDGE && local.y < CHUNK_EDGE && local.z < CHUNK_EDGE);
        ((local.x * CHUNK_EDGE + local.y) * CHUNK_EDGE + local.z) as usize
    }

    /// Raw packed value at a local offset
    pub fn raw(&self, local: UVec3) -> u32 {
        self.nodes[Self::index(local)]
    }

    pub fn set_raw(&mut self, local: UVec3, value: u32) {
        let i = Self::index(local);
        self.nodes[i] = value;
    }

    /// Decoded `(type_id, rotation)` at a local offset
    pub fn node(&self, local: UVec3) -> (u32, u32) {
        node::decode(self.raw(local))
    }

    /// Material identifier and rotation at a local offset
    pub fn node_identifier(&self, local: UVec3) -> (&str, u32) {
        let (id, rot) = self.node(local);
        (self.table.identifier_of(id), rot)
    }

    /// Local ID for a material, appending to this chunk's table if new
    pub fn intern_id(&mut self, identifier: &str) -> u32 {
        self.table.intern(identifier)
    }

    /// Material identifier for a local ID.
    ///
    /// # Panics
    /// Panics if the ID is not in this chunk's table.
    pub fn identifier_of(&self, type_id: u32) -> &str {
        self.table.identifier_of(type_id)
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// Write a material at a local offset.
    ///
    /// Clears `sunlit` for anything but air. Does not touch the revision
    /// counters; the store owns those.
    pub fn place(&mut self, local: UVec3, identifier: &str, rotation: u32) {
        let id = self.intern_id(identifier);
        self.set_raw(local, node::encode(id, rotation));
        if identifier != AIR {
            self.sunlit = false;
        }
    }

    /// Fill a horizontal layer with one raw value
    pub fn fill_layer(&mut self, y: u32, value: u32) {
        for x in 0..CHUNK_EDGE {
            for z in 0..CHUNK_EDGE {
                self.set_raw(UVec3::new(x, y, z), value);
            }
        }
    }

    /// Wire representation
    pub fn to_record(&self) -> MapblockRecord {
        let edge = CHUNK_EDGE as usize;
        let data: Vec<Vec<Vec<u32>>> = self
            .nodes
            .chunks(edge * edge)
            .map(|plane| plane.chunks(edge).map(|row| row.to_vec()).collect::<Vec<_>>())
            .collect();

        MapblockRecord {
            pos: self.coord.into(),
            update_num: self.update_num,
            light_update_num: self.light_update_num,
            light_needs_update: self.light_needs_update.as_u8(),
            id_to_is: self.table.identifiers().to_vec(),
            is_to_id: self
                .table
                .identifiers()
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), i as u32))
                .collect(),
            props: MapblockProps {
                sunlit: self.sunlit,
                extra: self.extra_props.clone(),
            },
            data,
        }
    }

    /// Build a chunk from a client-supplied record, rejecting anything that
    /// would break the table or array invariants
    pub fn from_record(record: MapblockRecord) -> Result<Self> {
        let coord = ChunkCoord::from(record.pos);

        let light_needs_update = LightUpdate::from_u8(record.light_needs_update).ok_or_else(|| {
            Error::Malformed(format!("lightNeedsUpdate {} out of range", record.light_needs_update))
        })?;

        let table = NodeTable::from_identifiers(record.id_to_is)
            .ok_or_else(|| Error::Malformed(format!("duplicate IDtoIS entry in chunk {:?}", coord)))?;

        if record.is_to_id.len() != table.len()
            || record
                .is_to_id
                .iter()
                .any(|(ident, &id)| table.id_of(ident) != Some(id))
        {
            return Err(Error::Malformed(format!("IStoID disagrees with IDtoIS in chunk {:?}", coord)));
        }

        let edge = CHUNK_EDGE as usize;
        if record.data.len() != edge
            || record
                .data
                .iter()
                .any(|plane| plane.len() != edge || plane.iter().any(|row| row.len() != edge))
        {
            return Err(Error::Malformed(format!("chunk {:?} is not {}^3 nodes", coord, edge)));
        }

        let nodes: Vec<u32> = record.data.into_iter().flatten().flatten().collect();
        if let Some(bad) = nodes
            .iter()
            .map(|&v| node::decode(v).0)
            .find(|&id| id as usize >= table.len())
        {
            return Err(Error::Malformed(format!(
                "chunk {:?} references node type {} outside its table",
                coord, bad
            )));
        }

        Ok(Self {
            coord,
            update_num: record.update_num,
            light_update_num: record.light_update_num,
            light_needs_update,
            sunlit: record.props.sunlit,
            extra_props: record.props.extra,
            table,
            nodes,
        })
    }
}

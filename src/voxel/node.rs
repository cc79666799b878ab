//! Packed node values and the per-chunk identifier table

use std::collections::HashMap;

/// Mask for the node-type ID (low 15 bits)
pub const TYPE_MASK: u32 = 0x7FFF;
/// Mask for the orientation byte
pub const ROT_MASK: u32 = 0xFF;
/// Bit offset of the orientation byte
pub const ROT_SHIFT: u32 = 15;

/// Material identifier of empty space
pub const AIR: &str = "air";

/// Pack a node-type ID and orientation into one value.
///
/// Out-of-range inputs are masked, not rejected: `encode(0x8001, 0)` packs type 1.
#[inline]
pub fn encode(type_id: u32, rotation: u32) -> u32 {
    (type_id & TYPE_MASK) | ((rotation & ROT_MASK) << ROT_SHIFT)
}

/// Unpack a node value into `(type_id, rotation)`
#[inline]
pub fn decode(value: u32) -> (u32, u32) {
    (value & TYPE_MASK, (value >> ROT_SHIFT) & ROT_MASK)
}

/// Reduce a wire rotation of any width to its low 8 bits, so `-1` becomes 255
#[inline]
pub fn wrap_rotation(raw: i64) -> u32 {
    (raw & i64::from(ROT_MASK)) as u32
}

/// Chunk-local bidirectional mapping between node-type IDs and material
/// identifiers.
///
/// IDs are assigned on first use and never reassigned or compacted, so the
/// same material may carry different IDs in different chunks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeTable {
    ids: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from an ordered identifier list.
    ///
    /// Returns `None` when an identifier appears twice.
    pub fn from_identifiers<I, S>(identifiers: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for ident in identifiers {
            let ident = ident.into();
            if table.lookup.contains_key(&ident) {
                return None;
            }
            table.intern(&ident);
        }
        Some(table)
    }

    /// Local ID for `identifier`, appending it to the table if it is new
    pub fn intern(&mut self, identifier: &str) -> u32 {
        if let Some(&id) = self.lookup.get(identifier) {
            return id;
        }
        let id = self.ids.len() as u32;
        self.ids.push(identifier.to_string());
        self.lookup.insert(identifier.to_string(), id);
        id
    }

    /// Local ID of `identifier`, if it has been interned
    pub fn id_of(&self, identifier: &str) -> Option<u32> {
        self.lookup.get(identifier).copied()
    }

    /// Material identifier for a local ID.
    ///
    /// # Panics
    /// Panics if `type_id` was never produced by [`NodeTable::intern`].
    pub fn identifier_of(&self, type_id: u32) -> &str {
        assert!(
            (type_id as usize) < self.ids.len(),
            "node type {} outside table of {} entries",
            type_id,
            self.ids.len()
        );
        &self.ids[type_id as usize]
    }

    pub fn get(&self, type_id: u32) -> Option<&str> {
        self.ids.get(type_id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in ID order
    pub fn identifiers(&self) -> &[String] {
        &self.ids
    }
}

//! Durable tree metadata with a double-buffered commit record.
//!
//! The metadata that must change atomically (`root`, `built`, `node_total`)
//! is serialized into one of two fixed slots at the head of the arena file.
//! Each commit bumps a sequence number and writes the slot selected by its
//! parity; recovery adopts the checksummed slot with the highest sequence.
//! A torn write therefore corrupts at most the slot being written, and the
//! previous commit remains intact.

use xxhash_rust::xxh3::xxh3_64_with_seed;

/// File magic, "PANN".
pub const MAGIC: u32 = 0x50414E4E;

/// On-disk format version.
pub const VERSION: u32 = 1;

/// Size of one serialized metadata slot.
pub const META_SLOT_SIZE: usize = 128;

/// Total size of the metadata region (two slots).
pub const META_REGION_SIZE: usize = 2 * META_SLOT_SIZE;

const CHECKSUM_SEED: u64 = 0x70616E6E;
const CHECKSUMMED_BYTES: usize = 64;

/// The durable `Tree` record plus arena geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Vector dimensionality the file was created with.
    pub dimensionality: u32,
    /// Node capacity the file was created with.
    pub capacity: u64,
    /// Number of items (leaves) inserted.
    pub n_items: i64,
    /// Root node id; -1 before build.
    pub root: i64,
    /// Total allocated nodes (items + internal splits).
    pub node_total: i64,
    /// Whether the tree has been built. Monotonic: false -> true, once.
    pub built: bool,
    /// Commit sequence number; selects the slot (`sequence % 2`).
    pub sequence: u64,
}

impl Metadata {
    /// Initial metadata for a freshly created arena.
    pub fn initial(dimensionality: u32, capacity: u64) -> Self {
        Self {
            dimensionality,
            capacity,
            n_items: 0,
            root: -1,
            node_total: 0,
            built: false,
            sequence: 1,
        }
    }

    /// Serialize into a slot buffer, little-endian, checksummed.
    pub fn encode(&self) -> [u8; META_SLOT_SIZE] {
        let mut buf = [0u8; META_SLOT_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dimensionality.to_le_bytes());
        buf[16..24].copy_from_slice(&self.capacity.to_le_bytes());
        buf[24..32].copy_from_slice(&self.n_items.to_le_bytes());
        buf[32..40].copy_from_slice(&self.root.to_le_bytes());
        buf[40..48].copy_from_slice(&self.node_total.to_le_bytes());
        buf[48] = self.built as u8;
        buf[56..64].copy_from_slice(&self.sequence.to_le_bytes());

        let checksum = xxh3_64_with_seed(&buf[..CHECKSUMMED_BYTES], CHECKSUM_SEED);
        buf[64..72].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decode a slot buffer. Returns `None` if the magic, version, or
    /// checksum do not validate (e.g. a torn or never-written slot).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < META_SLOT_SIZE {
            return None;
        }

        let magic = u32::from_le_bytes(buf[0..4].try_into().ok()?);
        if magic != MAGIC {
            return None;
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().ok()?);
        if version != VERSION {
            return None;
        }

        let stored = u64::from_le_bytes(buf[64..72].try_into().ok()?);
        let computed = xxh3_64_with_seed(&buf[..CHECKSUMMED_BYTES], CHECKSUM_SEED);
        if stored != computed {
            return None;
        }

        Some(Self {
            dimensionality: u32::from_le_bytes(buf[8..12].try_into().ok()?),
            capacity: u64::from_le_bytes(buf[16..24].try_into().ok()?),
            n_items: i64::from_le_bytes(buf[24..32].try_into().ok()?),
            root: i64::from_le_bytes(buf[32..40].try_into().ok()?),
            node_total: i64::from_le_bytes(buf[40..48].try_into().ok()?),
            built: buf[48] != 0,
            sequence: u64::from_le_bytes(buf[56..64].try_into().ok()?),
        })
    }

    /// Pick the newest valid slot out of the metadata region.
    pub fn recover(region: &[u8]) -> Option<Self> {
        let a = Self::decode(&region[..META_SLOT_SIZE]);
        let b = Self::decode(&region[META_SLOT_SIZE..META_REGION_SIZE]);
        match (a, b) {
            (Some(a), Some(b)) => Some(if a.sequence >= b.sequence { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Byte offset of the slot this metadata commits to.
    pub fn slot_offset(&self) -> usize {
        (self.sequence % 2) as usize * META_SLOT_SIZE
    }
}

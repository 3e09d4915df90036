//! Durable node/vector arena backed by a memory-mapped file.
//!
//! The arena is a pre-sized, append-only store: a fixed metadata region,
//! then `capacity` fixed-size node records, then `capacity * f` floats of
//! vector payload. Nodes are referenced by integer id only; a node's
//! position is its permanent identity. Ids below `n_items` are item
//! leaves, ids at or above it are internal split nodes.
//!
//! Durability discipline: item writes stream into the map without
//! individual flushes; only [`DurableArena::commit_build`] is atomic. A
//! crash mid-build recovers to the last committed metadata, which rolls
//! the allocation cursor back to the pre-build state.

mod meta;

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::config::IndexConfig;
use crate::error::{PannError, Result};
use meta::{Metadata, META_REGION_SIZE, META_SLOT_SIZE};

/// Arena node identity. Doubles as the item id for leaves.
pub type NodeId = i64;

/// Sentinel child reference: "no child".
pub const NO_CHILD: i32 = -1;

/// left (i32) + right (i32) + alpha (f32) + pad.
const NODE_RECORD_SIZE: usize = 16;

/// A read-only view of one arena node.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    /// Left child node id, or [`NO_CHILD`].
    pub left: i32,
    /// Right child node id, or [`NO_CHILD`].
    pub right: i32,
    /// Hyperplane offset term (unused for leaves).
    pub alpha: f32,
    /// The leaf vector, or the hyperplane normal for split nodes.
    pub vector: &'a [f32],
}

/// Append-only durable storage for tree nodes and their float payloads.
#[derive(Debug)]
pub struct DurableArena {
    mmap: MmapMut,
    dimensionality: usize,
    capacity: usize,
    /// In-memory staged metadata; the durable slots only advance on commit.
    meta: Metadata,
}

impl DurableArena {
    /// Open or create durable storage at `path`.
    ///
    /// An existing file is recovered from its newest valid metadata slot;
    /// geometry (dimensionality, capacity) then comes from the file, and a
    /// dimensionality clash with `config` is an error. A fresh file is
    /// pre-sized for `config.capacity` nodes and committed empty, so a
    /// crash at any later point still finds valid metadata.
    pub fn open(path: &Path, config: &IndexConfig) -> Result<Self> {
        config.validate()?;

        let exists = path.exists() && std::fs::metadata(path)?.len() > 0;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if exists {
            let mmap = unsafe { MmapMut::map_mut(&file)? };
            if mmap.len() < META_REGION_SIZE {
                return Err(PannError::CorruptState(
                    "file too small for metadata region".into(),
                ));
            }
            let meta = Metadata::recover(&mmap[..META_REGION_SIZE]).ok_or_else(|| {
                PannError::CorruptState("no valid metadata slot".into())
            })?;
            if meta.dimensionality as usize != config.dimensionality {
                return Err(PannError::DimensionMismatch {
                    expected: config.dimensionality,
                    got: meta.dimensionality as usize,
                });
            }
            let capacity = meta.capacity as usize;
            let expected_len =
                META_REGION_SIZE + capacity * NODE_RECORD_SIZE + capacity * config.dimensionality * 4;
            if mmap.len() < expected_len {
                return Err(PannError::CorruptState(format!(
                    "file truncated: {} bytes, expected {}",
                    mmap.len(),
                    expected_len
                )));
            }
            if meta.built && (meta.root < 0 || meta.root >= meta.node_total) {
                return Err(PannError::CorruptState(format!(
                    "built index has unreadable root {}",
                    meta.root
                )));
            }
            tracing::debug!(
                n_items = meta.n_items,
                built = meta.built,
                node_total = meta.node_total,
                "recovered arena metadata"
            );
            Ok(Self {
                mmap,
                dimensionality: config.dimensionality,
                capacity,
                meta,
            })
        } else {
            let capacity = config.capacity;
            let file_len = META_REGION_SIZE
                + capacity * NODE_RECORD_SIZE
                + capacity * config.dimensionality * 4;
            file.set_len(file_len as u64)?;
            let mmap = unsafe { MmapMut::map_mut(&file)? };
            let mut arena = Self {
                mmap,
                dimensionality: config.dimensionality,
                capacity,
                meta: Metadata::initial(config.dimensionality as u32, capacity as u64),
            };
            arena.commit_meta(arena.meta)?;
            Ok(arena)
        }
    }

    /// Vector dimensionality `f`.
    pub fn dimensionality(&self) -> usize {
        self.dimensionality
    }

    /// Fixed node capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items (leaves), as staged in memory.
    pub fn n_items(&self) -> i64 {
        self.meta.n_items
    }

    /// Whether the tree has been built and durably committed.
    pub fn built(&self) -> bool {
        self.meta.built
    }

    /// Root node id, or -1 before build.
    pub fn root(&self) -> i64 {
        self.meta.root
    }

    /// Total allocated nodes (allocation cursor).
    pub fn node_total(&self) -> i64 {
        self.meta.node_total
    }

    /// Stage a new item count. Durable only at [`Self::commit_build`].
    pub fn set_n_items(&mut self, n_items: i64) {
        self.meta.n_items = n_items;
    }

    /// Append a node at the cursor and return its id.
    pub fn allocate_node(&mut self) -> Result<NodeId> {
        let id = self.meta.node_total;
        if id as usize >= self.capacity {
            return Err(PannError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.meta.node_total = id + 1;
        Ok(id)
    }

    /// Allocate up to and including `id`, so direct leaf writes at the next
    /// contiguous item id find their slot.
    pub fn ensure_allocated(&mut self, id: NodeId) -> Result<()> {
        while self.meta.node_total <= id {
            self.allocate_node()?;
        }
        Ok(())
    }

    /// Bounds-checked read of one node.
    pub fn node(&self, id: NodeId) -> Result<NodeView<'_>> {
        let idx = self.check_id(id)?;
        let rec = &self.mmap[Self::node_offset(idx)..Self::node_offset(idx) + NODE_RECORD_SIZE];
        Ok(NodeView {
            left: i32::from_le_bytes(rec[0..4].try_into().unwrap()),
            right: i32::from_le_bytes(rec[4..8].try_into().unwrap()),
            alpha: f32::from_le_bytes(rec[8..12].try_into().unwrap()),
            vector: self.float_slice(idx),
        })
    }

    /// Bounds-checked read of one node's float payload.
    pub fn vector(&self, id: NodeId) -> Result<&[f32]> {
        let idx = self.check_id(id)?;
        Ok(self.float_slice(idx))
    }

    /// Write a leaf node: no children, the item vector as payload.
    pub fn write_leaf(&mut self, id: NodeId, vector: &[f32]) -> Result<()> {
        debug_assert_eq!(vector.len(), self.dimensionality);
        let idx = self.check_id(id)?;
        self.write_record(idx, NO_CHILD, NO_CHILD, 0.0);
        self.float_slice_mut(idx).copy_from_slice(vector);
        Ok(())
    }

    /// Write an internal split node: children, offset, hyperplane normal.
    pub fn write_split(
        &mut self,
        id: NodeId,
        left: i32,
        right: i32,
        alpha: f32,
        normal: &[f32],
    ) -> Result<()> {
        debug_assert_eq!(normal.len(), self.dimensionality);
        let idx = self.check_id(id)?;
        self.write_record(idx, left, right, alpha);
        self.float_slice_mut(idx).copy_from_slice(normal);
        Ok(())
    }

    /// Atomically commit the built tree: `root`, the built flag, the item
    /// count, and the allocation cursor become durable as one unit.
    pub fn commit_build(&mut self, root: NodeId) -> Result<()> {
        // Data pages first, then the metadata record. Recovery sees either
        // the previous commit or the complete built state.
        self.mmap.flush()?;
        let mut meta = self.meta;
        meta.root = root;
        meta.built = true;
        meta.sequence += 1;
        self.commit_meta(meta)
    }

    fn commit_meta(&mut self, meta: Metadata) -> Result<()> {
        let off = meta.slot_offset();
        self.mmap[off..off + META_SLOT_SIZE].copy_from_slice(&meta.encode());
        self.mmap.flush_range(off, META_SLOT_SIZE)?;
        self.meta = meta;
        Ok(())
    }

    fn check_id(&self, id: NodeId) -> Result<usize> {
        if id < 0 || id >= self.meta.node_total {
            return Err(PannError::OutOfRange {
                id,
                allocated: self.meta.node_total,
            });
        }
        Ok(id as usize)
    }

    #[inline]
    fn node_offset(idx: usize) -> usize {
        META_REGION_SIZE + idx * NODE_RECORD_SIZE
    }

    #[inline]
    fn float_base(&self) -> usize {
        META_REGION_SIZE + self.capacity * NODE_RECORD_SIZE
    }

    fn write_record(&mut self, idx: usize, left: i32, right: i32, alpha: f32) {
        let off = Self::node_offset(idx);
        let rec = &mut self.mmap[off..off + NODE_RECORD_SIZE];
        rec[0..4].copy_from_slice(&left.to_le_bytes());
        rec[4..8].copy_from_slice(&right.to_le_bytes());
        rec[8..12].copy_from_slice(&alpha.to_le_bytes());
    }

    #[inline]
    fn float_slice(&self, idx: usize) -> &[f32] {
        let start = self.float_base() + idx * self.dimensionality * 4;
        let bytes = &self.mmap[start..start + self.dimensionality * 4];
        // The map is page-aligned and the float region sits at a multiple
        // of 4 bytes, so the cast is aligned.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, self.dimensionality) }
    }

    #[inline]
    fn float_slice_mut(&mut self, idx: usize) -> &mut [f32] {
        let start = self.float_base() + idx * self.dimensionality * 4;
        let bytes = &mut self.mmap[start..start + self.dimensionality * 4];
        unsafe {
            std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut f32, self.dimensionality)
        }
    }
}

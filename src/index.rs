//! The durable vector index: build path and hybrid top-1 search.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::arena::{DurableArena, NodeId, NO_CHILD};
use crate::cache::ResultCache;
use crate::config::IndexConfig;
use crate::distance::dot;
use crate::error::{PannError, Result};
use crate::hyperplane::Hyperplane;
use crate::mirror::MirrorTree;

/// Consecutive one-sided splits of an unshrinking set before the builder
/// gives up on random hyperplanes and halves the set deterministically.
/// Bounds recursion depth on duplicate-heavy data.
const MAX_DEGENERATE_RETRIES: u32 = 16;

/// Single-writer/multi-reader approximate-nearest-neighbor index.
///
/// Items are appended to a durable arena, a randomized-projection binary
/// tree is built over them once, and queries descend an in-memory mirror
/// of the top tree levels before falling back into the arena. Exact-match
/// answers are memoized in a shared result cache.
///
/// Build is a caller-enforced single-writer phase: do not call
/// [`add_item`](Self::add_item) or [`build_index`](Self::build_index)
/// concurrently with anything else. Once built, [`search_top1`]
/// (Self::search_top1) takes `&self` and is safe from many threads; the
/// cache is the only mutable read-path structure and is internally
/// synchronized.
///
/// # Example
///
/// ```
/// use pann::{IndexConfig, VectorIndex};
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = IndexConfig::new(2).with_capacity(16).with_seed(42);
/// let mut index = VectorIndex::open(dir.path().join("index.pann"), config).unwrap();
///
/// index.add_item(0, &[0.0, 1.0]).unwrap();
/// index.add_item(1, &[0.0, 2.0]).unwrap();
/// index.build_index().unwrap();
///
/// assert_eq!(index.search_top1(&[0.0, 1.1]).unwrap(), 0);
/// ```
pub struct VectorIndex {
    arena: DurableArena,
    mirror: Option<MirrorTree>,
    cache: ResultCache,
    config: IndexConfig,
}

impl VectorIndex {
    /// Open or create durable storage at `path`.
    ///
    /// If the storage holds a previously built index, the in-memory mirror
    /// is rebuilt and the result cache is primed with every item's hash,
    /// so the read path is immediately warm.
    pub fn open<P: AsRef<Path>>(path: P, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let arena = DurableArena::open(path.as_ref(), &config)?;
        let cache = ResultCache::new(config.seed);
        let mut index = Self {
            arena,
            mirror: None,
            cache,
            config,
        };
        if index.arena.built() {
            index.refresh_read_path()?;
        }
        Ok(index)
    }

    /// Insert an item vector under the given id.
    ///
    /// Ids must arrive contiguously from 0 upward in aggregate; rewriting
    /// an id that was already inserted is allowed before build. Fails once
    /// the index is built.
    pub fn add_item(&mut self, id: i64, vector: &[f32]) -> Result<()> {
        if self.arena.built() {
            return Err(PannError::AlreadyBuilt);
        }
        if vector.len() != self.config.dimensionality {
            return Err(PannError::DimensionMismatch {
                expected: self.config.dimensionality,
                got: vector.len(),
            });
        }
        let n_items = self.arena.n_items();
        if id < 0 || id > n_items {
            return Err(PannError::NonContiguousId {
                id,
                expected: n_items,
            });
        }

        self.arena.ensure_allocated(id)?;
        self.arena.write_leaf(id, vector)?;
        if id >= n_items {
            self.arena.set_n_items(id + 1);
        }
        Ok(())
    }

    /// Build the search tree over all inserted items.
    ///
    /// Runs once: recursively partitions the full item set with two-means
    /// hyperplanes, then commits `{root, built, node count}` as a single
    /// atomic unit. A crash before the commit leaves the storage in its
    /// pre-build state. On success the mirror is built and the cache
    /// primed unconditionally.
    pub fn build_index(&mut self) -> Result<()> {
        if self.arena.built() {
            return Err(PannError::AlreadyBuilt);
        }
        let n_items = self.arena.n_items();
        if n_items == 0 {
            return Err(PannError::EmptyIndex);
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let indices: Vec<NodeId> = (0..n_items).collect();
        let root = self.make_tree(&indices, &mut rng, 0)?;

        self.arena.commit_build(root)?;
        tracing::debug!(
            root,
            n_items,
            node_total = self.arena.node_total(),
            "index built"
        );

        self.refresh_read_path()
    }

    /// Recursive binary partition. Returns the arena id representing the
    /// given set: the item itself for singletons, a freshly allocated
    /// split node otherwise.
    fn make_tree(
        &mut self,
        indices: &[NodeId],
        rng: &mut StdRng,
        degenerate_retries: u32,
    ) -> Result<NodeId> {
        if indices.len() == 1 {
            return Ok(indices[0]);
        }

        let (plane, mut left_set, mut right_set) = {
            let vectors: Vec<&[f32]> = indices
                .iter()
                .map(|&i| self.arena.vector(i))
                .collect::<Result<Vec<_>>>()?;
            let plane =
                Hyperplane::from_candidates(&vectors, self.config.two_means_iterations, rng);

            let mut left = Vec::new();
            let mut right = Vec::new();
            for (pos, &i) in indices.iter().enumerate() {
                if plane.side(vectors[pos]) {
                    right.push(i);
                } else {
                    left.push(i);
                }
            }
            (plane, left, right)
        };

        let mut retries = 0;
        if left_set.is_empty() || right_set.is_empty() {
            tracing::warn!(
                left = left_set.len(),
                right = right_set.len(),
                "tree not balanced"
            );
            if degenerate_retries >= MAX_DEGENERATE_RETRIES {
                // Random hyperplanes keep failing to separate this set
                // (e.g. duplicate vectors). Halve it so recursion
                // terminates.
                let mid = indices.len() / 2;
                left_set = indices[..mid].to_vec();
                right_set = indices[mid..].to_vec();
            } else {
                retries = degenerate_retries + 1;
            }
        }

        let left = if left_set.is_empty() {
            NO_CHILD as NodeId
        } else {
            self.make_tree(&left_set, rng, retries)?
        };
        let right = if right_set.is_empty() {
            NO_CHILD as NodeId
        } else {
            self.make_tree(&right_set, rng, retries)?
        };

        let id = self.arena.allocate_node()?;
        self.arena
            .write_split(id, left as i32, right as i32, plane.alpha, &plane.normal)?;
        Ok(id)
    }

    /// Find the item id closest to `query`.
    ///
    /// Probes the result cache, then descends the mirror's top levels, and
    /// only past the mirror depth continues directly against arena nodes.
    /// A margin of exactly zero routes left at every step.
    pub fn search_top1(&self, query: &[f32]) -> Result<i64> {
        if !self.arena.built() {
            return Err(PannError::NotBuilt);
        }
        if query.len() != self.config.dimensionality {
            return Err(PannError::DimensionMismatch {
                expected: self.config.dimensionality,
                got: query.len(),
            });
        }
        let mirror = self.mirror.as_ref().ok_or(PannError::NotBuilt)?;

        let hash = self.cache.hash(query);
        if let Some(item) = self.cache.probe(hash) {
            return Ok(item);
        }

        // Mirror descent over the top levels. Reaching a leaf within the
        // mirror resolves the query outright; running past the mirrored
        // depth breaks out with the arena id stored at the frontier.
        let levels = mirror.levels();
        let mut slot = 0usize;
        let mut level = 1u32;
        let frontier: i32 = loop {
            let node = mirror.node(slot);
            if node.left == NO_CHILD && node.right == NO_CHILD {
                let item = node.origin as i64;
                self.cache.record(hash, item);
                return Ok(item);
            }
            let margin = node.alpha + dot(mirror.vector(slot), query);
            let mut next = if margin <= 0.0 { node.left } else { node.right };
            if next == NO_CHILD {
                // One-sided split: the routed side is empty, so the only
                // child is the whole subtree.
                next = if node.left == NO_CHILD {
                    node.right
                } else {
                    node.left
                };
            }
            level += 1;
            if level > levels {
                break next;
            }
            slot = next as usize;
        };

        // Resume in the arena at the frontier node's child id.
        let n_items = self.arena.n_items();
        let mut id = frontier as i64;
        loop {
            let node = self.arena.node(id)?;
            if node.left == NO_CHILD && node.right == NO_CHILD {
                break;
            }
            let margin = node.alpha + dot(node.vector, query);
            let mut routed = if margin <= 0.0 { node.left } else { node.right };
            if routed == NO_CHILD {
                routed = if node.left == NO_CHILD {
                    node.right
                } else {
                    node.left
                };
            }
            id = routed as i64;
            if id < n_items {
                // Descended onto a leaf.
                break;
            }
        }

        self.cache.record(hash, id);
        Ok(id)
    }

    /// Fetch an inserted item's vector.
    pub fn get_item(&self, id: i64) -> Result<&[f32]> {
        let n_items = self.arena.n_items();
        if id < 0 || id >= n_items {
            return Err(PannError::OutOfRange {
                id,
                allocated: n_items,
            });
        }
        self.arena.vector(id)
    }

    /// Number of inserted items.
    pub fn get_n_items(&self) -> i64 {
        self.arena.n_items()
    }

    /// Whether the tree has been built.
    pub fn is_built(&self) -> bool {
        self.arena.built()
    }

    /// Configured vector dimensionality.
    pub fn dimensionality(&self) -> usize {
        self.config.dimensionality
    }

    /// The configuration this index was opened with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// `(hits, misses)` of the result cache since open.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Rebuild the in-memory mirror from the built tree.
    ///
    /// The mirror is a pure derivation, so this never changes answers; it
    /// exists for recovery paths and for verifying idempotence.
    pub fn rebuild_mirror(&mut self) -> Result<()> {
        if !self.arena.built() {
            return Err(PannError::NotBuilt);
        }
        self.mirror = Some(MirrorTree::build(&self.arena, self.config.mirror_levels)?);
        Ok(())
    }

    /// Build the mirror and prime the cache with every item's hash.
    fn refresh_read_path(&mut self) -> Result<()> {
        self.mirror = Some(MirrorTree::build(&self.arena, self.config.mirror_levels)?);

        let n_items = self.arena.n_items();
        (0..n_items)
            .into_par_iter()
            .try_for_each(|item| -> Result<()> {
                let vector = self.arena.vector(item)?;
                self.cache.record(self.cache.hash(vector), item);
                Ok(())
            })?;
        tracing::debug!(entries = self.cache.len(), "primed result cache");
        Ok(())
    }
}

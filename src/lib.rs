//! pann: a durable approximate-nearest-neighbor vector index.
//!
//! Items are fixed-dimensionality `f32` vectors stored in a memory-mapped
//! arena. A one-shot build partitions them with randomized-projection
//! hyperplanes into a binary tree persisted in the same arena; queries then
//! resolve a top-1 neighbor through a three-stage read path:
//!
//! 1. an exact-match result cache keyed by a content hash of the query,
//! 2. an in-memory mirror of the top tree levels, laid out in level order
//!    for sequential access,
//! 3. direct descent through arena nodes below the mirrored depth.
//!
//! The index is single-writer, multi-reader: inserts and the build run
//! exclusively, searches afterwards take `&self` from any number of
//! threads.
//!
//! ```
//! use pann::{IndexConfig, VectorIndex};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = IndexConfig::new(2).with_capacity(64);
//! let mut index = VectorIndex::open(dir.path().join("index.pann"), config).unwrap();
//!
//! index.add_item(0, &[1.0, 0.0]).unwrap();
//! index.add_item(1, &[0.0, 1.0]).unwrap();
//! index.add_item(2, &[-1.0, 0.0]).unwrap();
//! index.build_index().unwrap();
//!
//! assert_eq!(index.search_top1(&[0.9, 0.1]).unwrap(), 0);
//! assert_eq!(index.get_n_items(), 3);
//! ```

pub mod arena;
pub mod cache;
pub mod config;
pub mod distance;
pub mod error;
pub mod hyperplane;
pub mod index;
pub mod mirror;

pub use config::IndexConfig;
pub use error::{PannError, Result};
pub use index::VectorIndex;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::IndexConfig;
    pub use crate::error::{PannError, Result};
    pub use crate::index::VectorIndex;
}

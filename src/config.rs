//! Configuration for the durable index.

use serde::{Deserialize, Serialize};

use crate::error::{PannError, Result};

/// Default node capacity of the durable arena.
///
/// The arena holds item leaves plus internal split nodes; a build of `n`
/// items needs at most `2 * n - 1` nodes, so this default comfortably fits
/// half a million items.
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Default number of tree levels copied into the in-memory mirror.
pub const DEFAULT_MIRROR_LEVELS: u32 = 22;

/// Default seed for the build RNG and the result-cache hash.
pub const DEFAULT_SEED: u64 = 1313;

/// Default number of refinement iterations in the two-means heuristic.
pub const DEFAULT_TWO_MEANS_ITERATIONS: usize = 200;

/// Configuration for a [`VectorIndex`](crate::VectorIndex).
///
/// The dimensionality is fixed for the lifetime of the on-disk index; the
/// remaining knobs rarely need tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimensionality `f`. Every item and query must have this length.
    pub dimensionality: usize,

    /// Hard ceiling on total arena nodes (items + internal splits).
    pub capacity: usize,

    /// Number of tree levels mirrored into memory for cache-friendly descent.
    pub mirror_levels: u32,

    /// Seed for the build RNG and the query-hash function.
    pub seed: u64,

    /// Refinement iterations for the two-means hyperplane heuristic.
    pub two_means_iterations: usize,
}

impl IndexConfig {
    /// Create a configuration for vectors of the given dimensionality.
    pub fn new(dimensionality: usize) -> Self {
        Self {
            dimensionality,
            capacity: DEFAULT_CAPACITY,
            mirror_levels: DEFAULT_MIRROR_LEVELS,
            seed: DEFAULT_SEED,
            two_means_iterations: DEFAULT_TWO_MEANS_ITERATIONS,
        }
    }

    /// Set the arena node capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the number of mirrored tree levels.
    pub fn with_mirror_levels(mut self, levels: u32) -> Self {
        self.mirror_levels = levels;
        self
    }

    /// Set the deterministic seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the two-means refinement iteration count.
    pub fn with_two_means_iterations(mut self, iterations: usize) -> Self {
        self.two_means_iterations = iterations;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.dimensionality == 0 {
            return Err(PannError::InvalidConfig(
                "dimensionality must be positive".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(PannError::InvalidConfig(
                "capacity must be positive".into(),
            ));
        }
        // Node records store child ids as i32.
        if self.capacity > i32::MAX as usize {
            return Err(PannError::InvalidConfig(format!(
                "capacity {} exceeds the node id limit of {}",
                self.capacity,
                i32::MAX
            )));
        }
        if self.mirror_levels == 0 {
            return Err(PannError::InvalidConfig(
                "mirror_levels must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::new(40);
        assert_eq!(config.dimensionality, 40);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.mirror_levels, 22);
        assert_eq!(config.seed, 1313);
        assert_eq!(config.two_means_iterations, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = IndexConfig::new(8)
            .with_capacity(64)
            .with_mirror_levels(4)
            .with_seed(7)
            .with_two_means_iterations(50);
        assert_eq!(config.capacity, 64);
        assert_eq!(config.mirror_levels, 4);
        assert_eq!(config.seed, 7);
        assert_eq!(config.two_means_iterations, 50);
    }

    #[test]
    fn test_validation_rejects_zero_fields() {
        assert!(IndexConfig::new(0).validate().is_err());
        assert!(IndexConfig::new(4).with_capacity(0).validate().is_err());
        assert!(IndexConfig::new(4).with_mirror_levels(0).validate().is_err());
    }

    #[test]
    fn test_validation_rejects_capacity_beyond_node_id_range() {
        let config = IndexConfig::new(4).with_capacity(i32::MAX as usize + 1);
        assert!(matches!(
            config.validate(),
            Err(PannError::InvalidConfig(_))
        ));
        assert!(IndexConfig::new(4)
            .with_capacity(i32::MAX as usize)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = IndexConfig::new(128).with_seed(99);
        let json = serde_json::to_string(&config).unwrap();
        let back: IndexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dimensionality, 128);
        assert_eq!(back.seed, 99);
    }
}

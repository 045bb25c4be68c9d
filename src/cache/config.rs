//! Cache configuration.

use std::num::NonZeroUsize;

use crate::config::{CacheBackendKind, CacheSettings};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Where listing entries live.
    pub backend: CacheBackendKind,
    /// Maximum entries held by the in-memory backend.
    pub capacity: usize,
    /// Let only one concurrent miss per key run the compute function.
    pub single_flight: bool,
    /// Recompute the main listing right after a post write instead of
    /// waiting for the next reader.
    pub refresh_on_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            capacity: DEFAULT_CAPACITY,
            single_flight: true,
            refresh_on_write: true,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            capacity: settings.capacity,
            single_flight: settings.single_flight,
            refresh_on_write: settings.refresh_on_write,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackendKind::Memory);
        assert_eq!(config.capacity, 256);
        assert!(config.single_flight);
        assert!(config.refresh_on_write);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}

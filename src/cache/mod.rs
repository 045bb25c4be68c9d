//! Listing cache.
//!
//! [`ContentCache`] is a read-through cache over an injected
//! [`CacheBackend`]. Entries never expire; writers invalidate every
//! [`ListingKey`] whose content they change before responding.
//!
//! ```toml
//! [cache]
//! backend = "memory"      # or "postgres"
//! capacity = 256
//! single_flight = true
//! refresh_on_write = true
//! ```

mod backend;
mod config;
mod content;
mod inflight;
mod keys;
mod lock;
mod store;

pub use backend::{CacheBackend, CacheError};
pub use config::CacheConfig;
pub use content::ContentCache;
pub use keys::ListingKey;
pub use store::MemoryBackend;

//! Domain layer types and invariants.

pub mod credentials;
pub mod entities;
pub mod error;
pub mod navigation;
pub mod session;

//! Application services orchestrating domain logic.

pub mod auth;
pub mod context;
pub mod error;
pub mod listing;
pub mod posts;
pub mod repos;

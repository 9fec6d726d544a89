//! Core domain + forwarding logic for the media mirror.
//!
//! This crate is framework-agnostic. Discord and the HTTP media source live
//! behind ports (traits); the Discord implementation is in `mirror-discord`.

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod gateway;
pub mod header;
pub mod locks;
pub mod logging;
pub mod store;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;

//! Client library for the Gator feed aggregator.
//!
//! - [`api`] - HTTP client and canonical records
//! - [`loader`] - incremental, identity-scoped collection loading
//! - [`poller`] - bounded background refresh runs
//! - [`identity`] - persisted active user
//! - [`app`] - [`app::Session`], which wires the pieces together
//! - [`config`] - optional `config.toml`

pub mod api;
pub mod app;
pub mod config;
pub mod identity;
pub mod loader;
pub mod poller;
pub mod util;

//! Client for the Gator REST API.
//!
//! - [`client`] - [`GatorClient`], one async method per endpoint
//! - [`types`] - canonical records ([`Post`], [`Bookmark`], [`Feed`], ...) and
//!   the [`Item`] trait used by the collection loader
//! - [`error`] - [`ApiError`], the single error channel for every operation
//!
//! Payload normalization (PascalCase vs snake_case keys, Go nullable wrappers)
//! happens entirely inside this module.

mod client;
mod error;
mod normalize;
mod types;

pub use client::{GatorClient, DEFAULT_BASE_URL};
pub use error::ApiError;
pub use types::{
    is_following, Bookmark, Feed, Follow, FreshContent, Item, ItemFlag, Page, Post, User,
    UserSummary,
};

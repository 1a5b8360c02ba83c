//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: feed URL normalization and screening, API base URL checks
//! - **Text processing**: HTML-to-text for feed descriptions, Unicode-aware truncation
//!
//! # Examples
//!
//! ```
//! use gator::util::{normalize_feed_url, summarize, truncate_to_width};
//!
//! let url = normalize_feed_url("example.com/feed.xml");
//! assert_eq!(url, "https://example.com/feed.xml");
//!
//! let preview = summarize("<p>Breaking &amp; news</p>");
//! assert_eq!(preview, "Breaking & news");
//!
//! let title = truncate_to_width("Long article title", 15);
//! assert_eq!(title, "Long article...");
//! ```

mod task;
mod text;
mod url_validator;

pub(crate) use task::catch_task_panic;

pub use text::{
    display_width, format_timestamp, strip_control_chars, strip_html, summarize, truncate_to_width,
    SUMMARY_CHARS,
};
pub use url_validator::{
    normalize_feed_url, validate_base_url, validate_feed_name, validate_feed_url,
    UrlValidationError, MAX_FEED_NAME_LENGTH,
};

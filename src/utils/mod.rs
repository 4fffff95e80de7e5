//!
//! Utility module for the sync service.
//!
//! Re-exports formatting helpers and other utility functions for use throughout the codebase.
/// Utility functions for formatting and display
pub mod index;

pub use index::{format_timestamp, format_token_amount};

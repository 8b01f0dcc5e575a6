//! Utility functions for string formatting and name matching.

pub mod format;
pub mod search;

// Re-export commonly used functions at module level
pub use format::{split_list, truncate_string};
pub use search::{filter_matches, matches_query};

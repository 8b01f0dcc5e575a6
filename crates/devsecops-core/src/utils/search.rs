//! Client-side name matching over listing results.
//!
//! The services either lack a search endpoint or match differently from one
//! another, so handlers fetch a listing and filter it here. Matching is
//! case-sensitive.

/// True when `name` starts with, ends with, or contains `query`.
pub fn matches_query(name: &str, query: &str) -> bool {
    name.starts_with(query) || name.ends_with(query) || name.contains(query)
}

/// Keep the items whose key matches `query`.
pub fn filter_matches<T, F>(items: Vec<T>, query: &str, key: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    items
        .into_iter()
        .filter(|item| matches_query(key(item), query))
        .collect()
}

//! Stable cache keys.
//!
//! Signed media URLs rotate their query tokens on every request while naming
//! the same content. Keys therefore ignore everything from the first `#` and
//! then everything from the first `?`, so playback and prefetch of the same
//! clip share one cache entry.

/// Derive the cache key of a resource locator.
///
/// Pure and total: never touches the network or disk.
pub fn stable_key(locator: &str) -> String {
    let without_fragment = locator.split('#').next().unwrap_or(locator);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    without_query.to_string()
}

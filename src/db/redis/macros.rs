/// Read-through caching for catalog calls.
///
/// Returns the cached value when present. Otherwise awaits `$block`, queues
/// the result for a background cache write and returns it. Errors from the
/// block propagate with `?`; cache failures never do.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache)
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write
/// * `$ttl`: time-to-live in seconds for the stored value
/// * `$block`: future computing the value on a miss
///
/// # Example
/// ```rust,ignore
/// let movies: Vec<MovieRecord> = cached!(self.cache, CacheKey::Popular, 3600, async move {
///     fetch_popular().await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get_from_cache(&key).await {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&key, &value, $ttl);
            Ok(value)
        }
    }};
}

use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::error::AppResult;
use crate::models::MovieId;

/// Keys for cached catalog responses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Search(String),
    Details(MovieId),
    Popular,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Search(query) => write!(f, "tmdb:search:{}", query.trim().to_lowercase()),
            CacheKey::Details(id) => write!(f, "tmdb:movie:{}", id),
            CacheKey::Popular => write!(f, "tmdb:popular"),
        }
    }
}

/// Creates a Redis client for caching
///
/// `Client::open` only validates the URL; no connection is made until first use.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Pending `SETEX` for the background writer
struct PendingWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache for catalog responses
///
/// Reads are best effort: an unreachable or corrupt cache behaves like a miss
/// so catalog calls never fail because of Redis.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the background writer once queued writes are flushed
///
/// Dropping the handle stops the writer as well, without waiting.
pub struct CacheWriterHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

struct CacheWriter {
    client: Client,
    queue: mpsc::UnboundedReceiver<PendingWrite>,
}

impl CacheWriter {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                next = self.queue.recv() => match next {
                    Some(write) => self.apply(write).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    let mut flushed = 0usize;
                    while let Ok(write) = self.queue.try_recv() {
                        self.apply(write).await;
                        flushed += 1;
                    }
                    tracing::info!(flushed, "Cache writer stopped");
                    break;
                }
            }
        }
    }

    async fn apply(&self, write: PendingWrite) {
        if let Err(e) = self.set_ex(&write).await {
            tracing::warn!(error = %e, key = %write.key, "Cache write dropped");
        }
    }

    async fn set_ex(&self, write: &PendingWrite) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(&write.key, &write.value, write.ttl).await?;
        Ok(())
    }
}

impl Cache {
    /// Creates the cache and spawns its background writer
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, queue) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let writer = CacheWriter {
            client: redis_client.clone(),
            queue,
        };
        let task = tokio::spawn(writer.run(shutdown_rx));

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx, task })
    }

    async fn read_from_redis(&self, key: &CacheKey) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;
        Ok(cached)
    }

    /// Retrieves a cached value, treating any cache failure as a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let json = match self.read_from_redis(key).await {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Queues a write without waiting for Redis
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if self.write_tx.send(write).is_err() {
            tracing::warn!(key = %key, "Cache writer is gone, skipping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_search_normalizes_query() {
        let key = CacheKey::Search("  The MATRIX ".to_string());
        assert_eq!(key.to_string(), "tmdb:search:the matrix");
    }

    #[test]
    fn test_cache_key_display_details() {
        assert_eq!(CacheKey::Details(27205).to_string(), "tmdb:movie:27205");
    }

    #[test]
    fn test_cache_key_display_popular() {
        assert_eq!(CacheKey::Popular.to_string(), "tmdb:popular");
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_a_miss() {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client);

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&CacheKey::Popular).await;
        assert_eq!(retrieved, None);

        // Queued writes to a dead server are logged, not surfaced
        cache.set_in_background(&CacheKey::Popular, &vec!["x".to_string()], 60);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_in_background_writes_to_cache() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (cache, handle) = Cache::new(client.clone());

        let key = CacheKey::Search("movie_tracker_async_write".to_string());
        let value = vec!["item1".to_string(), "item2".to_string()];
        cache.set_in_background(&key, &value, 60);

        handle.shutdown().await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await;
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}

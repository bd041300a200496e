pub mod file;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use postgres::{create_pool, run_migrations, PostgresBackend};
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;
pub use redis::CacheWriterHandle;

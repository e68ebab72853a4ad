pub mod in_memory;
pub mod prediction_store;
pub mod redis_stream;

pub use in_memory::{InMemoryDispatchChannels, InMemoryPredictionStore, InMemoryTaskStream};
pub use prediction_store::RedisPredictionStore;
pub use redis_stream::{RedisConnectionManager, RedisStreamTransport, RedisTelemetrySources};

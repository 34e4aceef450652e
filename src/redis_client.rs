use redis::{aio::MultiplexedConnection, Client};
use tracing::info;

use crate::config::RedisConfig;

/// Соединение с Redis; используется только для потока событий броней.
#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(config: &RedisConfig) -> redis::RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis connected, events go to stream '{}'", config.events_stream);
        Ok(RedisClient { conn })
    }
}

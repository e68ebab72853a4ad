use std::time::Duration;

use redis::{Client, Connection, RedisResult};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use foresight_config::StreamConfig;
use foresight_errors::{SchedulerError, SchedulerResult};

/// Manages connections to the Redis broker with bounded retry.
pub struct RedisConnectionManager {
    client: Client,
    max_retry_attempts: u32,
    retry_delay: Duration,
}

impl RedisConnectionManager {
    pub async fn new(config: &StreamConfig) -> SchedulerResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            SchedulerError::message_queue(format!("failed to create Redis client: {e}"))
        })?;

        let manager = Self {
            client,
            max_retry_attempts: config.max_retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        };

        manager.ping().await?;
        debug!(url = %config.url, "connected to Redis");
        Ok(manager)
    }

    async fn get_connection(&self) -> SchedulerResult<Connection> {
        let mut last_error = None;

        for attempt in 0..self.max_retry_attempts {
            match self.client.get_connection() {
                Ok(conn) => {
                    if attempt > 0 {
                        debug!("reconnected to Redis after {} attempts", attempt + 1);
                    }
                    return Ok(conn);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retry_attempts - 1 {
                        warn!(
                            "Redis connection attempt {}/{} failed: {}. Retrying in {:?}",
                            attempt + 1,
                            self.max_retry_attempts,
                            last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                            self.retry_delay
                        );
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let message = format!(
            "failed to connect to Redis after {} attempts: {}",
            self.max_retry_attempts,
            last_error.map_or("unknown".to_string(), |e| e.to_string())
        );
        error!("{message}");
        Err(SchedulerError::MessageQueue(message))
    }

    /// Run one command against a (possibly fresh) connection.
    pub async fn execute_command<T: redis::FromRedisValue>(
        &self,
        cmd: &redis::Cmd,
    ) -> SchedulerResult<T> {
        let mut conn = self.get_connection().await?;
        cmd.query(&mut conn)
            .map_err(|e| SchedulerError::MessageQueue(format!("Redis command failed: {e}")))
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let mut conn = self.get_connection().await?;
        let result: RedisResult<String> = redis::cmd("PING").query(&mut conn);
        match result {
            Ok(response) if response == "PONG" => Ok(()),
            Ok(response) => Err(SchedulerError::message_queue(format!(
                "unexpected PING response: {response}"
            ))),
            Err(e) => Err(SchedulerError::message_queue(format!("Redis PING failed: {e}"))),
        }
    }
}

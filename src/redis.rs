use crate::error::{ThrottlerError, ThrottlerResult};
use crate::store::ListTransport;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;

/// Redis transport for the shared execution store.
///
/// Holds one multiplexed connection; every command clones the handle, so
/// concurrent evaluations pipeline over the same socket.
pub struct RedisClient {
    client: Client,
    connection: MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(redis_url: &str) -> ThrottlerResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| ThrottlerError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| ThrottlerError::Storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { client, connection })
    }

    pub fn connection_info(&self) -> String {
        format!("{:?}", self.client.get_connection_info().addr)
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[async_trait]
impl ListTransport for RedisClient {
    async fn length(&self, key: &str) -> ThrottlerResult<u64> {
        redis::cmd("LLEN")
            .arg(key)
            .query_async::<_, u64>(&mut self.conn())
            .await
            .map_err(|e| ThrottlerError::Storage(format!("LLEN failed: {}", e)))
    }

    async fn push_front(&self, key: &str, value: &str) -> ThrottlerResult<()> {
        redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut self.conn())
            .await
            .map_err(|e| ThrottlerError::Storage(format!("LPUSH failed: {}", e)))
    }

    async fn pop_back(&self, key: &str) -> ThrottlerResult<Option<String>> {
        redis::cmd("RPOP")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await
            .map_err(|e| ThrottlerError::Storage(format!("RPOP failed: {}", e)))
    }

    async fn push_back(&self, key: &str, value: &str) -> ThrottlerResult<()> {
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut self.conn())
            .await
            .map_err(|e| ThrottlerError::Storage(format!("RPUSH failed: {}", e)))
    }

    async fn peek_back(&self, key: &str) -> ThrottlerResult<Option<String>> {
        redis::cmd("LINDEX")
            .arg(key)
            .arg(-1)
            .query_async::<_, Option<String>>(&mut self.conn())
            .await
            .map_err(|e| ThrottlerError::Storage(format!("LINDEX failed: {}", e)))
    }

    async fn delete_matching(&self, pattern: &str) -> ThrottlerResult<u64> {
        let mut conn = self.conn();

        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| ThrottlerError::Storage(format!("KEYS failed: {}", e)))?;

        if keys.is_empty() {
            return Ok(0);
        }

        redis::cmd("DEL")
            .arg(&keys)
            .query_async::<_, u64>(&mut conn)
            .await
            .map_err(|e| ThrottlerError::Storage(format!("DEL failed: {}", e)))
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        let pong: String = redis::cmd("PING")
            .query_async(&mut self.conn())
            .await
            .map_err(|e| ThrottlerError::Storage(format!("Ping failed: {}", e)))?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(ThrottlerError::Storage(format!("Unexpected PING reply: {}", pong)))
        }
    }
}

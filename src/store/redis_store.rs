//! Redis-backed shared store.
//!
//! Ordinary commands go through one auto-reconnecting multiplexed connection.
//! `BRPOPLPUSH` blocks the connection it runs on, so every source list gets
//! its own dedicated connection for the blocking pop.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SharedStore;
use crate::error::{CoordError, Result};

const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const MOVE_VALUE_TO_TAIL_SCRIPT: &str = r#"
if redis.call("LREM", KEYS[1], 1, ARGV[1]) == 1 then
    redis.call("RPUSH", KEYS[2], ARGV[1])
    return 1
else
    return 0
end
"#;

/// Shared store talking to a Redis server.
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    blocking: Mutex<HashMap<String, MultiplexedConnection>>,
    delete_if_equals: Script,
    move_value_to_tail: Script,
}

impl RedisStore {
    /// Connects to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        info!(url = %redis_url, "Connected to Redis");

        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(HashMap::new()),
            delete_if_equals: Script::new(DELETE_IF_EQUALS_SCRIPT),
            move_value_to_tail: Script::new(MOVE_VALUE_TO_TAIL_SCRIPT),
        })
    }

    /// Returns the dedicated blocking connection for `source`, opening it on first use.
    async fn blocking_conn(&self, source: &str) -> Result<MultiplexedConnection> {
        let mut conns = self.blocking.lock().await;
        if let Some(conn) = conns.get(source) {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_tokio_connection().await?;
        debug!(list = %source, "Opened dedicated connection for blocking pops");
        conns.insert(source.to_string(), conn.clone());
        Ok(conn)
    }
}

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET NX PX sets the value and its expiry in one command
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .delete_if_equals
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(list, value).await?;
        Ok(())
    }

    async fn move_tail_to_head(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut conn = self.blocking_conn(source).await?;
        let timeout_secs = timeout.as_secs().max(1);

        let result: redis::RedisResult<Option<String>> = redis::cmd("BRPOPLPUSH")
            .arg(source)
            .arg(destination)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                // Reconnect on the next call
                self.blocking.lock().await.remove(source);
                Err(CoordError::from(err))
            }
        }
    }

    async fn remove_value(&self, list: &str, value: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.lrem(list, 1, value).await?;
        Ok(removed)
    }

    async fn move_value_to_tail(
        &self,
        source: &str,
        destination: &str,
        value: &str,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let moved: i64 = self
            .move_value_to_tail
            .key(source)
            .key(destination)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    async fn list_all(&self, list: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(list, 0, -1).await?;
        Ok(items)
    }

    async fn list_len(&self, list: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(list).await?;
        Ok(len)
    }
}

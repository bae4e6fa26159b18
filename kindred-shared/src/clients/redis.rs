use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const DEL_IF_EQ: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Deletes `key` only while it still holds `value`. Returns whether it did.
    pub async fn del_if_eq(&self, key: &str, value: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(DEL_IF_EQ)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    /// `SET key value NX EX ttl`. Returns `true` when this call created the key.
    pub async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.zadd(key, member, score).await
    }

    /// Removes `member`, returning whether it was present. Used to claim queue entries.
    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    /// Members with a score in `[-inf, max]`, lowest score first, at most `limit` of them.
    pub async fn zrange_by_score(
        &self,
        key: &str,
        max: f64,
        limit: isize,
    ) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.zrangebyscore_limit(key, "-inf", max, 0, limit).await
    }
}

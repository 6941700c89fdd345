//! Result cache keyed by the content hash of an upload.
//!
//! Every failure is logged and treated as a miss, the cache never fails a job.

use std::time::Duration;

use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};

use crate::storage::StoredMatch;

pub fn cache_key(digest: &str) -> String {
    format!("demo_cache:{}", digest)
}

#[derive(Clone)]
pub struct ResultCache {
    connection: ConnectionManager,
    ttl: Duration,
}

impl ResultCache {
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, redis::RedisError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { connection, ttl })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, digest: &str) -> Option<StoredMatch> {
        let mut connection = self.connection.clone();

        let raw: Option<String> = match connection.get(cache_key(digest)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Reading cache: {:?}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw?) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!("Decoding cached match: {:?}", e);
                None
            }
        }
    }

    #[tracing::instrument(skip(self, stored), fields(match_id = stored.match_id()))]
    pub async fn put(&self, digest: &str, stored: &StoredMatch) {
        let content = match serde_json::to_string(stored) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Encoding match for cache: {:?}", e);
                return;
            }
        };

        let mut connection = self.connection.clone();
        let result: Result<(), _> = connection
            .set_ex(cache_key(digest), content, self.ttl.as_secs().max(1))
            .await;
        if let Err(e) = result {
            tracing::warn!("Writing cache: {:?}", e);
        }
    }
}

//! Queue engine contract and Redis backend
//!
//! Asynchronous delivery hands a [`TrackJob`](crate::job::TrackJob) to an
//! external queue engine. The engine's surface is small: accept a job
//! under a routing name, and answer a reachability pre-flight. The
//! default backend is a Redis list per queue name.

use async_trait::async_trait;

use crate::error::Result;
use crate::job::TrackJob;

#[cfg(feature = "queue")]
use crate::config::RedisConfig;
#[cfg(feature = "queue")]
use crate::error::AuditError;
#[cfg(feature = "queue")]
use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
#[cfg(feature = "queue")]
use std::ops::DerefMut;
#[cfg(feature = "queue")]
use std::time::Duration;

/// External queue engine contract
///
/// `enqueue` must return only once the engine has accepted the job; it
/// never blocks on remote delivery. `is_reachable` is the cheap
/// pre-flight the dispatcher runs before serializing a job.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Submit a job under the given routing name
    async fn enqueue(&self, queue: &str, job: &TrackJob) -> Result<()>;

    /// Whether the backend currently answers
    async fn is_reachable(&self) -> bool;
}

/// Redis list key for a queue routing name
#[cfg(feature = "queue")]
fn queue_key(queue: &str) -> String {
    format!("queue:{}", queue)
}

/// Redis-backed job queue
///
/// Jobs are JSON-encoded and pushed onto `queue:{name}`; workers consume
/// with a blocking pop from the other end.
#[cfg(feature = "queue")]
pub struct RedisJobQueue {
    pool: Pool,
}

#[cfg(feature = "queue")]
impl RedisJobQueue {
    /// Connect to the queue backend, retrying with exponential backoff
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let mut attempt = 0;
        let base_delay = Duration::from_secs(config.retry_delay_secs);

        loop {
            match Self::try_connect(config).await {
                Ok(queue) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Queue backend connection established after {} attempt(s)",
                            attempt + 1
                        );
                    } else {
                        tracing::info!(
                            "Queue backend pool created: max_connections={}",
                            config.max_connections
                        );
                    }
                    return Ok(queue);
                }
                Err(e) => {
                    attempt += 1;

                    if attempt > config.max_retries {
                        tracing::error!(
                            "Failed to connect to queue backend after {} attempts: {}",
                            config.max_retries + 1,
                            e
                        );
                        return Err(e);
                    }

                    let delay_multiplier = 2_u32.pow(attempt.saturating_sub(1));
                    let delay = base_delay * delay_multiplier;

                    tracing::warn!(
                        "Queue backend connection attempt {} failed: {}. Retrying in {:?}...",
                        attempt,
                        e,
                        delay
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Attempt to create the pool and verify one connection (single try)
    async fn try_connect(config: &RedisConfig) -> Result<Self> {
        let cfg = DeadpoolConfig::from_url(&config.url);

        let pool = cfg
            .builder()
            .map_err(|e| {
                AuditError::redis_connection_refused(format!("Failed to build Redis pool: {}", e))
            })?
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                AuditError::redis_connection_refused(format!("Failed to create Redis pool: {}", e))
            })?;

        let conn = pool.get().await.map_err(|e| {
            AuditError::redis_connection_refused(format!("Failed to get Redis connection: {}", e))
        })?;
        drop(conn);

        Ok(Self { pool })
    }

    /// Pop the next job from a queue, waiting up to `timeout`
    ///
    /// Returns `Ok(None)` when the wait times out with no job available.
    /// A payload that no longer deserializes is dropped with a warning;
    /// re-queueing bytes no worker can parse would loop forever.
    pub async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<TrackJob>> {
        let mut conn = self.pool.get().await.map_err(|e| {
            AuditError::redis_connection_refused(format!("Failed to get Redis connection: {}", e))
        })?;

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue_key(queue))
            .arg(timeout.as_secs_f64())
            .query_async(conn.deref_mut())
            .await
            .map_err(|e| {
                AuditError::redis_connection_refused(format!("Failed to pop from {}: {}", queue, e))
            })?;

        match popped {
            Some((_, payload)) => match serde_json::from_str::<TrackJob>(&payload) {
                Ok(job) => Ok(Some(job)),
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "Dropping undecodable track job");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

#[cfg(feature = "queue")]
#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, queue: &str, job: &TrackJob) -> Result<()> {
        let payload = serde_json::to_string(job).map_err(|e| {
            AuditError::redis_connection_refused(format!("Failed to serialize track job: {}", e))
        })?;

        let mut conn = self.pool.get().await.map_err(|e| {
            AuditError::redis_connection_refused(format!("Failed to get Redis connection: {}", e))
        })?;

        redis::cmd("LPUSH")
            .arg(queue_key(queue))
            .arg(payload)
            .query_async::<i64>(conn.deref_mut())
            .await
            .map_err(|e| {
                AuditError::redis_connection_refused(format!(
                    "Failed to enqueue to {}: {}",
                    queue, e
                ))
            })?;

        tracing::debug!(queue = %queue, job_id = %job.id, "Track job enqueued");
        Ok(())
    }

    async fn is_reachable(&self) -> bool {
        let Ok(mut conn) = self.pool.get().await else {
            return false;
        };

        redis::cmd("PING")
            .query_async::<String>(conn.deref_mut())
            .await
            .is_ok()
    }
}

#[cfg(all(test, feature = "queue"))]
mod tests {
    use super::*;

    #[test]
    fn test_queue_key_format() {
        assert_eq!(queue_key("tracker"), "queue:tracker");
        assert_eq!(queue_key("audits"), "queue:audits");
    }
}

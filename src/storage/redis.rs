// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend for the sorted-set cache.
//!
//! One [`ConnectionManager`] is shared by every collection; clones are cheap
//! and multiplex over the same connection. Every command goes through
//! [`retry_when`] with the query preset, so a flapping connection costs a few
//! hundred milliseconds before the caller sees [`StoreError::Unavailable`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, AsyncCommands, Client, InfoDict, RedisError};
use tracing::debug;

use super::traits::{MemoryInfo, Pipeline, SortedSetStore, StoreError, StoreOp};
use crate::resilience::retry::{retry_when, RetryConfig};

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

fn is_transient(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

fn store_error(e: RedisError) -> StoreError {
    if is_transient(&e) {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Protocol(e.to_string())
    }
}

impl RedisStore {
    /// Connect with startup-mode retry (fails fast if the URL is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        let client = Client::open(connection_string)
            .map_err(|e| StoreError::Protocol(e.to_string()))?;

        let connection = retry_when("redis_connect", &RetryConfig::startup(), is_transient, || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(store_error)?;

        Ok(Self { connection })
    }

    async fn range(&self, op: &'static str, key: &str, start: isize, stop: isize, reverse: bool) -> Result<Vec<String>, StoreError> {
        let conn = self.connection.clone();
        let key = key.to_string();

        retry_when(op, &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let members: Vec<String> = if reverse {
                    conn.zrevrange(&key, start, stop).await?
                } else {
                    conn.zrange(&key, start, stop).await?
                };
                Ok(members)
            }
        })
        .await
        .map_err(store_error)
    }
}

#[async_trait]
impl SortedSetStore for RedisStore {
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        self.range("redis_zrange", key, start, stop, false).await
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        self.range("redis_zrevrange", key, start, stop, true).await
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let conn = self.connection.clone();
        let key = key.to_string();

        retry_when("redis_zcard", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let count: u64 = conn.zcard(&key).await?;
                Ok(count)
            }
        })
        .await
        .map_err(store_error)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.connection.clone();
        let values: Vec<Option<String>> = retry_when("redis_mget", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            async move {
                // Explicit MGET: always returns an array, even for a single key
                let values: Vec<Option<String>> = cmd("MGET").arg(keys).query_async(&mut conn).await?;
                Ok(values)
            }
        })
        .await
        .map_err(store_error)?;

        if values.len() != keys.len() {
            return Err(StoreError::Protocol(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        Ok(values)
    }

    /// Submit the batch as a single Redis pipeline.
    async fn execute(&self, pipeline: &Pipeline) -> Result<(), StoreError> {
        if pipeline.is_empty() {
            return Ok(());
        }

        let conn = self.connection.clone();
        debug!(ops = pipeline.len(), "Executing redis pipeline");

        retry_when("redis_pipeline", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            async move {
                let mut batch = pipe();
                for op in pipeline.ops() {
                    match op {
                        StoreOp::ZAdd { key, member, score } => {
                            batch.zadd(key, member, *score).ignore();
                        }
                        StoreOp::ZRem { key, member } => {
                            batch.zrem(key, member).ignore();
                        }
                        StoreOp::SetEx { key, value, ttl_secs } => {
                            batch.set_ex(key, value, *ttl_secs).ignore();
                        }
                        StoreOp::Del { key } => {
                            batch.del(key).ignore();
                        }
                    }
                }
                batch.query_async::<()>(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(store_error)
    }

    async fn memory_info(&self) -> Result<MemoryInfo, StoreError> {
        let conn = self.connection.clone();

        let info: InfoDict = retry_when("redis_info", &RetryConfig::query(), is_transient, || {
            let mut conn = conn.clone();
            async move {
                let info: InfoDict = cmd("INFO").arg("memory").query_async(&mut conn).await?;
                Ok(info)
            }
        })
        .await
        .map_err(store_error)?;

        let unknown = MemoryInfo::unknown();
        Ok(MemoryInfo {
            used_memory: info.get("used_memory_human").unwrap_or(unknown.used_memory),
            peak_memory: info.get("used_memory_peak_human").unwrap_or(unknown.peak_memory),
        })
    }
}

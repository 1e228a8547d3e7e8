//! Remote cache tier client.
//!
//! Owns the connection lifecycle to the Redis-compatible remote store:
//! connect/disconnect, throttled reconnection, and the raw byte-level
//! operations the orchestrator builds on. Every network call runs under a
//! bounded timeout; a timeout is treated exactly like a connection failure.
//!
//! Reconnection is throttled by the recorded attempt state: after a failed
//! attempt, no new physical attempt is made inside the throttle window, and
//! a connect mutex guarantees at most one physical attempt is in flight even
//! when many request workers observe the disconnected state simultaneously.

use metrics::counter;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::error::{ErrorCode, RecallError, Result};

/// Connection lifecycle state, owned exclusively by the client.
#[derive(Debug, Clone)]
struct ConnectionState {
    connected: bool,
    last_attempt_at: Option<Instant>,
    last_result: bool,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            connected: false,
            last_attempt_at: None,
            last_result: false,
        }
    }
}

/// Serializable snapshot of the connection state for stats endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    /// Whether a live connection handle is held
    pub connected: bool,
    /// Whether the most recent physical attempt succeeded
    pub last_result: bool,
    /// Milliseconds since the most recent physical attempt, if any
    pub ms_since_last_attempt: Option<u64>,
}

/// Client for the remote key-value tier.
pub struct RemoteCacheClient {
    url: String,
    key_prefix: String,
    connect_timeout: Duration,
    command_timeout: Duration,
    reconnect_throttle: Duration,
    conn: RwLock<Option<MultiplexedConnection>>,
    state: parking_lot::RwLock<ConnectionState>,
    /// At most one physical connect attempt in flight.
    connect_lock: Mutex<()>,
}

impl RemoteCacheClient {
    /// Create a client from settings. No connection is attempted here;
    /// lifecycle is explicit (`connect` / `disconnect`).
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            url: settings.remote_url.clone(),
            key_prefix: settings.key_prefix.clone(),
            connect_timeout: settings.connect_timeout(),
            command_timeout: settings.command_timeout(),
            reconnect_throttle: settings.reconnect_throttle(),
            conn: RwLock::new(None),
            state: parking_lot::RwLock::new(ConnectionState::new()),
            connect_lock: Mutex::new(()),
        }
    }

    /// The remote store URL this client targets.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a live connection handle is currently held.
    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Snapshot the connection state for monitoring.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state.read();
        ConnectionSnapshot {
            connected: state.connected,
            last_result: state.last_result,
            ms_since_last_attempt: state
                .last_attempt_at
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Attempt to establish the connection, surfacing the failure cause.
    ///
    /// Idempotent when already connected. Throttled: a failed attempt inside
    /// the throttle window short-circuits without touching the network so
    /// concurrent callers cannot create a reconnect storm.
    pub async fn connect_checked(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        if self.is_throttled() {
            return Err(RecallError::new(
                ErrorCode::ConnectionFailed,
                "Reconnect attempt throttled after recent failure",
            )
            .with_context("throttle_ms", self.reconnect_throttle.as_millis() as u64));
        }

        let _guard = self.connect_lock.lock().await;
        // A concurrent caller may have connected while we waited on the lock.
        if self.is_connected() {
            return Ok(());
        }
        if self.is_throttled() {
            return Err(RecallError::new(
                ErrorCode::ConnectionFailed,
                "Reconnect attempt throttled after recent failure",
            ));
        }

        match self.establish().await {
            Ok(conn) => {
                *self.conn.write().await = Some(conn);
                let mut state = self.state.write();
                state.connected = true;
                state.last_result = true;
                state.last_attempt_at = Some(Instant::now());
                drop(state);
                counter!("recall_remote_connects_total", "result" => "ok").increment(1);
                info!(url = %self.url, "connected to remote cache store");
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write();
                state.connected = false;
                state.last_result = false;
                state.last_attempt_at = Some(Instant::now());
                drop(state);
                counter!("recall_remote_connects_total", "result" => "error").increment(1);
                warn!(url = %self.url, error = %e, "failed to connect to remote cache store");
                Err(e)
            }
        }
    }

    /// Attempt to establish the connection, reporting only success/failure.
    pub async fn connect(&self) -> bool {
        self.connect_checked().await.is_ok()
    }

    /// Close the connection and clear the handle.
    ///
    /// Subsequent operations fail fast until `connect` succeeds again.
    pub async fn disconnect(&self) {
        *self.conn.write().await = None;
        let mut state = self.state.write();
        state.connected = false;
        drop(state);
        debug!(url = %self.url, "disconnected from remote cache store");
    }

    fn is_throttled(&self) -> bool {
        let state = self.state.read();
        if state.connected || state.last_result {
            return false;
        }
        match state.last_attempt_at {
            Some(at) => at.elapsed() < self.reconnect_throttle,
            None => false,
        }
    }

    async fn establish(&self) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| RecallError::connection_failed(&self.url, e.to_string()))?;

        let mut conn = tokio::time::timeout(
            self.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            RecallError::command_timeout("CONNECT", self.connect_timeout.as_millis() as u64)
        })?
        .map_err(RecallError::from)?;

        let _: String = tokio::time::timeout(
            self.connect_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| {
            RecallError::command_timeout("PING", self.connect_timeout.as_millis() as u64)
        })?
        .map_err(RecallError::from)?;

        Ok(conn)
    }

    /// Get a clone of the live connection handle, or fail fast.
    async fn handle(&self) -> Result<MultiplexedConnection> {
        self.conn.read().await.clone().ok_or_else(|| {
            RecallError::new(
                ErrorCode::ConnectionFailed,
                "Remote cache store is not connected",
            )
        })
    }

    /// Mark the connection dead after a connection-class failure so the next
    /// caller goes through the throttled reconnect path.
    async fn note_failure(&self, error: &RecallError) {
        if matches!(
            error.code(),
            ErrorCode::ConnectionFailed | ErrorCode::CommandTimeout | ErrorCode::NetworkError
        ) {
            *self.conn.write().await = None;
            let mut state = self.state.write();
            state.connected = false;
            state.last_result = false;
            state.last_attempt_at = Some(Instant::now());
        }
    }

    /// Run a remote command under the bounded command timeout.
    async fn run<T, F>(&self, command: &'static str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let result = match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RecallError::from(e)),
            Err(_) => Err(RecallError::command_timeout(
                command,
                self.command_timeout.as_millis() as u64,
            )),
        };

        if let Err(ref e) = result {
            self.note_failure(e).await;
        }
        result
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Raw operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch raw entry bytes.
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.handle().await?;
        let full_key = self.full_key(key);
        self.run("GET", async move { conn.get(&full_key).await }).await
    }

    /// Store raw entry bytes, with an optional TTL.
    pub async fn set_bytes(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.handle().await?;
        let full_key = self.full_key(key);
        let payload = bytes.to_vec();

        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                self.run("SETEX", async move {
                    conn.set_ex(&full_key, payload, secs).await
                })
                .await
            }
            None => {
                self.run("SET", async move { conn.set(&full_key, payload).await })
                    .await
            }
        }
    }

    /// Delete a key; returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.handle().await?;
        let full_key = self.full_key(key);
        let deleted: i64 = self.run("DEL", async move { conn.del(&full_key).await }).await?;
        Ok(deleted > 0)
    }

    /// Check key existence.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.handle().await?;
        let full_key = self.full_key(key);
        self.run("EXISTS", async move { conn.exists(&full_key).await })
            .await
    }

    /// Remaining TTL for a key, if it exists and has one.
    pub async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.handle().await?;
        let full_key = self.full_key(key);
        let pttl: i64 = self
            .run("PTTL", async move {
                redis::cmd("PTTL").arg(&full_key).query_async(&mut conn).await
            })
            .await?;

        // PTTL: -2 = missing key, -1 = no expiry.
        if pttl < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(pttl as u64)))
        }
    }

    /// One chunked scan step over this client's keyspace.
    ///
    /// Returns the next cursor (0 when the iteration completed) and a batch
    /// of logical keys with the namespace prefix stripped.
    pub async fn scan_keys(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.handle().await?;
        let pattern = format!("{}*", self.key_prefix);
        let count = count.max(1);

        let (next_cursor, keys): (u64, Vec<String>) = self
            .run("SCAN", async move {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(count)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        let prefix_len = self.key_prefix.len();
        let keys = keys
            .into_iter()
            .filter_map(|k| {
                if k.len() > prefix_len {
                    Some(k[prefix_len..].to_string())
                } else {
                    None
                }
            })
            .collect();

        Ok((next_cursor, keys))
    }

    /// Delete every key under this client's namespace prefix.
    ///
    /// Uses chunked SCAN + DEL so a large keyspace never blocks the store
    /// for the whole job.
    pub async fn clear(&self) -> Result<u64> {
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let mut conn = self.handle().await?;
            let scan_pattern = pattern.clone();
            let (next_cursor, keys): (u64, Vec<String>) = self
                .run("SCAN", async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&scan_pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let mut conn = self.handle().await?;
                let deleted: i64 = self.run("DEL", async move { conn.del(&keys).await }).await?;
                total_deleted += deleted as u64;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        info!(deleted = total_deleted, "cleared remote cache namespace");
        Ok(total_deleted)
    }
}

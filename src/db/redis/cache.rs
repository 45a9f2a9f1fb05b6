use std::fmt::Display;
use std::time::Duration;

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Pending writes beyond this are dropped
const WRITE_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Diseases extracted from one (history, image) input, keyed by a UUIDv5 digest
    DiseaseExtraction(Uuid),
}

impl CacheKey {
    /// Builds the extraction key for a medical history and optional image URL
    ///
    /// Whitespace and case in the history do not change the key.
    pub fn disease_extraction(history: &str, image_url: Option<&str>) -> Self {
        let normalized = history
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let input = format!("{}\n{}", normalized, image_url.unwrap_or_default());
        CacheKey::DiseaseExtraction(Uuid::new_v5(&Uuid::NAMESPACE_OID, input.as_bytes()))
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::DiseaseExtraction(digest) => write!(f, "diseases:{}", digest),
        }
    }
}

/// Opens a Redis client; nothing is dialed until the first command
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

struct PendingWrite {
    key: String,
    payload: String,
    ttl: Duration,
}

/// JSON cache on Redis with fire-and-forget writes
///
/// Reads go straight to Redis. Writes are serialized on the caller's task and
/// applied by a single background writer, so a slow or absent Redis never delays
/// a response.
#[derive(Clone)]
pub struct Cache {
    client: Client,
    writes: mpsc::Sender<PendingWrite>,
}

/// Stops the background writer after it flushes queued writes
pub struct CacheWriterHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer panicked");
        }
        tracing::info!("Cache writer stopped");
    }
}

impl Cache {
    /// Creates the cache and spawns its writer task
    pub fn spawn(client: Client) -> (Self, CacheWriterHandle) {
        let (writes, pending) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_writer(client.clone(), pending, shutdown_rx));

        (Self { client, writes }, CacheWriterHandle { shutdown_tx, task })
    }

    /// Reads and decodes a JSON value; `None` when the key is absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(key.to_string()).await?;

        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AppError::Internal(format!("Corrupt cache entry {}: {}", key, e)))
        })
        .transpose()
    }

    /// Queues a JSON write with the given expiry
    ///
    /// Returns immediately. Serialization errors and a full queue are logged and
    /// the write is skipped.
    pub fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, %key, "Cache serialization failed");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            payload,
            ttl,
        };
        if let Err(e) = self.writes.try_send(write) {
            tracing::warn!(error = %e, %key, "Cache write dropped");
        }
    }
}

/// Applies queued writes over one lazily opened connection
async fn run_writer(
    client: Client,
    mut pending: mpsc::Receiver<PendingWrite>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut conn: Option<MultiplexedConnection> = None;

    loop {
        tokio::select! {
            write = pending.recv() => match write {
                Some(write) => apply(&client, &mut conn, write).await,
                None => return,
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    while let Ok(write) = pending.try_recv() {
        apply(&client, &mut conn, write).await;
    }
}

async fn apply(client: &Client, conn: &mut Option<MultiplexedConnection>, write: PendingWrite) {
    if let Err(e) = try_apply(client, conn, &write).await {
        // Reconnect on the next write
        *conn = None;
        tracing::error!(error = %e, key = %write.key, "Cache write failed");
    }
}

async fn try_apply(
    client: &Client,
    conn: &mut Option<MultiplexedConnection>,
    write: &PendingWrite,
) -> AppResult<()> {
    if conn.is_none() {
        *conn = Some(client.get_multiplexed_async_connection().await?);
    }
    if let Some(conn) = conn.as_mut() {
        let _: () = conn
            .set_ex(write.key.as_str(), write.payload.as_str(), write.ttl.as_secs().max(1))
            .await?;
    }
    Ok(())
}

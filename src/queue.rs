use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::UpstreamError;

pub const FORMAT_QUEUE: &str = "snippet_formatting_queue";
pub const SCA_QUEUE: &str = "snippet_sca_queue";
pub const SCA_UNIQUE_QUEUE: &str = "snippet_sca_unique_queue";
pub const STATUS_QUEUE: &str = "snippet_sca_status";

/// Named FIFO lists shared between producers and consumers.
///
/// `pop` is atomic at the store, so several consumers may share one list.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Appends to the right end of `key`.
    async fn push(&self, key: &str, payload: String) -> Result<(), UpstreamError>;

    /// Removes from the left end of `key` without waiting.
    async fn pop(&self, key: &str) -> Result<Option<String>, UpstreamError>;
}

#[derive(Clone)]
pub struct RedisListStore {
    conn: ConnectionManager,
}

impl RedisListStore {
    pub async fn connect(url: &str) -> Result<Self, UpstreamError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        log::info!("Connected to queue store at {url}");
        Ok(Self { conn })
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push(&self, key: &str, payload: String) -> Result<(), UpstreamError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, payload).await?;
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, UpstreamError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.lpop(key, None).await?;
        Ok(payload)
    }
}

/// In-process lists, used when no queue store is configured.
#[derive(Default)]
pub struct MemoryListStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, key: &str) -> usize {
        self.lists.lock().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Every payload currently in `key`, oldest first.
    pub fn snapshot(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push(&self, key: &str, payload: String) -> Result<(), UpstreamError> {
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, UpstreamError> {
        Ok(self.lists.lock().get_mut(key).and_then(VecDeque::pop_front))
    }
}

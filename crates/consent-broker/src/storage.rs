//! Persistent storage for registered clients
//!
//! Rows are keyed by `client_id`. The only write is [`ClientStore::upsert`],
//! which decides insert-or-update and commits in one step so concurrent
//! registrations of the same client never interleave.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// A registered client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub client_id: String,
    pub display_name: String,
    pub description: String,
    pub events_url: String,
    pub jwks_url: String,
    /// JWK (JSON text) that verified the latest registration
    pub client_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    /// Insert `client`, or replace every mutable field of the existing row.
    /// `created_at` of an existing row is kept.
    async fn upsert(&self, client: Client) -> Result<UpsertOutcome, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ClientTable {
    clients: HashMap<String, Client>,
}

impl ClientTable {
    fn apply(&mut self, mut client: Client) -> UpsertOutcome {
        match self.clients.get_mut(&client.client_id) {
            Some(existing) => {
                client.created_at = existing.created_at;
                *existing = client;
                UpsertOutcome::Updated
            }
            None => {
                self.clients.insert(client.client_id.clone(), client);
                UpsertOutcome::Inserted
            }
        }
    }
}

/// Clients kept in a JSON file under the config directory
pub struct FileClientStore {
    inner: Arc<FileStoreInner>,
}

struct FileStoreInner {
    path: PathBuf,
    table: RwLock<ClientTable>,
}

impl FileClientStore {
    /// Open (or create) `clients.json` under `config_path`
    pub fn open(config_path: &str) -> Result<Self, StoreError> {
        let dir = PathBuf::from(config_path);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("clients.json");

        let table = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let table: ClientTable = serde_json::from_str(&content)?;
            tracing::info!("Loaded {} registered clients", table.clients.len());
            table
        } else {
            ClientTable::default()
        };

        Ok(Self {
            inner: Arc::new(FileStoreInner {
                path,
                table: RwLock::new(table),
            }),
        })
    }
}

impl FileStoreInner {
    async fn upsert(&self, client: Client) -> Result<UpsertOutcome, StoreError> {
        let mut table = self.table.write().await;

        // Stage the change and only publish it once it is on disk
        let mut next = table.clone();
        let outcome = next.apply(client);
        self.persist(&next).await?;
        *table = next;

        Ok(outcome)
    }

    async fn persist(&self, table: &ClientTable) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ClientStore for FileClientStore {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        let table = self.inner.table.read().await;
        Ok(table.clients.get(client_id).cloned())
    }

    async fn upsert(&self, client: Client) -> Result<UpsertOutcome, StoreError> {
        // Run detached so a dropped request cannot stop the write halfway
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.upsert(client).await })
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Non-durable store for tests and local runs
#[derive(Default)]
pub struct MemoryClientStore {
    table: RwLock<ClientTable>,
}

impl MemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.clients.len()
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.table.read().await.clients.get(client_id).cloned())
    }

    async fn upsert(&self, client: Client) -> Result<UpsertOutcome, StoreError> {
        Ok(self.table.write().await.apply(client))
    }
}

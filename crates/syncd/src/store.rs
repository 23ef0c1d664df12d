//! Durable snapshot storage, one value per scope.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use primitives::Scope;
use tokio::sync::Mutex;

use crate::{Result, SyncError};

const KEY_PREFIX: &[u8] = b"asp/";

/// Each `save` replaces the scope's snapshot atomically.
#[async_trait]
pub trait AspStore: Send + Sync {
    async fn load(&self, scope: &Scope) -> Result<Option<Vec<u8>>>;

    async fn save(&self, scope: &Scope, snapshot: Vec<u8>) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<Scope, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl AspStore for MemoryStore {
    async fn load(&self, scope: &Scope) -> Result<Option<Vec<u8>>> { Ok(self.snapshots.lock().await.get(scope).cloned()) }

    async fn save(&self, scope: &Scope, snapshot: Vec<u8>) -> Result<()> {
        self.snapshots.lock().await.insert(*scope, snapshot);
        Ok(())
    }
}

pub struct SledStore {
    db: sled::Db,
}

fn store_err(context: &str, err: sled::Error) -> SyncError { SyncError::Store(format!("{context}: {err}")) }

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| SyncError::Store(format!("create {}: {e}", path.display())))?;
        let db = sled::open(path).map_err(|e| store_err(&format!("open {}", path.display()), e))?;
        Ok(Self { db })
    }

    fn key(scope: &Scope) -> Vec<u8> {
        let mut key = KEY_PREFIX.to_vec();
        key.extend_from_slice(&scope.to_be_bytes());
        key
    }
}

#[async_trait]
impl AspStore for SledStore {
    async fn load(&self, scope: &Scope) -> Result<Option<Vec<u8>>> {
        let value = self.db.get(Self::key(scope)).map_err(|e| store_err("get", e))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn save(&self, scope: &Scope, snapshot: Vec<u8>) -> Result<()> {
        self.db.insert(Self::key(scope), snapshot).map_err(|e| store_err("insert", e))?;
        self.db.flush_async().await.map_err(|e| store_err("flush", e))?;
        Ok(())
    }
}

//! # Conexiones al Backend
//! src/db/connection.rs

use super::database::{Database, UserRecord};
use crate::error::{Result, ServerError};
use crate::pool::ResourcePool;
use std::sync::Arc;

/// Handle opaco prestado por el pool. Varios handles comparten la misma
/// tabla; el pool limita cuántos threads la usan a la vez.
#[derive(Clone)]
pub struct DbConnection {
    id: usize,
    db: Arc<Database>,
}

impl DbConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn select_users(&self) -> Vec<UserRecord> {
        self.db.select_users()
    }

    pub fn insert_user(&self, username: &str, password: &str) -> Result<bool> {
        self.db.insert_user(username, password)
    }
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("id", &self.id)
            .field("path", &self.db.path())
            .finish()
    }
}

pub struct ConnectionPool;

impl ConnectionPool {
    /// Crea `size` handles sobre la misma tabla
    pub fn init(db: Arc<Database>, size: usize) -> Result<ResourcePool<DbConnection>> {
        if size == 0 {
            return Err(ServerError::Config("db pool size must be >= 1".to_string()));
        }

        let conns = (0..size)
            .map(|id| DbConnection {
                id,
                db: Arc::clone(&db),
            })
            .collect();

        tracing::info!(size, path = %db.path().display(), "database pool ready");
        Ok(ResourcePool::new(conns))
    }
}

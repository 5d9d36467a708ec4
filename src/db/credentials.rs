//! # Tabla de Credenciales Precargada
//! src/db/credentials.rs
//!
//! Copia en memoria de la tabla de usuarios. Se llena una vez al arrancar
//! con un handle prestado; los logins se resuelven sin tocar el backend y
//! los registros escriben primero en el backend y luego en la caché.

use super::connection::DbConnection;
use super::database::hash_password;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct CredentialStore {
    users: RwLock<HashMap<String, String>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carga todas las filas del backend. Retorna cuántas se cargaron.
    pub fn preload(&self, conn: &DbConnection) -> usize {
        let rows = conn.select_users();
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.clear();
        users.extend(rows.into_iter().map(|r| (r.username, r.password_hash)));
        tracing::info!(users = users.len(), "credential table preloaded");
        users.len()
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .get(username)
            .is_some_and(|hash| *hash == hash_password(password))
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(username)
    }

    /// Registra un usuario nuevo. `Ok(false)` si el nombre ya existe.
    pub fn register(&self, conn: &DbConnection, username: &str, password: &str) -> Result<bool> {
        if self.contains(username) {
            return Ok(false);
        }
        // El mutex de la tabla decide entre registros concurrentes del mismo
        // nombre; la caché se toma solo para insertar
        if !conn.insert_user(username, password)? {
            return Ok(false);
        }
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(username.to_string(), hash_password(password));
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

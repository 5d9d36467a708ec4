//! # Tabla de Usuarios en Disco
//! src/db/database.rs
//!
//! Backend mínimo: un archivo JSON con la tabla `usuario -> sha256(password)`.
//! Cada escritura reescribe el archivo completo a través de un temporal y un
//! rename, así un corte a mitad nunca deja la tabla truncada.

use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fila de la tabla de usuarios
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Digest SHA-256 en hexadecimal
    pub password_hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserTable {
    users: BTreeMap<String, String>,
}

pub struct Database {
    path: PathBuf,
    table: Mutex<UserTable>,
}

impl Database {
    /// Abre la tabla; si el archivo no existe se empieza con una vacía
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader).map_err(|e| {
                ServerError::Database(format!("corrupt user table {}: {}", path.display(), e))
            })?
        } else {
            UserTable::default()
        };

        tracing::debug!(path = %path.display(), users = table.users.len(), "user table loaded");
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Todas las filas, ordenadas por nombre
    pub fn select_users(&self) -> Vec<UserRecord> {
        self.lock_table()
            .users
            .iter()
            .map(|(username, hash)| UserRecord {
                username: username.clone(),
                password_hash: hash.clone(),
            })
            .collect()
    }

    /// Inserta un usuario nuevo. Retorna `false` si el nombre ya existe.
    pub fn insert_user(&self, username: &str, password: &str) -> Result<bool> {
        let mut table = self.lock_table();
        if table.users.contains_key(username) {
            return Ok(false);
        }

        table
            .users
            .insert(username.to_string(), hash_password(password));
        if let Err(e) = self.save(&table) {
            // La fila no llegó a disco: no debe quedar en memoria
            table.users.remove(username);
            return Err(e);
        }
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, table: &UserTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let mut writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(&mut writer, table)?;
        writer.flush()?;

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, UserTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// SHA-256 de la contraseña en hexadecimal
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("users.json")).unwrap();
        assert!(db.select_users().is_empty());
    }

    #[test]
    fn test_insert_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("users.json");

        let db = Database::open(&path).unwrap();
        assert!(db.insert_user("alice", "secret").unwrap());
        assert!(!db.insert_user("alice", "other").unwrap());
        drop(db);

        let db = Database::open(&path).unwrap();
        let users = db.select_users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[0].password_hash, hash_password("secret"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_table_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "{not json").unwrap();

        match Database::open(&path) {
            Err(ServerError::Database(msg)) => assert!(msg.contains("corrupt")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

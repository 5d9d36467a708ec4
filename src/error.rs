//! # Errores del Servidor
//! src/error.rs
//!
//! Tipo de error central. Solo los errores de arranque y los fallos fatales
//! del reactor llegan hasta aquí: los fallos de una conexión se resuelven
//! cerrando esa conexión.

use thiserror::Error;

/// Error central del servidor
#[derive(Debug, Error)]
pub enum ServerError {
    /// Error de E/S del sistema operativo o de la red
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuración inválida
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Fallo del backend de usuarios
    #[error("Database error: {0}")]
    Database(String),

    /// JSON corrupto en la tabla de usuarios
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// El descriptor aceptado no cabe en la tabla de slots
    #[error("Connection slot table is full")]
    SlotTableFull,
}

pub type Result<T> = std::result::Result<T, ServerError>;
